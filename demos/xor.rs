use ferrite_grad::{
    ActivationFunction, Dense, Layer, Network, NetworkConfig, OptimizerKind, Prediction, WeightInit,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() -> ferrite_grad::Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let layers: Vec<Box<dyn Layer>> = vec![
        Box::new(Dense::with_init(2, 8, ActivationFunction::ReLU, WeightInit::Auto, &mut rng)),
        Box::new(Dense::with_init(8, 1, ActivationFunction::Sigmoid, WeightInit::Auto, &mut rng)),
    ];

    let config = NetworkConfig {
        optimizer: OptimizerKind::Adam,
        learning_rate: 0.01,
        batch_size: 4,
        seed: Some(42),
        ..NetworkConfig::default()
    };
    let mut network = Network::with_config(layers, config)?;
    println!("backend: {}", network.backend().kind());

    let inputs = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let expected_outputs = vec![
        vec![0.0],
        vec![1.0],
        vec![1.0],
        vec![0.0],
    ];

    let epochs = 10000;
    for chunk in 0..10 {
        let report = network.train(&inputs, &expected_outputs, epochs / 10, 0, false)?;
        println!("Epoch {}: loss = {:.6}", (chunk + 1) * epochs / 10, report.final_loss);
    }

    if let Prediction::Many(outputs) = network.predict(inputs.clone())? {
        for (input, output) in inputs.iter().zip(outputs.iter()) {
            println!("Input: {:?} -> Output: {:.4}", input, output[0]);
        }
    }
    Ok(())
}
