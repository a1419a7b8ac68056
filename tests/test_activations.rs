// Tests for the activation functions: value/derivative contract, softmax
// normalisation and identifier parsing.

use ferrite_grad::activation::DerivativeSource;
use ferrite_grad::{ActivationFunction, Matrix, NnError};

// Points chosen away from every kink (0, ±1, ±3).
const POINTS: [f64; 8] = [-4.2, -2.5, -1.7, -0.6, 0.4, 0.9, 2.2, 3.6];

fn all_elementwise() -> Vec<ActivationFunction> {
    vec![
        ActivationFunction::Sigmoid,
        ActivationFunction::ReLU,
        ActivationFunction::Linear,
        ActivationFunction::Tanh,
        ActivationFunction::leaky_relu(),
        ActivationFunction::elu(),
        ActivationFunction::Gelu,
        ActivationFunction::HardSigmoid,
        ActivationFunction::hard_tanh(),
        ActivationFunction::HardSwish,
    ]
}

#[test]
fn test_derivative_matches_finite_difference_on_declared_source() {
    let h = 1e-6;
    for act in all_elementwise() {
        for &z in &POINTS {
            let zm = Matrix::from_row(vec![z]);
            let plus = act.activate(&Matrix::from_row(vec![z + h])).data[0][0];
            let minus = act.activate(&Matrix::from_row(vec![z - h])).data[0][0];
            let numeric = (plus - minus) / (2.0 * h);

            let source = match act.derivative_source() {
                DerivativeSource::Activated => act.activate(&zm),
                DerivativeSource::PreActivation => zm,
            };
            let analytic = act.derivative(&source).data[0][0];
            assert!(
                (analytic - numeric).abs() < 1e-5,
                "{act} at {z}: analytic {analytic}, numeric {numeric}"
            );
        }
    }
}

#[test]
fn test_derivative_sources() {
    for act in [
        ActivationFunction::Sigmoid,
        ActivationFunction::Tanh,
        ActivationFunction::ReLU,
        ActivationFunction::elu(),
        ActivationFunction::leaky_relu(),
    ] {
        assert_eq!(act.derivative_source(), DerivativeSource::Activated, "{act}");
    }
    for act in [
        ActivationFunction::Gelu,
        ActivationFunction::HardSigmoid,
        ActivationFunction::hard_tanh(),
        ActivationFunction::HardSwish,
    ] {
        assert_eq!(act.derivative_source(), DerivativeSource::PreActivation, "{act}");
    }
}

#[test]
fn test_softmax_normalises_each_sample() {
    // Three classes × two samples (columns).
    let z = Matrix::from_data(vec![vec![1.0, 1000.0], vec![2.0, 1000.0], vec![3.0, 1000.0]]).unwrap();
    let a = ActivationFunction::Softmax.activate(&z);
    for j in 0..2 {
        let sum: f64 = (0..3).map(|i| a.data[i][j]).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
    assert!(a.data[2][0] > a.data[1][0] && a.data[1][0] > a.data[0][0]);
    assert!((a.data[0][1] - 1.0 / 3.0).abs() < 1e-12);
}

#[test]
fn test_softmax_derivative_is_all_ones() {
    let a = Matrix::from_data(vec![vec![0.2, 0.7], vec![0.8, 0.3]]).unwrap();
    let d = ActivationFunction::Softmax.derivative(&a);
    assert_eq!(d, Matrix::filled(2, 2, 1.0));
}

#[test]
fn test_parse_identifiers() {
    assert_eq!("relu".parse::<ActivationFunction>().unwrap(), ActivationFunction::ReLU);
    assert_eq!("Sigmoid".parse::<ActivationFunction>().unwrap(), ActivationFunction::Sigmoid);
    assert_eq!("leakyrelu".parse::<ActivationFunction>().unwrap(), ActivationFunction::leaky_relu());
    assert_eq!("leaky-relu".parse::<ActivationFunction>().unwrap(), ActivationFunction::leaky_relu());
    assert_eq!("hardtanh".parse::<ActivationFunction>().unwrap(), ActivationFunction::hard_tanh());
    for act in all_elementwise() {
        assert_eq!(act.name().parse::<ActivationFunction>().unwrap(), act);
    }
    assert!(matches!("swish".parse::<ActivationFunction>(), Err(NnError::UnknownActivation(_))));
}
