// Tests for the mini-batch source: batch sizes, pairing of inputs with
// targets, shuffling and input validation.

use ferrite_grad::{DataLoader, NnError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn dataset(n: usize) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let inputs = (0..n).map(|i| vec![i as f64, -(i as f64)]).collect();
    let targets = (0..n).map(|i| vec![10.0 * i as f64]).collect();
    (inputs, targets)
}

#[test]
fn test_batches_cover_every_sample_once() {
    let (inputs, targets) = dataset(10);
    let mut loader = DataLoader::from_rows(&inputs, &targets, 3, true).unwrap();
    loader.shuffle(&mut StdRng::seed_from_u64(4));
    assert_eq!(loader.len(), 4);

    let mut seen = Vec::new();
    for batch in loader.batches() {
        let (x, y) = batch.unwrap();
        assert_eq!(x.batch_size(), y.batch_size());
        for (row, target) in x.to_rows().iter().zip(y.to_rows()) {
            // Inputs stay paired with their own targets.
            assert_eq!(target[0], 10.0 * row[0]);
            seen.push(row[0] as usize);
        }
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_unshuffled_loader_keeps_order() {
    let (inputs, targets) = dataset(5);
    let mut loader = DataLoader::from_rows(&inputs, &targets, 2, false).unwrap();
    loader.shuffle(&mut StdRng::seed_from_u64(1));
    let firsts: Vec<f64> = loader.batches().map(|b| b.unwrap().0.data[0]).collect();
    assert_eq!(firsts, vec![0.0, 2.0, 4.0]);
}

#[test]
fn test_shuffle_changes_order_between_epochs() {
    let (inputs, targets) = dataset(32);
    let mut loader = DataLoader::from_rows(&inputs, &targets, 32, true).unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    loader.shuffle(&mut rng);
    let first: Vec<f64> = loader.batches().next().unwrap().unwrap().0.data;
    loader.shuffle(&mut rng);
    let second: Vec<f64> = loader.batches().next().unwrap().unwrap().0.data;
    assert_ne!(first, second);
}

#[test]
fn test_iterator_is_single_pass() {
    let (inputs, targets) = dataset(4);
    let loader = DataLoader::from_rows(&inputs, &targets, 4, false).unwrap();
    let mut batches = loader.batches();
    assert_eq!(batches.size_hint(), (1, Some(1)));
    assert!(batches.next().is_some());
    assert!(batches.next().is_none());
    assert!(batches.next().is_none());
}

#[test]
fn test_higher_rank_inputs_are_batched_per_sample() {
    let inputs = Tensor::new(vec![3, 1, 2, 2], (0..12).map(|v| v as f64).collect()).unwrap();
    let targets = Tensor::new(vec![3, 1], vec![0.0, 1.0, 2.0]).unwrap();
    let loader = DataLoader::new(inputs, targets, 2, false).unwrap();
    let (x, _) = loader.batches().next().unwrap().unwrap();
    assert_eq!(x.shape, vec![2, 1, 2, 2]);
    assert_eq!(x.data, (0..8).map(|v| v as f64).collect::<Vec<_>>());
}

#[test]
fn test_invalid_construction() {
    let (inputs, targets) = dataset(4);
    assert!(matches!(
        DataLoader::from_rows(&inputs, &targets[..3], 2, true),
        Err(NnError::InvalidConfig(_))
    ));
    assert!(matches!(
        DataLoader::from_rows(&inputs, &targets, 0, true),
        Err(NnError::InvalidConfig(_))
    ));
}
