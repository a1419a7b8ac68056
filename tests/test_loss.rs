// Tests for the loss functions.

use ferrite_grad::loss::{CrossEntropyLoss, MseLoss};
use ferrite_grad::{Backend, Loss, LossType, Matrix, NnError};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_mse_of_identical_tensors_is_zero() {
    let backend = Backend::reference();
    let mut rng = StdRng::seed_from_u64(5);
    for (rows, cols) in [(1, 1), (4, 3), (10, 7)] {
        let x = Matrix::random(rows, cols, &mut rng);
        assert_eq!(MseLoss.calculate(&backend, &x, &x).unwrap(), 0.0);
    }
}

#[test]
fn test_mse_averages_over_every_element() {
    let backend = Backend::reference();
    let output = Matrix::from_data(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
    let target = Matrix::from_data(vec![vec![0.0, 2.0], vec![3.0, 2.0]]).unwrap();
    // (1 + 0 + 0 + 4) / 4
    let loss = MseLoss.calculate(&backend, &output, &target).unwrap();
    assert!((loss - 1.25).abs() < 1e-12);

    let grad = MseLoss.gradient(&backend, &output, &target).unwrap();
    assert_eq!(grad.data, vec![vec![1.0, 0.0], vec![0.0, 2.0]]);
}

#[test]
fn test_cross_entropy_divides_by_class_count() {
    let backend = Backend::reference();
    // Two samples, four classes: the divisor is 4 even though the batch is 2.
    let output = Matrix::from_data(vec![
        vec![0.7, 0.1, 0.1, 0.1],
        vec![0.25, 0.25, 0.25, 0.25],
    ]).unwrap();
    let target = Matrix::from_data(vec![
        vec![1.0, 0.0, 0.0, 0.0],
        vec![0.0, 0.0, 1.0, 0.0],
    ]).unwrap();
    let expected = -(0.7f64.ln() + 0.25f64.ln()) / 4.0;
    let loss = CrossEntropyLoss.calculate(&backend, &output, &target).unwrap();
    assert!((loss - expected).abs() < 1e-12);

    let grad = CrossEntropyLoss.gradient(&backend, &output, &target).unwrap();
    assert!((grad.data[0][0] + 0.3).abs() < 1e-12);
    assert!((grad.data[1][2] + 0.75).abs() < 1e-12);
}

#[test]
fn test_cross_entropy_clips_zero_probabilities() {
    let backend = Backend::reference();
    let output = Matrix::from_row(vec![0.0, 1.0]);
    let target = Matrix::from_row(vec![1.0, 0.0]);
    let loss = CrossEntropyLoss.calculate(&backend, &output, &target).unwrap();
    assert!(loss.is_finite());
    assert!(loss > 10.0);
}

#[test]
fn test_shape_mismatch_is_reported() {
    let backend = Backend::reference();
    let a = Matrix::zeros(2, 3);
    let b = Matrix::zeros(3, 2);
    assert!(matches!(MseLoss.calculate(&backend, &a, &b), Err(NnError::ShapeMismatch { .. })));
    assert!(matches!(CrossEntropyLoss.calculate(&backend, &a, &b), Err(NnError::ShapeMismatch { .. })));
}

#[test]
fn test_loss_type_identifiers() {
    assert_eq!("mse".parse::<LossType>().unwrap(), LossType::Mse);
    assert_eq!("crossentropy".parse::<LossType>().unwrap(), LossType::CrossEntropy);
    assert_eq!(LossType::CrossEntropy.build().kind(), LossType::CrossEntropy);
    assert!(matches!("hinge".parse::<LossType>(), Err(NnError::UnknownLoss(_))));
}
