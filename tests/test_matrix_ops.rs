// Tests for the numeric backends: matrix algebra, shape errors and
// agreement between the reference, blocked and auto-detected backends.

use ferrite_grad::math::backend::{BlockedBackend, ReferenceBackend};
use ferrite_grad::{Backend, BackendKind, Matrix, NnError};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn all_backends() -> Vec<Backend> {
    vec![
        Backend::reference(),
        Backend::from_ops(BlockedBackend),
        Backend::detect(),
    ]
}

#[test]
fn test_transpose_is_an_involution() {
    let mut rng = StdRng::seed_from_u64(7);
    for (rows, cols) in [(1, 1), (1, 5), (4, 1), (3, 7), (8, 8)] {
        let a = Matrix::random(rows, cols, &mut rng);
        for backend in all_backends() {
            let back = backend.transpose(&backend.transpose(&a));
            assert_eq!(back, a, "{:?} on {rows}x{cols}", backend.kind());
        }
    }
}

#[test]
fn test_multiply_known_product() {
    let a = Matrix::from_data(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
    let b = Matrix::from_data(vec![vec![7.0, 8.0], vec![9.0, 10.0], vec![11.0, 12.0]]).unwrap();
    for backend in all_backends() {
        let c = backend.multiply(&a, &b).unwrap();
        assert_eq!(c.data, vec![vec![58.0, 64.0], vec![139.0, 154.0]]);
    }
}

#[test]
fn test_multiply_inner_dimension_mismatch() {
    let a = Matrix::zeros(2, 3);
    let b = Matrix::zeros(2, 3);
    for backend in all_backends() {
        match backend.multiply(&a, &b) {
            Err(NnError::ShapeMismatch { op, left, right }) => {
                assert_eq!(op, "multiply");
                assert_eq!(left, vec![2, 3]);
                assert_eq!(right, vec![2, 3]);
            }
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }
}

#[test]
fn test_elementwise_ops_reject_different_shapes() {
    let a = Matrix::zeros(2, 2);
    let b = Matrix::zeros(2, 3);
    for backend in all_backends() {
        assert!(matches!(backend.add(&a, &b), Err(NnError::ShapeMismatch { .. })));
        assert!(matches!(backend.subtract(&a, &b), Err(NnError::ShapeMismatch { .. })));
        assert!(matches!(backend.hadamard(&a, &b), Err(NnError::ShapeMismatch { .. })));
    }
}

#[test]
fn test_elementwise_ops() {
    let a = Matrix::from_data(vec![vec![1.0, -2.0], vec![3.0, 4.0]]).unwrap();
    let b = Matrix::from_data(vec![vec![0.5, 2.0], vec![-1.0, 1.0]]).unwrap();
    for backend in all_backends() {
        assert_eq!(backend.add(&a, &b).unwrap().data, vec![vec![1.5, 0.0], vec![2.0, 5.0]]);
        assert_eq!(backend.subtract(&a, &b).unwrap().data, vec![vec![0.5, -4.0], vec![4.0, 3.0]]);
        assert_eq!(backend.hadamard(&a, &b).unwrap().data, vec![vec![0.5, -4.0], vec![-3.0, 4.0]]);
        assert_eq!(backend.scalar_multiply(&a, 2.0).data, vec![vec![2.0, -4.0], vec![6.0, 8.0]]);
        assert_eq!(backend.clip(&a, -1.0, 3.0).data, vec![vec![1.0, -1.0], vec![3.0, 3.0]]);
    }
}

#[test]
fn test_backends_agree_bit_for_bit() {
    let mut rng = StdRng::seed_from_u64(99);
    let a = Matrix::random(17, 23, &mut rng);
    let b = Matrix::random(23, 9, &mut rng);
    let reference = Backend::from_ops(ReferenceBackend);
    let expected = reference.multiply(&a, &b).unwrap();
    for backend in all_backends() {
        assert_eq!(backend.multiply(&a, &b).unwrap(), expected, "{:?}", backend.kind());
    }
}

#[test]
fn test_backend_selection() {
    assert_eq!(Backend::select(BackendKind::Reference).unwrap().kind(), BackendKind::Reference);
    assert_eq!(Backend::select(BackendKind::Blocked).unwrap().kind(), BackendKind::Blocked);
    let auto = Backend::select(BackendKind::Auto).unwrap();
    assert_ne!(auto.kind(), BackendKind::Auto);
    assert!(matches!("gpu".parse::<BackendKind>(), Err(NnError::UnknownBackend(_))));
}

#[test]
fn test_ragged_rows_are_rejected() {
    let ragged = Matrix::from_data(vec![vec![1.0, 2.0], vec![3.0]]);
    assert!(matches!(ragged, Err(NnError::ShapeMismatch { .. })));
}
