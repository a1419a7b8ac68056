// Tests for the optimizers' update rules, lazy per-layer state and the
// bias-always-plain-SGD rule.

use ferrite_grad::optim::optimizer::Optimizer;
use ferrite_grad::{Adam, AdamW, Matrix, NnError, OptimizerKind, OptimizerState, RmsProp, Sgd};

fn one(v: f64) -> Matrix {
    Matrix::from_row(vec![v])
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-12
}

#[test]
fn test_sgd_plain_step() {
    let mut sgd = Sgd::new(0.1);
    let mut w = Matrix::from_row(vec![1.0, -2.0]);
    let mut b = vec![0.5];
    sgd.update(0, &mut w, &mut b, &Matrix::from_row(vec![2.0, 1.0]), &[4.0]).unwrap();
    assert!(close(w.data[0][0], 0.8));
    assert!(close(w.data[0][1], -2.1));
    assert!(close(b[0], 0.1));
}

#[test]
fn test_sgd_momentum_accumulates_velocity() {
    let mut sgd = Sgd::new(0.1).with_momentum(0.9);
    let mut w = one(1.0);
    let mut b = vec![0.0];
    sgd.update(0, &mut w, &mut b, &one(1.0), &[1.0]).unwrap();
    // v = 0.1, w = 0.9
    assert!(close(w.data[0][0], 0.9));
    sgd.update(0, &mut w, &mut b, &one(1.0), &[1.0]).unwrap();
    // v = 0.9·0.1 + 0.1 = 0.19, w = 0.71
    assert!(close(sgd.velocity(0).unwrap().data[0][0], 0.19));
    assert!(close(w.data[0][0], 0.71));
    // Biases never use momentum.
    assert!(close(b[0], -0.2));
}

#[test]
fn test_sgd_weight_decay_and_clipping() {
    let mut sgd = Sgd::new(0.1).with_weight_decay(0.5).with_clip_value(1.0);
    let mut w = one(2.0);
    let mut b = vec![0.0];
    // clip(10) = 1, + 0.5·2 = 2, step 0.2
    sgd.update(0, &mut w, &mut b, &one(10.0), &[10.0]).unwrap();
    assert!(close(w.data[0][0], 1.8));
    // Biases see the clipped gradient but no decay.
    assert!(close(b[0], -0.1));
}

#[test]
fn test_adam_uses_raw_moments() {
    let mut adam = Adam::new(0.01);
    let mut w = one(0.0);
    let mut b = vec![0.0];
    adam.update(0, &mut w, &mut b, &one(0.5), &[0.5]).unwrap();
    // m = 0.05, v = 0.00025: step = 0.01 · 0.05 / (sqrt(0.00025) + 1e-8)
    let expected = -0.01 * 0.05 / (0.00025f64.sqrt() + 1e-8);
    assert!(close(w.data[0][0], expected));
    // Bias-corrected Adam would step by exactly lr on the first update.
    assert!((w.data[0][0] + 0.01).abs() > 1e-4);
    assert!(close(b[0], -0.005));

    let (m, v) = adam.moments(0).unwrap();
    assert!(close(m.data[0][0], 0.05));
    assert!(close(v.data[0][0], 0.00025));
}

#[test]
fn test_adamw_decays_weights_directly() {
    let mut with_decay = AdamW::new(0.1).with_weight_decay(0.5);
    let mut without = AdamW::new(0.1).with_weight_decay(0.0);
    let mut w1 = one(2.0);
    let mut w2 = one(2.0);
    let mut b = vec![0.0];
    with_decay.update(0, &mut w1, &mut b, &one(0.3), &[0.0]).unwrap();
    without.update(0, &mut w2, &mut b, &one(0.3), &[0.0]).unwrap();
    // Decay is lr · decay · W = 0.1 and does not enter the moments.
    assert!(close(w2.data[0][0] - w1.data[0][0], 0.1));
}

#[test]
fn test_adamw_clips_before_moments() {
    let mut adamw = AdamW::new(0.1).with_weight_decay(0.0).with_clip_value(0.5);
    let mut w = one(0.0);
    let mut b = vec![0.0];
    adamw.update(0, &mut w, &mut b, &one(100.0), &[100.0]).unwrap();
    let mut reference = AdamW::new(0.1).with_weight_decay(0.0);
    let mut w_ref = one(0.0);
    reference.update(0, &mut w_ref, &mut vec![0.0], &one(0.5), &[0.5]).unwrap();
    assert!(close(w.data[0][0], w_ref.data[0][0]));
    assert!(close(b[0], -0.05));
}

#[test]
fn test_rmsprop_step() {
    let mut rms = RmsProp::new(0.01);
    let mut w = one(1.0);
    let mut b = vec![0.0];
    rms.update(0, &mut w, &mut b, &one(2.0), &[2.0]).unwrap();
    // cache = 0.1 · 4 = 0.4
    let expected = 1.0 - 0.01 * 2.0 / (0.4f64.sqrt() + 1e-8);
    assert!(close(w.data[0][0], expected));
    assert!(close(b[0], -0.02));
}

#[test]
fn test_state_is_keyed_by_layer_and_shape_is_fixed() {
    let mut adam = Adam::new(0.01);
    let mut w = Matrix::zeros(2, 3);
    let mut b = vec![0.0; 2];
    adam.update(0, &mut w, &mut b, &Matrix::filled(2, 3, 0.1), &[0.0; 2]).unwrap();
    assert!(adam.moments(0).is_some());
    assert!(adam.moments(1).is_none());

    // A different shape under the same index is rejected.
    let mut w_other = Matrix::zeros(3, 3);
    let mut b_other = vec![0.0; 3];
    let err = adam.update(0, &mut w_other, &mut b_other, &Matrix::zeros(3, 3), &[0.0; 3]).unwrap_err();
    assert!(matches!(err, NnError::ShapeMismatch { .. }));

    adam.reset();
    assert!(adam.moments(0).is_none());
    adam.update(0, &mut w_other, &mut b_other, &Matrix::zeros(3, 3), &[0.0; 3]).unwrap();
}

#[test]
fn test_gradient_shape_must_mirror_parameters() {
    let mut sgd = Sgd::new(0.1);
    let mut w = Matrix::zeros(2, 2);
    let mut b = vec![0.0; 2];
    let err = sgd.update(0, &mut w, &mut b, &Matrix::zeros(2, 3), &[0.0; 2]).unwrap_err();
    assert!(matches!(err, NnError::ShapeMismatch { .. }));
    let err = sgd.update(0, &mut w, &mut b, &Matrix::zeros(2, 2), &[0.0; 3]).unwrap_err();
    assert!(matches!(err, NnError::ShapeMismatch { .. }));
}

#[test]
fn test_snapshot_restores_accumulators() {
    let mut adam = Adam::new(0.01);
    let mut w = one(1.0);
    let mut b = vec![0.0];
    adam.update(3, &mut w, &mut b, &one(0.2), &[0.0]).unwrap();

    let json = serde_json::to_string(&adam.snapshot()).unwrap();
    assert!(json.contains("\"kind\":\"adam\""));
    let state: OptimizerState = serde_json::from_str(&json).unwrap();
    assert_eq!(state.kind(), OptimizerKind::Adam);
    let mut restored = state.into_optimizer();

    let mut w_a = w.clone();
    let mut w_b = w.clone();
    adam.update(3, &mut w_a, &mut vec![0.0], &one(0.2), &[0.0]).unwrap();
    restored.update(3, &mut w_b, &mut vec![0.0], &one(0.2), &[0.0]).unwrap();
    assert_eq!(w_a, w_b);
}

#[test]
fn test_optimizer_identifiers() {
    assert_eq!("adamw".parse::<OptimizerKind>().unwrap(), OptimizerKind::AdamW);
    assert_eq!("RMSProp".parse::<OptimizerKind>().unwrap(), OptimizerKind::RmsProp);
    assert!(matches!("lbfgs".parse::<OptimizerKind>(), Err(NnError::UnknownOptimizer(_))));
}
