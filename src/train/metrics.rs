/// Fraction of samples classified correctly.
///
/// Multi-column rows compare argmax indices; single-column rows
/// (sigmoid outputs) are thresholded at 0.5 on both sides. Returns 0 for an
/// empty set.
pub fn accuracy(predictions: &[Vec<f64>], targets: &[Vec<f64>]) -> f64 {
    let total = predictions.len().min(targets.len());
    if total == 0 {
        return 0.0;
    }
    let correct = predictions.iter().zip(targets.iter())
        .filter(|(pred, target)| {
            if pred.len() == 1 && target.len() == 1 {
                (pred[0] >= 0.5) == (target[0] >= 0.5)
            } else {
                argmax(pred) == argmax(target)
            }
        })
        .count();
    correct as f64 / total as f64
}

/// Index of the maximum element in a slice; first one wins on ties.
pub fn argmax(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, &x) in v.iter().enumerate() {
        if x > v[best] {
            best = i;
        }
    }
    best
}
