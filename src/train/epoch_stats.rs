use serde::{Serialize, Deserialize};

/// Per-epoch training statistics emitted by `train_loop`.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the training
/// loop sends one `EpochStats` value at the end of every completed epoch,
/// including the one that triggers early stopping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// 1-based epoch number within this run.
    pub epoch: usize,
    /// Maximum epochs requested for this run.
    pub total_epochs: usize,
    /// Mean training loss over the mini-batches of this epoch.
    pub train_loss: f64,
    /// Mean validation loss (inference mode), if a validation set was provided.
    pub val_loss: Option<f64>,
    /// Training accuracy as a fraction in [0, 1]; only set for CrossEntropy runs.
    pub train_accuracy: Option<f64>,
    /// Validation accuracy as a fraction in [0, 1]; only set for CrossEntropy runs
    /// when a validation set is available.
    pub val_accuracy: Option<f64>,
    /// Wall-clock duration of this single epoch in milliseconds.
    pub elapsed_ms: u64,
}

/// Outcome of a `fit` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub epochs_run: usize,
    /// Mean loss of the last completed epoch.
    pub final_loss: f64,
    pub best_loss: f64,
    /// True when patience ran out before `epochs` was reached.
    pub stopped_early: bool,
    /// Mean training loss per completed epoch.
    pub history: Vec<f64>,
}
