use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};
use crate::train::epoch_stats::EpochStats;

/// Configuration for a single `fit` run.
///
/// Optimizer, loss and batch size live in the network's
/// [`NetworkConfig`](crate::network::NetworkConfig); this struct only
/// controls how long to train and how progress is reported.
///
/// # Fields
/// - `epochs`     : maximum number of full passes over the training data
/// - `patience`   : early stopping: stop after this many consecutive
///                   epochs without a new best loss; `0` disables it
/// - `verbose`    : print one line per epoch to stdout
/// - `progress_tx`: optional channel sender; one `EpochStats` is sent per
///                   completed epoch.  If the receiver is dropped the loop
///                   terminates early (clean shutdown).
/// - `stop_flag`  : optional atomic flag; when set to `true` from another
///                   thread the loop terminates after the current epoch.
#[derive(Debug, Clone, Default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub patience: usize,
    pub verbose: bool,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Creates a quiet `TrainConfig` with no early stopping, no progress
    /// channel and no stop flag.
    pub fn new(epochs: usize) -> Self {
        TrainConfig {
            epochs,
            ..TrainConfig::default()
        }
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_progress(mut self, tx: mpsc::Sender<EpochStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }
}
