use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::error::{NnError, Result};
use crate::loss::loss_type::LossType;
use crate::math::tensor::Tensor;
use crate::network::network::Network;
use crate::train::data_loader::DataLoader;
use crate::train::epoch_stats::{EpochStats, TrainReport};
use crate::train::metrics::accuracy;
use crate::train::train_config::TrainConfig;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `network` for up to `config.epochs` epochs.
///
/// Each epoch reshuffles the samples, runs every mini-batch through
/// [`Network::train_batch`] and records the mean mini-batch loss. Batch
/// size comes from the network's own `NetworkConfig`.
///
/// # Early termination
/// The loop breaks early if:
/// - `config.patience > 0` and the epoch loss has not beaten the best seen
///   loss for `patience` consecutive epochs,
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
///
/// # Errors
/// Empty or mismatched datasets are `InvalidConfig`; shape problems inside
/// the network surface unchanged.
pub fn train_loop(
    network: &mut Network,
    train_inputs: &Tensor,
    train_targets: &Tensor,
    validation: Option<(&Tensor, &Tensor)>,
    config: &TrainConfig,
) -> Result<TrainReport> {
    if train_inputs.batch_size() == 0 {
        return Err(NnError::InvalidConfig("training set is empty".into()));
    }
    if let Some((vi, vt)) = validation {
        if vi.batch_size() != vt.batch_size() {
            return Err(NnError::InvalidConfig(format!(
                "{} validation inputs but {} targets",
                vi.batch_size(),
                vt.batch_size()
            )));
        }
    }

    let mut loader = DataLoader::new(
        train_inputs.clone(),
        train_targets.clone(),
        network.config().batch_size,
        true,
    )?;
    let track_accuracy = network.loss_type() == LossType::CrossEntropy;

    let mut history = Vec::with_capacity(config.epochs);
    let mut best_loss = f64::INFINITY;
    let mut stale_epochs = 0;
    let mut stopped_early = false;

    for epoch in 1..=config.epochs {
        if stop_requested(config) {
            break;
        }

        let t_start = Instant::now();

        // ── One full pass over the training data ───────────────────────────
        loader.shuffle(network.rng_mut());
        let mut total_loss = 0.0;
        let mut batches = 0usize;
        for batch in loader.batches() {
            let (x, y) = batch?;
            total_loss += network.train_batch(&x, &y)?;
            batches += 1;
        }
        let train_loss = total_loss / batches.max(1) as f64;
        network.advance_epoch();
        history.push(train_loss);

        let elapsed_ms = t_start.elapsed().as_millis() as u64;

        // ── Accuracy (CrossEntropy only) ───────────────────────────────────
        let train_accuracy = if track_accuracy {
            Some(dataset_accuracy(network, train_inputs, train_targets)?)
        } else {
            None
        };

        // ── Validation ────────────────────────────────────────────────────
        let (val_loss, val_accuracy) = match validation {
            Some((vi, vt)) if vi.batch_size() > 0 => {
                let loss = network.evaluate(vi, vt)?;
                let acc = if track_accuracy {
                    Some(dataset_accuracy(network, vi, vt)?)
                } else {
                    None
                };
                (Some(loss), acc)
            }
            _ => (None, None),
        };

        if config.verbose {
            match val_loss {
                Some(v) => println!("Epoch {epoch}/{}: loss = {train_loss:.6}, val_loss = {v:.6}", config.epochs),
                None => println!("Epoch {epoch}/{}: loss = {train_loss:.6}", config.epochs),
            }
        }

        // ── Emit progress ─────────────────────────────────────────────────
        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            val_loss,
            train_accuracy,
            val_accuracy,
            elapsed_ms,
        };

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                break;
            }
        }

        // ── Early stopping ────────────────────────────────────────────────
        if train_loss < best_loss {
            best_loss = train_loss;
            stale_epochs = 0;
        } else {
            stale_epochs += 1;
        }
        if config.patience > 0 && stale_epochs >= config.patience {
            if config.verbose {
                println!("Early stopping at epoch {epoch}: no improvement for {} epochs", config.patience);
            }
            stopped_early = true;
            break;
        }
    }

    Ok(TrainReport {
        epochs_run: history.len(),
        final_loss: history.last().copied().unwrap_or(f64::NAN),
        best_loss,
        stopped_early,
        history,
    })
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
}

/// Accuracy over a whole dataset in inference mode.
fn dataset_accuracy(network: &mut Network, inputs: &Tensor, targets: &Tensor) -> Result<f64> {
    let predictions = network.predict_tensor(inputs)?;
    let pred_rows = predictions.reshape(vec![predictions.batch_size(), predictions.sample_len()])?.to_rows();
    let target_rows = targets.reshape(vec![targets.batch_size(), targets.sample_len()])?.to_rows();
    Ok(accuracy(&pred_rows, &target_rows))
}
