// Recurrent sequence classifier
pub mod classifier;
pub mod config;
mod layers;
pub mod optimizer;
pub mod stack;

pub use classifier::LstmClassifier;
pub use config::{Activation, ClassifierConfig, LayerSpec, NetworkConfig, OptimizerConfig};
pub use optimizer::Adam;
pub use stack::{build_network, Network};

use crate::error::PredictorError;
use crate::Result;
use ndarray::Array3;
use serde::{Deserialize, Serialize};

/// Base trait for binary classifiers over fixed-length feature windows
pub trait SequenceModel: Send + Sync {
    /// Model name for logs and reports
    fn name(&self) -> &str;

    /// Train on `[windows, steps, features]` with 0/1 labels
    fn fit(
        &mut self,
        windows: &Array3<f64>,
        labels: &[u8],
        params: &FitParams,
    ) -> Result<TrainingHistory>;

    /// Probability of "up" for every window, each in [0, 1]
    fn predict_proba(&self, windows: &Array3<f64>) -> Result<Vec<f64>>;

    /// Whether `fit` has completed at least once
    fn is_fitted(&self) -> bool;
}

/// Training loop knobs passed to `SequenceModel::fit`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FitParams {
    pub epochs: usize,
    pub batch_size: usize,
    /// Trailing share of the training windows held out for validation
    pub validation_fraction: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            validation_fraction: 0.1,
        }
    }
}

impl FitParams {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(PredictorError::config("epochs must be positive"));
        }
        if self.batch_size == 0 {
            return Err(PredictorError::config("batch_size must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(PredictorError::config(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }
}

/// Loss and accuracy after one pass over the training windows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.last().map(|e| e.loss)
    }

    /// Epoch with the lowest validation loss, if validation ran
    pub fn best_validation(&self) -> Option<&EpochMetrics> {
        self.epochs
            .iter()
            .filter(|e| e.val_loss.is_some())
            .min_by(|a, b| {
                a.val_loss
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.val_loss.unwrap_or(f64::INFINITY))
            })
    }
}
