use super::config::ClassifierConfig;
use super::optimizer::Adam;
use super::stack::{build_network, Network};
use super::{EpochMetrics, FitParams, SequenceModel, TrainingHistory};
use crate::error::PredictorError;
use crate::Result;
use ndarray::{s, Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Probabilities are clamped this far from 0 and 1 inside the loss
const LOSS_EPSILON: f64 = 1e-7;

/// Windows per forward pass at inference time
const PREDICT_CHUNK: usize = 256;

/// Stacked-LSTM binary classifier trained with binary cross-entropy and Adam
#[derive(Debug, Clone)]
pub struct LstmClassifier {
    config: ClassifierConfig,
    network: Network,
    optimizer: Adam,
    rng: StdRng,
    fitted: bool,
}

impl LstmClassifier {
    pub fn new(input_features: usize, config: ClassifierConfig) -> Result<Self> {
        config.optimizer.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let network = build_network(input_features, &config.network, &mut rng)?;
        let optimizer = Adam::new(config.optimizer.clone());

        tracing::info!(
            "Created LSTM classifier: {} layers, {} trainable parameters",
            config.network.layers.len(),
            network.parameter_count()
        );

        Ok(Self {
            config,
            network,
            optimizer,
            rng,
            fitted: false,
        })
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn parameter_count(&self) -> usize {
        self.network.parameter_count()
    }

    fn check_shape(&self, windows: &Array3<f64>) -> Result<()> {
        let features = windows.shape()[2];
        if features != self.network.input_features() {
            return Err(PredictorError::config(format!(
                "classifier expects {} features per step, got {}",
                self.network.input_features(),
                features
            )));
        }
        Ok(())
    }

    /// One pass over the training windows in shuffled mini-batches.
    /// Returns (mean loss, accuracy).
    fn train_epoch(
        &mut self,
        windows: &Array3<f64>,
        labels: &[u8],
        train_count: usize,
        batch_size: usize,
    ) -> Result<(f64, f64)> {
        let mut order: Vec<usize> = (0..train_count).collect();
        order.shuffle(&mut self.rng);

        let mut loss_sum = 0.0;
        let mut correct = 0usize;

        for batch in order.chunks(batch_size) {
            let x = windows.select(Axis(0), batch);
            let y: Vec<f64> = batch.iter().map(|&i| f64::from(labels[i])).collect();

            let (probs, caches) = self.network.forward(&x, Some(&mut self.rng))?;
            let n = batch.len() as f64;

            for (p, t) in probs.column(0).iter().zip(&y) {
                loss_sum += binary_cross_entropy(*p, *t);
                if (*p > 0.5) == (*t > 0.5) {
                    correct += 1;
                }
            }

            // d(BCE)/d(logit) for a sigmoid output, averaged over the batch
            let d_logits = Array2::from_shape_fn(probs.raw_dim(), |(i, _)| (probs[[i, 0]] - y[i]) / n);
            let mut grads = self.network.backward(&caches, d_logits)?;
            if let Some(max_norm) = self.config.optimizer.clip_norm {
                Network::clip_gradients(&mut grads, max_norm);
            }

            self.optimizer.begin_step();
            self.network.apply_gradients(&grads, &mut self.optimizer);
        }

        let loss = loss_sum / train_count as f64;
        if !loss.is_finite() {
            return Err(PredictorError::degenerate(format!(
                "training loss became {} after {} optimizer steps",
                loss,
                self.optimizer.steps()
            )));
        }

        Ok((loss, correct as f64 / train_count as f64))
    }
}

impl SequenceModel for LstmClassifier {
    fn name(&self) -> &str {
        "stacked-lstm"
    }

    fn fit(
        &mut self,
        windows: &Array3<f64>,
        labels: &[u8],
        params: &FitParams,
    ) -> Result<TrainingHistory> {
        params.validate()?;
        self.check_shape(windows)?;

        let total = windows.shape()[0];
        if total != labels.len() {
            return Err(PredictorError::config(format!(
                "{} windows but {} labels",
                total,
                labels.len()
            )));
        }
        if let Some(index) = labels.iter().position(|&l| l > 1) {
            return Err(PredictorError::config(format!(
                "label at index {} is {}, expected 0 or 1",
                index, labels[index]
            )));
        }

        // Validation windows are the trailing slice, taken before shuffling
        let val_count = (total as f64 * params.validation_fraction).floor() as usize;
        let train_count = total - val_count;
        if train_count == 0 {
            return Err(PredictorError::InsufficientData {
                what: "training windows",
                needed: 1,
                got: train_count,
            });
        }

        let validation = (val_count > 0).then(|| {
            (
                windows.slice(s![train_count.., .., ..]).to_owned(),
                &labels[train_count..],
            )
        });

        tracing::info!(
            "Training {} on {} windows ({} validation) for {} epochs, batch size {}",
            self.name(),
            train_count,
            val_count,
            params.epochs,
            params.batch_size
        );

        // Weights change from here on; a failed run must not look trained
        self.fitted = false;

        let mut history = TrainingHistory::default();
        for epoch in 1..=params.epochs {
            let (loss, accuracy) =
                self.train_epoch(windows, labels, train_count, params.batch_size)?;

            let (val_loss, val_accuracy) = match &validation {
                Some((x, y)) => {
                    let probs = self.network.predict(x)?;
                    let (l, a) = score(&probs, y);
                    (Some(l), Some(a))
                }
                None => (None, None),
            };

            tracing::debug!(
                "Epoch {}/{}: loss={:.4} acc={:.3} val_loss={:?} val_acc={:?}",
                epoch,
                params.epochs,
                loss,
                accuracy,
                val_loss,
                val_accuracy
            );

            history.epochs.push(EpochMetrics {
                epoch,
                loss,
                accuracy,
                val_loss,
                val_accuracy,
            });
        }

        self.fitted = true;
        if let Some(last) = history.last() {
            tracing::info!(
                "Training finished: loss={:.4} accuracy={:.3}",
                last.loss,
                last.accuracy
            );
        }

        Ok(history)
    }

    fn predict_proba(&self, windows: &Array3<f64>) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(PredictorError::NotFitted(format!(
                "{} has not been trained",
                self.name()
            )));
        }
        self.check_shape(windows)?;

        let total = windows.shape()[0];
        let mut probs = Vec::with_capacity(total);
        for start in (0..total).step_by(PREDICT_CHUNK) {
            let end = (start + PREDICT_CHUNK).min(total);
            let chunk = windows.slice(s![start..end, .., ..]).to_owned();
            probs.extend(self.network.predict(&chunk)?);
        }

        Ok(probs)
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

fn binary_cross_entropy(p: f64, target: f64) -> f64 {
    let p = p.clamp(LOSS_EPSILON, 1.0 - LOSS_EPSILON);
    -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
}

/// Mean loss and accuracy of probabilities against 0/1 labels
fn score(probs: &[f64], labels: &[u8]) -> (f64, f64) {
    if probs.is_empty() {
        return (0.0, 0.0);
    }

    let mut loss = 0.0;
    let mut correct = 0usize;
    for (&p, &label) in probs.iter().zip(labels) {
        let target = f64::from(label);
        loss += binary_cross_entropy(p, target);
        if u8::from(p > 0.5) == label {
            correct += 1;
        }
    }

    let n = probs.len() as f64;
    (loss / n, correct as f64 / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::config::{Activation, LayerSpec, NetworkConfig, OptimizerConfig};
    use rand::Rng;

    fn small_config(seed: u64) -> ClassifierConfig {
        ClassifierConfig {
            network: NetworkConfig {
                layers: vec![
                    LayerSpec::Lstm { units: 8 },
                    LayerSpec::Lstm { units: 4 },
                    LayerSpec::Dense {
                        units: 4,
                        activation: Activation::Tanh,
                    },
                    LayerSpec::Dense {
                        units: 1,
                        activation: Activation::Sigmoid,
                    },
                ],
            },
            optimizer: OptimizerConfig {
                learning_rate: 0.01,
                ..OptimizerConfig::default()
            },
            seed: Some(seed),
        }
    }

    /// Windows whose every value sits near 0.85 (label 1) or 0.15 (label 0)
    fn separable(count: usize) -> (Array3<f64>, Vec<u8>) {
        let mut rng = StdRng::seed_from_u64(99);
        let labels: Vec<u8> = (0..count).map(|i| (i % 2) as u8).collect();
        let windows = Array3::from_shape_fn((count, 5, 7), |(i, _, _)| {
            let base = if labels[i] == 1 { 0.85 } else { 0.15 };
            base + rng.gen_range(-0.05..0.05)
        });
        (windows, labels)
    }

    #[test]
    fn test_learns_separable_windows() {
        let (windows, labels) = separable(64);
        let mut model = LstmClassifier::new(7, small_config(42)).unwrap();

        let params = FitParams {
            epochs: 40,
            batch_size: 16,
            validation_fraction: 0.0,
        };
        let history = model.fit(&windows, &labels, &params).unwrap();

        assert_eq!(history.len(), 40);
        let first = history.epochs[0].loss;
        let last = history.final_loss().unwrap();
        assert!(last < first, "loss did not decrease: {} -> {}", first, last);

        let probs = model.predict_proba(&windows).unwrap();
        let (_, accuracy) = score(&probs, &labels);
        assert!(accuracy >= 0.9, "accuracy {}", accuracy);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LstmClassifier::new(7, small_config(1)).unwrap();
        let (windows, _) = separable(4);
        assert!(matches!(
            model.predict_proba(&windows),
            Err(PredictorError::NotFitted(_))
        ));
    }

    #[test]
    fn test_validation_metrics_reported() {
        let (windows, labels) = separable(20);
        let mut model = LstmClassifier::new(7, small_config(3)).unwrap();

        let params = FitParams {
            epochs: 2,
            batch_size: 8,
            validation_fraction: 0.2,
        };
        let history = model.fit(&windows, &labels, &params).unwrap();
        assert!(history.epochs.iter().all(|e| e.val_loss.is_some()));

        let no_val = FitParams {
            validation_fraction: 0.0,
            ..params
        };
        let history = model.fit(&windows, &labels, &no_val).unwrap();
        assert!(history.epochs.iter().all(|e| e.val_accuracy.is_none()));
    }

    #[test]
    fn test_same_seed_same_predictions() {
        let (windows, labels) = separable(16);
        let params = FitParams {
            epochs: 3,
            batch_size: 4,
            validation_fraction: 0.0,
        };

        let mut a = LstmClassifier::new(7, small_config(7)).unwrap();
        let mut b = LstmClassifier::new(7, small_config(7)).unwrap();
        a.fit(&windows, &labels, &params).unwrap();
        b.fit(&windows, &labels, &params).unwrap();

        assert_eq!(a.predict_proba(&windows).unwrap(), b.predict_proba(&windows).unwrap());
    }

    #[test]
    fn test_rejects_bad_labels() {
        let (windows, mut labels) = separable(8);
        labels[3] = 2;
        let mut model = LstmClassifier::new(7, small_config(1)).unwrap();
        let result = model.fit(&windows, &labels, &FitParams::default());
        assert!(matches!(result, Err(PredictorError::InvalidConfiguration(_))));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_rejects_feature_mismatch() {
        let mut model = LstmClassifier::new(3, small_config(1)).unwrap();
        let (windows, labels) = separable(8);
        assert!(model.fit(&windows, &labels, &FitParams::default()).is_err());
    }

    #[test]
    fn test_empty_training_set() {
        let mut model = LstmClassifier::new(7, small_config(1)).unwrap();
        let windows = Array3::zeros((0, 5, 7));
        let result = model.fit(&windows, &[], &FitParams::default());
        assert!(matches!(result, Err(PredictorError::InsufficientData { .. })));
    }

    #[test]
    fn test_non_finite_loss_aborts_training() {
        let (windows, labels) = separable(16);
        let params = FitParams {
            epochs: 2,
            batch_size: 8,
            validation_fraction: 0.0,
        };

        let mut model = LstmClassifier::new(7, small_config(5)).unwrap();
        model.fit(&windows, &labels, &params).unwrap();
        assert!(model.is_fitted());

        let mut corrupt = windows.clone();
        corrupt[[0, 0, 0]] = f64::NAN;
        let result = model.fit(&corrupt, &labels, &params);

        assert!(matches!(result, Err(PredictorError::NumericDegeneracy(_))));
        assert!(!model.is_fitted());
        assert!(matches!(
            model.predict_proba(&windows),
            Err(PredictorError::NotFitted(_))
        ));
    }

    #[test]
    fn test_score() {
        let (loss, accuracy) = score(&[0.9, 0.2, 0.6], &[1, 0, 0]);
        assert!((accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert!(loss > 0.0);
    }
}
