use super::live::LivePredictor;
use crate::backtest::{BacktestResult, Backtester};
use crate::error::PredictorError;
use crate::features::{FeatureConfig, FeatureEngine};
use crate::models::{Candle, FeatureRow, Prediction, FEATURE_COUNT};
use crate::network::{ClassifierConfig, FitParams, LstmClassifier, SequenceModel, TrainingHistory};
use crate::sequence::SequenceBuilder;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Everything one training run needs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    pub sequence_length: usize,
    pub epochs: usize,
    pub batch_size: usize,
    /// Trailing share of windows kept out of training for the backtest
    pub test_fraction: f64,
    /// Trailing share of the training windows used for per-epoch validation
    pub validation_fraction: f64,
    pub features: FeatureConfig,
    pub classifier: ClassifierConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            sequence_length: 60,
            epochs: 50,
            batch_size: 32,
            test_fraction: 0.2,
            validation_fraction: 0.1,
            features: FeatureConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sequence_length == 0 {
            return Err(PredictorError::config("sequence_length must be positive"));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PredictorError::config(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        self.fit_params().validate()?;
        self.classifier.network.validate()?;
        self.classifier.optimizer.validate()?;
        Ok(())
    }

    pub fn fit_params(&self) -> FitParams {
        FitParams {
            epochs: self.epochs,
            batch_size: self.batch_size,
            validation_fraction: self.validation_fraction,
        }
    }
}

/// Outcome of a successful training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub model: String,
    pub history: TrainingHistory,
    pub backtest: BacktestResult,
    pub feature_rows: usize,
    pub train_windows: usize,
    pub test_windows: usize,
}

struct TrainedState {
    run_id: Uuid,
    engine: FeatureEngine,
    live: LivePredictor,
    /// Bars the model was trained on, used to seed live indicator state
    bars: Vec<Candle>,
}

impl TrainedState {
    /// Feature rows for `bars`, derived as if they extended the training
    /// series. Training bars older than the first live bar are prepended so
    /// Wilder RSI carries the same state it had during training.
    fn features_for(&self, bars: &[Candle]) -> Result<Vec<FeatureRow>> {
        let Some(first) = bars.first() else {
            return self.engine.derive(bars);
        };

        let prefix = self
            .bars
            .partition_point(|b| b.timestamp < first.timestamp);
        if prefix == 0 {
            return self.engine.derive(bars);
        }

        let mut series = Vec::with_capacity(prefix + bars.len());
        series.extend_from_slice(&self.bars[..prefix]);
        series.extend_from_slice(bars);

        let rows = self.engine.derive(&series)?;
        tracing::debug!(
            "Seeded live features with {} training bars before {}",
            prefix,
            first.timestamp
        );

        Ok(rows
            .into_iter()
            .filter(|r| r.timestamp >= first.timestamp)
            .collect())
    }
}

/// Owns the fitted normalizer and model between training and live calls
///
/// A new training run discards the previous state before it starts, so a
/// failed run leaves the session untrained.
#[derive(Default)]
pub struct PredictorSession {
    trained: Option<TrainedState>,
}

impl PredictorSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Id of the run that produced the current model
    pub fn run_id(&self) -> Option<Uuid> {
        self.trained.as_ref().map(|t| t.run_id)
    }

    pub fn reset(&mut self) {
        if let Some(previous) = self.trained.take() {
            tracing::debug!("Discarding model from run {}", previous.run_id);
        }
    }

    /// Train a fresh `LstmClassifier` built from `config.classifier`
    pub fn train(&mut self, bars: &[Candle], config: &TrainingConfig) -> Result<TrainingReport> {
        self.reset();
        config.validate()?;

        let model = LstmClassifier::new(FEATURE_COUNT, config.classifier.clone())?;
        self.train_with_model(bars, config, Box::new(model))
    }

    /// Run the full pipeline with a caller-supplied model
    ///
    /// Features are derived, windows built and split, the model is fit on
    /// the training windows and backtested on the test windows.
    pub fn train_with_model(
        &mut self,
        bars: &[Candle],
        config: &TrainingConfig,
        mut model: Box<dyn SequenceModel>,
    ) -> Result<TrainingReport> {
        self.reset();
        config.validate()?;

        let run_id = Uuid::new_v4();
        tracing::info!(
            "Training run {} started: {} bars, sequence length {}, model {}",
            run_id,
            bars.len(),
            config.sequence_length,
            model.name()
        );

        let engine = FeatureEngine::new(config.features.clone())?;
        let rows = engine.derive_for_training(bars, config.sequence_length)?;

        let mut builder = SequenceBuilder::new(config.sequence_length)?;
        let split = builder.fit_transform(&rows, config.test_fraction)?;

        let history = model.fit(&split.train.inputs, &split.train.labels, &config.fit_params())?;
        let backtest = Backtester::new().run(model.as_ref(), &split.test)?;

        let report = TrainingReport {
            run_id,
            model: model.name().to_string(),
            history,
            backtest,
            feature_rows: rows.len(),
            train_windows: split.train.len(),
            test_windows: split.test.len(),
        };

        self.trained = Some(TrainedState {
            run_id,
            engine,
            live: LivePredictor::new(builder, model)?,
            bars: bars.to_vec(),
        });

        tracing::info!(
            "Training run {} finished: test accuracy {:.2}%",
            run_id,
            report.backtest.accuracy * 100.0
        );

        Ok(report)
    }

    /// Predict the bar after the last of `bars`
    ///
    /// `bars` are taken to be the same market the model was trained on.
    /// A tail that overlaps or follows the training series only needs one
    /// full window; a tail older than the training data must also cover the
    /// indicator warmup (`bars_needed`).
    pub fn predict_next(&self, bars: &[Candle]) -> Result<Prediction> {
        let rows = self.live_features(bars)?;
        self.state()?.live.predict_next(&rows)
    }

    /// Feature rows `predict_next` feeds to the model for `bars`
    pub fn live_features(&self, bars: &[Candle]) -> Result<Vec<FeatureRow>> {
        self.state()?.features_for(bars)
    }

    fn state(&self) -> Result<&TrainedState> {
        self.trained.as_ref().ok_or_else(|| {
            PredictorError::NotFitted("no training run has completed in this session".into())
        })
    }

    /// Bars `predict_next` needs when they do not extend the training series
    pub fn bars_needed(&self) -> Option<usize> {
        self.trained.as_ref().map(|t| {
            (t.live.sequence_length() + t.engine.warmup()).max(t.engine.min_bars())
        })
    }
}

/// Thread-safe handle to a session
///
/// Training takes the write lock; predictions share the read lock.
#[derive(Clone, Default)]
pub struct SharedPredictor {
    session: Arc<RwLock<PredictorSession>>,
}

impl SharedPredictor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn train(&self, bars: &[Candle], config: &TrainingConfig) -> Result<TrainingReport> {
        let mut session = self
            .session
            .write()
            .map_err(|_| PredictorError::SessionPoisoned)?;
        session.train(bars, config)
    }

    pub fn predict_next(&self, bars: &[Candle]) -> Result<Prediction> {
        let session = self
            .session
            .read()
            .map_err(|_| PredictorError::SessionPoisoned)?;
        session.predict_next(bars)
    }

    pub fn is_trained(&self) -> Result<bool> {
        let session = self
            .session
            .read()
            .map_err(|_| PredictorError::SessionPoisoned)?;
        Ok(session.is_trained())
    }

    pub fn reset(&self) -> Result<()> {
        let mut session = self
            .session
            .write()
            .map_err(|_| PredictorError::SessionPoisoned)?;
        session.reset();
        Ok(())
    }
}
