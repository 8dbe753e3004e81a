use chrono::{TimeZone, Utc};
use crypto_predictor::backtest::{MarketScenario, SyntheticDataGenerator};
use crypto_predictor::features::FeatureEngine;
use crypto_predictor::network::{
    ClassifierConfig, FitParams, NetworkConfig, OptimizerConfig, SequenceModel, TrainingHistory,
};
use crypto_predictor::sequence::SequenceBuilder;
use crypto_predictor::*;
use ndarray::Array3;
use std::thread;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("crypto_predictor=debug")
        .try_init()
        .ok();
}

fn bars(scenario: MarketScenario, count: usize) -> Vec<Candle> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    SyntheticDataGenerator::new(42)
        .with_start_time(start)
        .generate(scenario, count, 60)
}

/// Small network so the suite trains in seconds
fn fast_config(epochs: usize) -> TrainingConfig {
    TrainingConfig {
        sequence_length: 60,
        epochs,
        batch_size: 16,
        classifier: ClassifierConfig {
            network: NetworkConfig::compact((8, 4), 4, 0.0),
            optimizer: OptimizerConfig {
                learning_rate: 0.02,
                ..OptimizerConfig::default()
            },
            seed: Some(7),
        },
        ..TrainingConfig::default()
    }
}

/// Answers every window with the same probability
struct ConstantModel(f64);

impl SequenceModel for ConstantModel {
    fn name(&self) -> &str {
        "constant"
    }

    fn fit(&mut self, _: &Array3<f64>, _: &[u8], _: &FitParams) -> Result<TrainingHistory> {
        Ok(TrainingHistory::default())
    }

    fn predict_proba(&self, windows: &Array3<f64>) -> Result<Vec<f64>> {
        Ok(vec![self.0; windows.shape()[0]])
    }

    fn is_fitted(&self) -> bool {
        true
    }
}

#[test]
fn test_ramp_labels_are_up() {
    let bars = bars(MarketScenario::LinearRamp, 200);
    let rows = FeatureEngine::default().derive_for_training(&bars, 60).unwrap();
    assert_eq!(rows.len(), 180);

    let mut builder = SequenceBuilder::new(60).unwrap();
    let split = builder.fit_transform(&rows, 0.2).unwrap();

    assert_eq!(split.train.len() + split.test.len(), 120);
    assert!(split.train.up_ratio() > 0.95);
    assert!(split.test.up_ratio() > 0.95);
}

#[test]
fn test_ramp_scenario_trains_and_backtests() {
    init_logging();

    let bars = bars(MarketScenario::LinearRamp, 200);
    let mut session = PredictorSession::new();
    let report = session.train(&bars, &fast_config(40)).unwrap();

    assert_eq!(report.history.len(), 40);
    assert_eq!(report.train_windows, 96);
    assert_eq!(report.test_windows, 24);
    assert!(
        report.backtest.accuracy > 0.6,
        "accuracy {}",
        report.backtest.accuracy
    );

    let backtest = &report.backtest;
    assert_eq!(backtest.cumulative_returns.len(), report.test_windows);
    let pnl_sum: f64 = backtest.pnl.iter().sum();
    assert!((backtest.cumulative_returns.last().unwrap() - pnl_sum).abs() < 1e-9);
}

#[test]
fn test_flat_series_rsi_is_100() {
    let bars = bars(MarketScenario::Flat, 100);
    let rows = FeatureEngine::default().derive(&bars).unwrap();

    assert_eq!(rows.len(), 80);
    assert!(rows.iter().all(|r| r.rsi == 100.0));
    assert!(rows.iter().all(|r| r.returns == 0.0 && r.volatility == 0.0));
}

#[test]
fn test_flat_series_cannot_be_trained() {
    let bars = bars(MarketScenario::Flat, 200);
    let mut session = PredictorSession::new();

    let result = session.train(&bars, &fast_config(1));
    assert!(matches!(result, Err(PredictorError::NumericDegeneracy(_))));
    assert!(!session.is_trained());
}

#[test]
fn test_predict_before_train() {
    let session = PredictorSession::new();
    let result = session.predict_next(&bars(MarketScenario::Uptrend, 120));
    assert!(matches!(result, Err(PredictorError::NotFitted(_))));
}

#[test]
fn test_predict_after_train() {
    init_logging();

    let bars = bars(MarketScenario::Sideways, 200);
    let mut session = PredictorSession::new();
    session.train(&bars, &fast_config(2)).unwrap();

    let needed = session.bars_needed().unwrap();
    assert_eq!(needed, 80);

    let tail = &bars[bars.len() - needed..];
    let prediction = session.predict_next(tail).unwrap();
    assert!((0.0..=1.0).contains(&prediction.probability));
    assert!(prediction.confidence() >= 0.5);
    assert_eq!(prediction.as_of, bars.last().unwrap().timestamp);

    // A tail inside the training series only needs one window of bars
    let window = &bars[bars.len() - 60..];
    assert!(session.predict_next(window).is_ok());
    let result = session.predict_next(&window[1..]);
    assert!(matches!(result, Err(PredictorError::InsufficientData { .. })));
}

#[test]
fn test_live_features_match_training_features() {
    let bars = bars(MarketScenario::Volatile, 300);
    let mut session = PredictorSession::new();
    session.train(&bars, &fast_config(1)).unwrap();

    let full = FeatureEngine::default().derive(&bars).unwrap();
    let needed = session.bars_needed().unwrap();
    let live = session.live_features(&bars[bars.len() - needed..]).unwrap();

    assert_eq!(live.len(), needed);
    assert_eq!(&live[live.len() - 60..], &full[full.len() - 60..]);
}

#[test]
fn test_live_features_continue_training_series() {
    let bars = bars(MarketScenario::Volatile, 300);
    let mut session = PredictorSession::new();
    session.train(&bars[..250], &fast_config(1)).unwrap();

    // New bars arriving after the training data
    let full = FeatureEngine::default().derive(&bars).unwrap();
    let live = session.live_features(&bars[200..]).unwrap();

    assert_eq!(live.len(), 100);
    assert_eq!(&live[..], &full[full.len() - 100..]);

    let prediction = session.predict_next(&bars[200..]).unwrap();
    assert_eq!(prediction.as_of, bars[299].timestamp);
}

#[test]
fn test_unrelated_tail_uses_its_own_warmup() {
    let bars = bars(MarketScenario::Sideways, 300);
    let mut session = PredictorSession::new();
    session.train(&bars[100..], &fast_config(1)).unwrap();

    // Older than anything seen in training: nothing to seed from
    let older = &bars[..80];
    let live = session.live_features(older).unwrap();
    assert_eq!(live, FeatureEngine::default().derive(older).unwrap());
}

#[test]
fn test_retraining_discards_previous_model() {
    let mut session = PredictorSession::new();
    let good = bars(MarketScenario::Volatile, 200);

    let first = session.train(&good, &fast_config(1)).unwrap();
    assert_eq!(session.run_id(), Some(first.run_id));

    // Too few bars: the run fails and the old model is gone
    let result = session.train(&good[..100], &fast_config(1));
    assert!(matches!(result, Err(PredictorError::InsufficientData { .. })));
    assert!(!session.is_trained());
    assert!(session.predict_next(&good).is_err());

    let second = session.train(&good, &fast_config(1)).unwrap();
    assert_ne!(first.run_id, second.run_id);
    assert!(session.is_trained());
}

#[test]
fn test_no_positive_predictions() {
    let bars = bars(MarketScenario::LinearRamp, 200);
    let mut session = PredictorSession::new();

    let report = session
        .train_with_model(&bars, &fast_config(1), Box::new(ConstantModel(0.1)))
        .unwrap();

    assert_eq!(report.model, "constant");
    assert_eq!(report.backtest.long_signals, 0);
    assert_eq!(report.backtest.precision, 0.0);
    assert_eq!(report.backtest.recall, 0.0);
    assert_eq!(report.backtest.accuracy, 0.0);
    assert_eq!(report.backtest.total_pnl, -(report.test_windows as f64));

    let prediction = session.predict_next(&bars).unwrap();
    assert_eq!(prediction.direction, Direction::Down);
}

#[test]
fn test_unordered_bars_rejected() {
    let mut bars = bars(MarketScenario::Uptrend, 200);
    bars.swap(50, 51);

    let result = PredictorSession::new().train(&bars, &fast_config(1));
    assert!(matches!(
        result,
        Err(PredictorError::UnorderedSeries { index: 51 })
    ));
}

#[test]
fn test_shared_predictor_across_threads() {
    let bars = bars(MarketScenario::Uptrend, 200);
    let shared = SharedPredictor::new();
    assert!(!shared.is_trained().unwrap());

    shared.train(&bars, &fast_config(1)).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            let bars = bars.clone();
            thread::spawn(move || shared.predict_next(&bars))
        })
        .collect();

    let predictions: Vec<Prediction> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    // Inference is deterministic: every reader sees the same model
    assert!(predictions
        .windows(2)
        .all(|p| p[0].probability == p[1].probability));

    shared.reset().unwrap();
    assert!(!shared.is_trained().unwrap());
}

#[test]
fn test_bars_from_json() {
    let json = r#"[
        {"timestamp": "2024-01-01T00:00:00Z", "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 10.0},
        {"timestamp": "2024-01-01T01:00:00Z", "high": 2.0, "low": 0.5, "close": 1.6, "volume": 12.0}
    ]"#;

    let bars: Vec<Candle> = serde_json::from_str(json).unwrap();
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[1].open, 0.0);
    assert!(bars[1].timestamp > bars[0].timestamp);
}

#[test]
fn test_report_serializes_to_json() {
    let bars = bars(MarketScenario::Uptrend, 200);
    let mut session = PredictorSession::new();
    let report = session.train(&bars, &fast_config(1)).unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["test_windows"], report.test_windows);
    assert!(json["backtest"]["cumulative_returns"].is_array());
    assert!(json["history"]["epochs"][0]["loss"].is_number());
}
