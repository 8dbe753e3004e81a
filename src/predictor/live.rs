use crate::error::PredictorError;
use crate::models::{Direction, FeatureRow, Prediction};
use crate::network::SequenceModel;
use crate::sequence::SequenceBuilder;
use crate::Result;
use chrono::Utc;

/// Probability above which the next bar is called up
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Fitted normalizer and trained model applied to the newest window
pub struct LivePredictor {
    builder: SequenceBuilder,
    model: Box<dyn SequenceModel>,
}

impl LivePredictor {
    /// Both the builder's normalizer and the model must already be fitted
    pub fn new(builder: SequenceBuilder, model: Box<dyn SequenceModel>) -> Result<Self> {
        if !builder.normalizer().is_fitted() {
            return Err(PredictorError::NotFitted(
                "live predictor needs a fitted normalizer".into(),
            ));
        }
        if !model.is_fitted() {
            return Err(PredictorError::NotFitted(format!(
                "live predictor needs a trained model, {} is untrained",
                model.name()
            )));
        }

        Ok(Self { builder, model })
    }

    pub fn sequence_length(&self) -> usize {
        self.builder.sequence_length()
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn builder(&self) -> &SequenceBuilder {
        &self.builder
    }

    /// Predict the direction of the bar after the last of `rows`
    ///
    /// Only the last `sequence_length` rows are used. They are scaled with
    /// the normalizer fitted at training time, which is never refit here.
    pub fn predict_next(&self, rows: &[FeatureRow]) -> Result<Prediction> {
        let window = self.builder.transform(rows)?;
        let probability = self
            .model
            .predict_proba(&window)?
            .first()
            .copied()
            .ok_or_else(|| PredictorError::degenerate("model returned no probability"))?;

        let as_of = rows
            .last()
            .map(|r| r.timestamp)
            .ok_or(PredictorError::InsufficientData {
                what: "live window (feature rows)",
                needed: self.sequence_length(),
                got: 0,
            })?;

        let direction = Direction::from_probability(probability, DECISION_THRESHOLD);
        tracing::info!(
            "Next bar after {}: {} (p_up={:.3})",
            as_of,
            direction,
            probability
        );

        Ok(Prediction {
            direction,
            probability,
            as_of,
            made_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{FitParams, TrainingHistory};
    use chrono::{Duration, TimeZone};
    use ndarray::Array3;

    /// Always answers with a fixed probability
    struct FixedModel {
        probability: f64,
        fitted: bool,
    }

    impl SequenceModel for FixedModel {
        fn name(&self) -> &str {
            "fixed"
        }

        fn fit(&mut self, _: &Array3<f64>, _: &[u8], _: &FitParams) -> Result<TrainingHistory> {
            self.fitted = true;
            Ok(TrainingHistory::default())
        }

        fn predict_proba(&self, windows: &Array3<f64>) -> Result<Vec<f64>> {
            Ok(vec![self.probability; windows.shape()[0]])
        }

        fn is_fitted(&self) -> bool {
            self.fitted
        }
    }

    fn rows(count: usize) -> Vec<FeatureRow> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..count)
            .map(|i| {
                let x = i as f64;
                FeatureRow {
                    timestamp: start + Duration::hours(i as i64),
                    close: 100.0 + (x * 0.3).sin() * 5.0,
                    volume: 500.0 + x,
                    high: 106.0,
                    low: 94.0,
                    returns: (x * 0.3).cos() * 0.01,
                    volatility: 0.01,
                    rsi: 50.0 + (x * 0.3).cos() * 10.0,
                }
            })
            .collect()
    }

    fn fitted_builder(rows: &[FeatureRow], seq: usize) -> SequenceBuilder {
        let mut builder = SequenceBuilder::new(seq).unwrap();
        builder.fit_transform(rows, 0.2).unwrap();
        builder
    }

    #[test]
    fn test_predict_next() {
        let rows = rows(60);
        let model = FixedModel {
            probability: 0.73,
            fitted: true,
        };
        let live = LivePredictor::new(fitted_builder(&rows, 10), Box::new(model)).unwrap();

        let prediction = live.predict_next(&rows).unwrap();
        assert_eq!(prediction.direction, Direction::Up);
        assert!((prediction.confidence() - 0.73).abs() < 1e-12);
        assert_eq!(prediction.as_of, rows[59].timestamp);
    }

    #[test]
    fn test_low_probability_is_down() {
        let rows = rows(60);
        let model = FixedModel {
            probability: 0.2,
            fitted: true,
        };
        let live = LivePredictor::new(fitted_builder(&rows, 10), Box::new(model)).unwrap();

        let prediction = live.predict_next(&rows).unwrap();
        assert_eq!(prediction.direction, Direction::Down);
        assert!((prediction.confidence() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_requires_fitted_parts() {
        let rows = rows(60);
        let untrained = FixedModel {
            probability: 0.5,
            fitted: false,
        };
        let result = LivePredictor::new(fitted_builder(&rows, 10), Box::new(untrained));
        assert!(matches!(result, Err(PredictorError::NotFitted(_))));

        let trained = FixedModel {
            probability: 0.5,
            fitted: true,
        };
        let result = LivePredictor::new(SequenceBuilder::new(10).unwrap(), Box::new(trained));
        assert!(matches!(result, Err(PredictorError::NotFitted(_))));
    }

    #[test]
    fn test_short_tail() {
        let rows = rows(60);
        let model = FixedModel {
            probability: 0.9,
            fitted: true,
        };
        let live = LivePredictor::new(fitted_builder(&rows, 10), Box::new(model)).unwrap();

        let result = live.predict_next(&rows[..5]);
        assert!(matches!(result, Err(PredictorError::InsufficientData { .. })));
    }
}
