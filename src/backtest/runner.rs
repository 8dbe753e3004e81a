use crate::backtest::metrics::BacktestResult;
use crate::error::PredictorError;
use crate::models::Direction;
use crate::network::SequenceModel;
use crate::sequence::WindowSet;
use crate::Result;

/// Replays model predictions over held-out windows as a long/short strategy
///
/// Each window opens a position of +1 (predicted up) or -1 (predicted down).
/// The step PnL is `position * label`, where the label is the 0/1 direction
/// of the next bar. This is a scoring proxy, not a price return: a correct
/// short earns nothing and no fees, slippage or magnitudes are modelled.
#[derive(Debug, Clone)]
pub struct Backtester {
    threshold: f64,
}

impl Default for Backtester {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Backtester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predict every window and score the predictions against its labels
    pub fn run<M: SequenceModel + ?Sized>(
        &self,
        model: &M,
        test: &WindowSet,
    ) -> Result<BacktestResult> {
        if test.is_empty() {
            return Err(PredictorError::InsufficientData {
                what: "backtest windows",
                needed: 1,
                got: 0,
            });
        }

        tracing::info!(
            "Starting backtest: {} windows, model {}",
            test.len(),
            model.name()
        );

        let probabilities = model.predict_proba(&test.inputs)?;
        let result = self.evaluate(&probabilities, &test.labels)?;

        tracing::info!(
            "Backtest complete: accuracy {:.2}%, precision {:.2}%, recall {:.2}%, P&L {:+.0}",
            result.accuracy * 100.0,
            result.precision * 100.0,
            result.recall * 100.0,
            result.total_pnl
        );

        Ok(result)
    }

    /// Score probabilities against 0/1 labels
    pub fn evaluate(&self, probabilities: &[f64], labels: &[u8]) -> Result<BacktestResult> {
        if probabilities.is_empty() {
            return Err(PredictorError::InsufficientData {
                what: "backtest predictions",
                needed: 1,
                got: 0,
            });
        }
        if probabilities.len() != labels.len() {
            return Err(PredictorError::config(format!(
                "{} predictions but {} labels",
                probabilities.len(),
                labels.len()
            )));
        }

        let directions: Vec<Direction> = probabilities
            .iter()
            .map(|&p| Direction::from_probability(p, self.threshold))
            .collect();
        let predicted: Vec<u8> = directions.iter().map(|d| d.class()).collect();
        let positions: Vec<f64> = directions.iter().map(|d| d.position()).collect();

        Ok(BacktestResult::from_signals(&predicted, &positions, labels))
    }
}
