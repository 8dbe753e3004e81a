// Feature derivation from raw OHLCV bars

use crate::error::PredictorError;
use crate::indicators::{calculate_returns, calculate_rsi_series, rolling_std, RsiSmoothing};
use crate::models::{Candle, FeatureRow};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Indicator windows used to derive features
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FeatureConfig {
    pub volatility_window: usize,
    pub rsi_period: usize,
    pub rsi_smoothing: RsiSmoothing,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            volatility_window: 20,
            rsi_period: 14,
            rsi_smoothing: RsiSmoothing::Wilder,
        }
    }
}

/// Turns OHLCV bars into fully-defined feature rows
#[derive(Debug, Clone, Default)]
pub struct FeatureEngine {
    config: FeatureConfig,
}

impl FeatureEngine {
    pub fn new(config: FeatureConfig) -> Result<Self> {
        if config.volatility_window < 2 {
            return Err(PredictorError::config(format!(
                "volatility_window must be at least 2, got {}",
                config.volatility_window
            )));
        }
        if config.rsi_period == 0 {
            return Err(PredictorError::config("rsi_period must be positive"));
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Leading rows lost to indicator warmup
    pub fn warmup(&self) -> usize {
        self.config.volatility_window.max(self.config.rsi_period)
    }

    /// Minimum number of bars `derive` accepts (35 with the default windows)
    pub fn min_bars(&self) -> usize {
        self.config.volatility_window + self.config.rsi_period + 1
    }

    /// Derive feature rows, dropping the leading rows whose indicators are
    /// still warming up
    pub fn derive(&self, bars: &[Candle]) -> Result<Vec<FeatureRow>> {
        if bars.len() < self.min_bars() {
            return Err(PredictorError::InsufficientData {
                what: "feature derivation (bars)",
                needed: self.min_bars(),
                got: bars.len(),
            });
        }
        validate_series(bars)?;

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let returns = calculate_returns(&closes);
        let volatility = rolling_std(&returns, self.config.volatility_window);
        let rsi = calculate_rsi_series(&closes, self.config.rsi_period, self.config.rsi_smoothing);

        let rows: Vec<FeatureRow> = bars
            .iter()
            .enumerate()
            .filter_map(|(i, bar)| {
                Some(FeatureRow {
                    timestamp: bar.timestamp,
                    close: bar.close,
                    volume: bar.volume,
                    high: bar.high,
                    low: bar.low,
                    returns: returns[i]?,
                    volatility: volatility[i]?,
                    rsi: rsi[i]?,
                })
            })
            .collect();

        tracing::debug!(
            "Derived {} feature rows from {} bars ({} warmup rows dropped)",
            rows.len(),
            bars.len(),
            bars.len() - rows.len()
        );

        Ok(rows)
    }

    /// `derive`, additionally requiring `sequence_length + min_bars()` rows
    /// to survive the warmup drop
    pub fn derive_for_training(
        &self,
        bars: &[Candle],
        sequence_length: usize,
    ) -> Result<Vec<FeatureRow>> {
        let rows = self.derive(bars)?;
        let needed = sequence_length + self.min_bars();

        if rows.len() < needed {
            return Err(PredictorError::InsufficientData {
                what: "training (feature rows)",
                needed,
                got: rows.len(),
            });
        }

        Ok(rows)
    }
}

/// Check ordering and numeric sanity of the raw bars
///
/// Timestamps must be strictly increasing. Prices and volume must be finite,
/// closes positive (returns divide by the previous close) and volume non-negative.
pub fn validate_series(bars: &[Candle]) -> Result<()> {
    for (i, window) in bars.windows(2).enumerate() {
        if window[1].timestamp <= window[0].timestamp {
            return Err(PredictorError::UnorderedSeries { index: i + 1 });
        }
    }

    for (i, bar) in bars.iter().enumerate() {
        let fields = [bar.high, bar.low, bar.close, bar.volume];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(PredictorError::degenerate(format!(
                "non-finite value in bar {} ({})",
                i, bar.timestamp
            )));
        }
        if bar.close <= 0.0 {
            return Err(PredictorError::degenerate(format!(
                "invalid close price {} in bar {}",
                bar.close, i
            )));
        }
        // Volume can be 0.0 (for backfilled data)
        if bar.volume < 0.0 {
            return Err(PredictorError::degenerate(format!(
                "invalid volume {} in bar {}",
                bar.volume, i
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1_000.0 + i as f64,
            })
            .collect()
    }

    #[test]
    fn test_derive_drops_warmup_rows() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64 * 0.3).sin()).collect();
        let bars = bars_from_closes(&closes);

        let engine = FeatureEngine::default();
        let rows = engine.derive(&bars).unwrap();

        assert_eq!(rows.len(), 100 - 20);
        assert_eq!(rows[0].timestamp, bars[20].timestamp);
        for row in &rows {
            assert!(row.values().iter().all(|v| v.is_finite()));
            assert!((0.0..=100.0).contains(&row.rsi));
        }
    }

    #[test]
    fn test_flat_series_rsi_is_100() {
        let bars = bars_from_closes(&vec![42.0; 100]);
        let rows = FeatureEngine::default().derive(&bars).unwrap();

        assert!(!rows.is_empty());
        for row in &rows {
            assert_eq!(row.rsi, 100.0);
            assert_eq!(row.returns, 0.0);
            assert_eq!(row.volatility, 0.0);
        }
    }

    #[test]
    fn test_derive_insufficient_data() {
        let bars = bars_from_closes(&vec![10.0; 34]);
        let result = FeatureEngine::default().derive(&bars);

        assert!(matches!(
            result,
            Err(PredictorError::InsufficientData { needed: 35, got: 34, .. })
        ));
    }

    #[test]
    fn test_derive_for_training_requires_window_headroom() {
        let closes: Vec<f64> = (0..110).map(|i| 100.0 + i as f64).collect();
        let bars = bars_from_closes(&closes);
        let engine = FeatureEngine::default();

        // 110 bars -> 90 rows; 60 + 35 = 95 needed
        assert!(engine.derive_for_training(&bars, 60).is_err());
        assert!(engine.derive_for_training(&bars, 50).is_ok());
    }

    #[test]
    fn test_unordered_series_rejected() {
        let mut bars = bars_from_closes(&vec![10.0; 40]);
        bars[7].timestamp = bars[6].timestamp; // duplicate timestamp

        let result = FeatureEngine::default().derive(&bars);
        assert!(matches!(result, Err(PredictorError::UnorderedSeries { index: 7 })));
    }

    #[test]
    fn test_zero_close_rejected() {
        let mut bars = bars_from_closes(&vec![10.0; 40]);
        bars[12].close = 0.0;

        let result = FeatureEngine::default().derive(&bars);
        assert!(matches!(result, Err(PredictorError::NumericDegeneracy(_))));
    }

    #[test]
    fn test_invalid_config() {
        let config = FeatureConfig {
            volatility_window: 1,
            ..FeatureConfig::default()
        };
        assert!(FeatureEngine::new(config).is_err());
    }
}
