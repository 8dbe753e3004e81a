use serde::{Deserialize, Serialize};

/// How average gains/losses are carried forward between bars
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RsiSmoothing {
    /// Wilder's running average: seeded with the simple mean of the first
    /// `period` changes, then `avg = (prev * (period - 1) + current) / period`
    #[default]
    Wilder,
    /// Plain rolling mean of the last `period` changes
    Simple,
}

/// Calculate Relative Strength Index (RSI) for every bar
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
/// Entry `i` is `None` until `period` price changes are available, so the
/// first defined value sits at index `period`. When the average loss is zero
/// the RSI is 100, including a perfectly flat series.
pub fn calculate_rsi_series(
    prices: &[f64],
    period: usize,
    smoothing: RsiSmoothing,
) -> Vec<Option<f64>> {
    let mut out = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return out;
    }

    // gains[k] / losses[k] belong to the change from bar k to bar k + 1
    let (gains, losses): (Vec<f64>, Vec<f64>) = prices
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            if change > 0.0 {
                (change, 0.0)
            } else {
                (0.0, change.abs())
            }
        })
        .unzip();

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    out[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for bar in (period + 1)..prices.len() {
        let k = bar - 1;
        match smoothing {
            RsiSmoothing::Wilder => {
                avg_gain = (avg_gain * (period - 1) as f64 + gains[k]) / period as f64;
                avg_loss = (avg_loss * (period - 1) as f64 + losses[k]) / period as f64;
            }
            RsiSmoothing::Simple => {
                let start = k + 1 - period;
                avg_gain = gains[start..=k].iter().sum::<f64>() / period as f64;
                avg_loss = losses[start..=k].iter().sum::<f64>() / period as f64;
            }
        }
        out[bar] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    out
}

/// Latest Wilder RSI value, or `None` when there is not enough history
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    calculate_rsi_series(prices, period, RsiSmoothing::Wilder)
        .last()
        .copied()
        .flatten()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_calculation() {
        // Test with known values
        let prices = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5,
            46.0, 46.5, 46.25, 46.0, 46.5,
        ];

        let rsi = calculate_rsi(&prices, 14);
        assert!(rsi.is_some());

        let rsi_value = rsi.unwrap();
        assert!(rsi_value > 0.0 && rsi_value < 100.0);
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let prices = vec![100.0, 102.0, 101.0];
        let rsi = calculate_rsi(&prices, 14);
        assert!(rsi.is_none());
    }

    #[test]
    fn test_rsi_all_gains() {
        let prices = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        let rsi = calculate_rsi(&prices, 5);
        assert!(rsi.is_some());
        assert_eq!(rsi.unwrap(), 100.0);  // All gains = RSI 100
    }

    #[test]
    fn test_rsi_flat_series_is_100() {
        let prices = vec![250.0; 100];

        for smoothing in [RsiSmoothing::Wilder, RsiSmoothing::Simple] {
            let series = calculate_rsi_series(&prices, 14, smoothing);
            assert!(series[..14].iter().all(|v| v.is_none()));
            assert!(series[14..].iter().all(|v| *v == Some(100.0)));
        }
    }

    #[test]
    fn test_rsi_all_losses_is_zero() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let rsi = calculate_rsi(&prices, 14).unwrap();
        assert!(rsi.abs() < 1e-12);
    }

    #[test]
    fn test_wilder_seed_matches_simple() {
        // Both variants share the first value; they diverge afterwards
        let prices = vec![
            10.0, 11.0, 10.5, 11.5, 12.0, 11.0, 11.5, 12.5, 12.0, 13.0, 12.5, 11.0,
        ];
        let wilder = calculate_rsi_series(&prices, 4, RsiSmoothing::Wilder);
        let simple = calculate_rsi_series(&prices, 4, RsiSmoothing::Simple);

        assert_eq!(wilder[4], simple[4]);
        assert_ne!(wilder[11], simple[11]);
    }

    #[test]
    fn test_rsi_simple_known_value() {
        // Changes: +2, -1, +2, +1 -> avg gain 5/4, avg loss 1/4 -> RS 5 -> RSI 83.33
        let prices = vec![10.0, 12.0, 11.0, 13.0, 14.0];
        let series = calculate_rsi_series(&prices, 4, RsiSmoothing::Simple);
        let value = series[4].unwrap();
        assert!((value - 100.0 * 5.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_rsi_bounded() {
        let prices: Vec<f64> = (0..200)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.05)
            .collect();

        for value in calculate_rsi_series(&prices, 14, RsiSmoothing::Wilder)
            .into_iter()
            .flatten()
        {
            assert!((0.0..=100.0).contains(&value));
        }
    }
}
