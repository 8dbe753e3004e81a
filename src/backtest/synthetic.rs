use crate::models::Candle;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Market scenario types for synthetic data generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum MarketScenario {
    /// Steady uptrend with noise (+2% daily average)
    Uptrend,
    /// Steady downtrend with noise (-2% daily average)
    Downtrend,
    /// Sideways/choppy market (±1% around mean)
    Sideways,
    /// High volatility (±5% large swings)
    Volatile,
    /// Close rises by a fixed step every bar; volume, high and low are constant
    #[value(name = "ramp")]
    #[serde(rename = "ramp")]
    LinearRamp,
    /// Every field constant
    Flat,
}

/// Generates synthetic OHLCV bars
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
    start_time: Option<DateTime<Utc>>,
}

impl SyntheticDataGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 150.0,
            base_volume: 1_000_000.0,
            start_time: None,
        }
    }

    /// Pin the first bar's timestamp instead of counting back from now
    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    /// Generate candles for a specific market scenario
    ///
    /// # Arguments
    /// * `scenario` - The market scenario to simulate
    /// * `num_candles` - Number of candles to generate
    /// * `interval_minutes` - Minutes between candles
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let start_time = self.start_time.unwrap_or_else(|| {
            Utc::now() - Duration::minutes(num_candles as i64 * interval_minutes)
        });

        let closes = match scenario {
            MarketScenario::Uptrend => self.trend_closes(num_candles, interval_minutes, 0.02),
            MarketScenario::Downtrend => self.trend_closes(num_candles, interval_minutes, -0.02),
            MarketScenario::Sideways => self.sideways_closes(num_candles),
            MarketScenario::Volatile => self.volatile_closes(num_candles),
            MarketScenario::LinearRamp => (0..num_candles)
                .map(|i| self.base_price + i as f64 * 0.5)
                .collect(),
            MarketScenario::Flat => vec![self.base_price; num_candles],
        };

        closes
            .into_iter()
            .enumerate()
            .map(|(i, close)| {
                let timestamp = start_time + Duration::minutes(i as i64 * interval_minutes);
                match scenario {
                    MarketScenario::LinearRamp | MarketScenario::Flat => {
                        self.constant_candle(close, timestamp)
                    }
                    _ => self.create_candle(close, timestamp),
                }
            })
            .collect()
    }

    /// Drift of `daily_drift` per day plus ±0.1% noise
    fn trend_closes(&mut self, num_candles: usize, interval_minutes: i64, daily_drift: f64) -> Vec<f64> {
        let drift_per_interval = daily_drift / (24.0 * 60.0 / interval_minutes as f64);
        let mut current_price = self.base_price;

        (0..num_candles)
            .map(|_| {
                let drift = current_price * drift_per_interval;
                let noise = current_price * self.rng.gen_range(-0.001..0.001);
                current_price += drift + noise;
                current_price
            })
            .collect()
    }

    /// Mean-reverting random walk
    fn sideways_closes(&mut self, num_candles: usize) -> Vec<f64> {
        let mean_price = self.base_price;
        let mut current_price = self.base_price;

        (0..num_candles)
            .map(|_| {
                let reversion = (mean_price - current_price) * 0.1;
                let noise = current_price * self.rng.gen_range(-0.01..0.01);
                current_price += reversion + noise;
                current_price
            })
            .collect()
    }

    /// Large random moves, floored at half the base price
    fn volatile_closes(&mut self, num_candles: usize) -> Vec<f64> {
        let floor = self.base_price * 0.5;
        let mut current_price = self.base_price;

        (0..num_candles)
            .map(|_| {
                current_price += current_price * self.rng.gen_range(-0.05..0.05);
                current_price = current_price.max(floor);
                current_price
            })
            .collect()
    }

    /// OHLC around the close with ±0.2% intrabar range and ±30% volume
    fn create_candle(&mut self, price: f64, timestamp: DateTime<Utc>) -> Candle {
        let noise_pct = 0.002;

        let high = price * (1.0 + self.rng.gen_range(0.0..noise_pct));
        let low = price * (1.0 - self.rng.gen_range(0.0..noise_pct));

        let open_raw = price * (1.0 + self.rng.gen_range(-noise_pct..noise_pct));
        let open = open_raw.clamp(low, high);

        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            timestamp,
            open,
            high,
            low,
            close: price,
            volume,
        }
    }

    fn constant_candle(&self, price: f64, timestamp: DateTime<Utc>) -> Candle {
        Candle {
            timestamp,
            open: price,
            high: self.base_price * 2.0,
            low: self.base_price * 0.5,
            close: price,
            volume: self.base_volume,
        }
    }
}
