use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of model input columns per bar
pub const FEATURE_COUNT: usize = 7;

/// Column names in model input order. Close comes first: labels are read from it.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "close",
    "volume",
    "high",
    "low",
    "returns",
    "volatility",
    "rsi",
];

/// OHLCV candlestick bar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One bar after feature derivation, with every derived field defined
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub volume: f64,
    pub high: f64,
    pub low: f64,
    pub returns: f64,
    pub volatility: f64,
    pub rsi: f64,
}

impl FeatureRow {
    /// Values in `FEATURE_COLUMNS` order
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.close,
            self.volume,
            self.high,
            self.low,
            self.returns,
            self.volatility,
            self.rsi,
        ]
    }
}

/// Predicted direction of the next close
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `p > threshold` is up; a probability exactly at the threshold is down
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability > threshold {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// Binary class (1 = up, 0 = down)
    pub fn class(self) -> u8 {
        match self {
            Direction::Up => 1,
            Direction::Down => 0,
        }
    }

    /// Position taken by the naive long/short strategy
    pub fn position(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "UP"),
            Direction::Down => write!(f, "DOWN"),
        }
    }
}

/// Forward prediction for the bar after the latest one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub direction: Direction,
    /// Model probability that the next close rises
    pub probability: f64,
    /// Timestamp of the newest bar in the input window
    pub as_of: DateTime<Utc>,
    pub made_at: DateTime<Utc>,
}

impl Prediction {
    /// Probability of the predicted direction
    pub fn confidence(&self) -> f64 {
        match self.direction {
            Direction::Up => self.probability,
            Direction::Down => 1.0 - self.probability,
        }
    }
}
