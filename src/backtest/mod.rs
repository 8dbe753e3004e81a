pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::{BacktestResult, ConfusionMatrix};
pub use runner::Backtester;
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
