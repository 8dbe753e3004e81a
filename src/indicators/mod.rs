// Technical indicators module
// Returns, rolling volatility and RSI used as model features

pub mod rsi;
pub mod volatility;

pub use rsi::{calculate_rsi, calculate_rsi_series, RsiSmoothing};
pub use volatility::{calculate_returns, rolling_std};
