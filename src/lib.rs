// Core modules
pub mod backtest;
pub mod error;
pub mod features;
pub mod indicators;
pub mod models;
pub mod network;
pub mod predictor;
pub mod sequence;
pub mod settings;

// Re-export commonly used types
pub use error::PredictorError;
pub use models::*;
pub use network::SequenceModel;
pub use predictor::{PredictorSession, SharedPredictor, TrainingConfig, TrainingReport};
pub use settings::Settings;

// Error handling
pub type Result<T> = std::result::Result<T, PredictorError>;
