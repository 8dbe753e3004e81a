// Training sessions and live next-bar prediction

pub mod live;
pub mod session;

pub use live::{LivePredictor, DECISION_THRESHOLD};
pub use session::{PredictorSession, SharedPredictor, TrainingConfig, TrainingReport};
