use thiserror::Error;

/// Failures raised by the prediction pipeline
#[derive(Debug, Error)]
pub enum PredictorError {
    /// Too few bars or rows for the indicator warmups or the window length
    #[error("Insufficient data for {what}: need {needed}, got {got}")]
    InsufficientData {
        what: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Transform or predict called before the component was fitted
    #[error("Not fitted: {0}")]
    NotFitted(String),

    /// Values that would turn into NaN/Inf somewhere downstream
    #[error("Numeric degeneracy: {0}")]
    NumericDegeneracy(String),

    #[error("Bars are not strictly increasing in time at index {index}")]
    UnorderedSeries { index: usize },

    #[error("Predictor session lock poisoned")]
    SessionPoisoned,
}

impl PredictorError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    pub(crate) fn degenerate(msg: impl Into<String>) -> Self {
        Self::NumericDegeneracy(msg.into())
    }
}
