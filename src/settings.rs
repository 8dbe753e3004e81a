// Layered configuration: defaults, then an optional TOML file, then
// `PREDICTOR__*` environment variables (`PREDICTOR__TRAINING__EPOCHS=20`)

use crate::error::PredictorError;
use crate::predictor::TrainingConfig;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "PREDICTOR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// `tracing_subscriber` filter directive used by the binary
    pub log_filter: String,
    pub training: TrainingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "crypto_predictor=info".to_string(),
            training: TrainingConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings with the standard environment prefix
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(file, ENV_PREFIX)
    }

    pub fn load_with_prefix(file: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PredictorError::config(e.to_string()))?;

        settings.training.validate()?;

        Ok(settings)
    }
}
