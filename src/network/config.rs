// Network architecture and optimizer configuration

use crate::error::PredictorError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Element-wise activation applied by a dense layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// Derivative expressed through the activation's output `y`
    pub fn derivative_from_output(self, y: f64) -> f64 {
        match self {
            Activation::Linear => 1.0,
            Activation::Relu => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - y * y,
            Activation::Sigmoid => y * (1.0 - y),
        }
    }
}

pub(crate) fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// One layer of the stack, in forward order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerSpec {
    /// Recurrent layer; emits its full output sequence when another LSTM follows
    Lstm { units: usize },
    /// Inverted dropout, active only while training
    Dropout { rate: f64 },
    Dense { units: usize, activation: Activation },
}

/// Layer stack consumed by `build_network`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    pub layers: Vec<LayerSpec>,
}

impl Default for NetworkConfig {
    /// LSTM(100) -> Dropout(0.2) -> LSTM(50) -> Dropout(0.2) -> Dense(25, relu) -> Dense(1, sigmoid)
    fn default() -> Self {
        Self {
            layers: vec![
                LayerSpec::Lstm { units: 100 },
                LayerSpec::Dropout { rate: 0.2 },
                LayerSpec::Lstm { units: 50 },
                LayerSpec::Dropout { rate: 0.2 },
                LayerSpec::Dense {
                    units: 25,
                    activation: Activation::Relu,
                },
                LayerSpec::Dense {
                    units: 1,
                    activation: Activation::Sigmoid,
                },
            ],
        }
    }
}

impl NetworkConfig {
    /// Scaled-down stack with the same shape as the default
    pub fn compact(lstm_units: (usize, usize), dense_units: usize, dropout: f64) -> Self {
        Self {
            layers: vec![
                LayerSpec::Lstm {
                    units: lstm_units.0,
                },
                LayerSpec::Dropout { rate: dropout },
                LayerSpec::Lstm {
                    units: lstm_units.1,
                },
                LayerSpec::Dropout { rate: dropout },
                LayerSpec::Dense {
                    units: dense_units,
                    activation: Activation::Relu,
                },
                LayerSpec::Dense {
                    units: 1,
                    activation: Activation::Sigmoid,
                },
            ],
        }
    }

    /// Check the stack can be assembled into a binary classifier
    pub fn validate(&self) -> Result<()> {
        if !self
            .layers
            .iter()
            .any(|l| matches!(l, LayerSpec::Lstm { .. }))
        {
            return Err(PredictorError::config("network needs at least one LSTM layer"));
        }

        let mut seen_dense = false;
        for (i, layer) in self.layers.iter().enumerate() {
            match layer {
                LayerSpec::Lstm { units } => {
                    if seen_dense {
                        return Err(PredictorError::config(format!(
                            "LSTM layer {} follows a dense layer",
                            i
                        )));
                    }
                    if *units == 0 {
                        return Err(PredictorError::config(format!("layer {} has zero units", i)));
                    }
                }
                LayerSpec::Dropout { rate } => {
                    if !(0.0..1.0).contains(rate) {
                        return Err(PredictorError::config(format!(
                            "dropout rate {} at layer {} is outside [0, 1)",
                            rate, i
                        )));
                    }
                }
                LayerSpec::Dense { units, .. } => {
                    seen_dense = true;
                    if *units == 0 {
                        return Err(PredictorError::config(format!("layer {} has zero units", i)));
                    }
                }
            }
        }

        match self.layers.last() {
            Some(LayerSpec::Dense {
                units: 1,
                activation: Activation::Sigmoid,
            }) => Ok(()),
            _ => Err(PredictorError::config(
                "last layer must be Dense { units: 1, activation: sigmoid }",
            )),
        }
    }
}

/// Adam hyper-parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    /// Rescale the whole gradient when its L2 norm exceeds this
    pub clip_norm: Option<f64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            clip_norm: Some(5.0),
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PredictorError::config("learning_rate must be positive"));
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(PredictorError::config("Adam betas must be in [0, 1)"));
        }
        if self.epsilon <= 0.0 {
            return Err(PredictorError::config("Adam epsilon must be positive"));
        }
        if let Some(clip) = self.clip_norm {
            if clip <= 0.0 {
                return Err(PredictorError::config("clip_norm must be positive"));
            }
        }
        Ok(())
    }
}

/// Everything needed to construct an `LstmClassifier`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub network: NetworkConfig,
    pub optimizer: OptimizerConfig,
    /// Fixed seed for weight init, dropout and shuffling; `None` draws from entropy
    pub seed: Option<u64>,
}
