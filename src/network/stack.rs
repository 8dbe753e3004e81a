use super::config::{LayerSpec, NetworkConfig};
use super::layers::{
    DenseCache, DenseGrads, DenseLayer, DropoutLayer, LstmCache, LstmGrads, LstmLayer, Tensor,
};
use super::optimizer::Adam;
use crate::error::PredictorError;
use crate::Result;
use ndarray::{s, Array2, Array3};
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
pub(crate) enum Layer {
    Lstm(LstmLayer),
    Dropout(DropoutLayer),
    Dense(DenseLayer),
}

#[derive(Debug)]
pub(crate) enum LayerCache {
    Lstm(LstmCache),
    Dropout(Option<Tensor>),
    Dense(DenseCache),
}

#[derive(Debug)]
pub(crate) enum LayerGrads {
    Lstm(LstmGrads),
    Dense(DenseGrads),
    Empty,
}

impl LayerGrads {
    fn squared_norm(&self) -> f64 {
        fn sum_sq<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
            values.map(|g| g * g).sum()
        }

        match self {
            LayerGrads::Lstm(g) => sum_sq(g.w.iter()) + sum_sq(g.u.iter()) + sum_sq(g.b.iter()),
            LayerGrads::Dense(g) => sum_sq(g.w.iter()) + sum_sq(g.b.iter()),
            LayerGrads::Empty => 0.0,
        }
    }

    fn scale(&mut self, factor: f64) {
        match self {
            LayerGrads::Lstm(g) => {
                g.w *= factor;
                g.u *= factor;
                g.b *= factor;
            }
            LayerGrads::Dense(g) => {
                g.w *= factor;
                g.b *= factor;
            }
            LayerGrads::Empty => {}
        }
    }
}

/// Feed-forward stack of recurrent, dropout and dense layers ending in a
/// single sigmoid unit
#[derive(Debug, Clone)]
pub struct Network {
    pub(crate) layers: Vec<Layer>,
    input_features: usize,
}

/// Assemble a network from its configuration
///
/// An LSTM returns its full sequence exactly when another LSTM follows it.
pub fn build_network(
    input_features: usize,
    config: &NetworkConfig,
    rng: &mut StdRng,
) -> Result<Network> {
    if input_features == 0 {
        return Err(PredictorError::config("network needs at least one input feature"));
    }
    config.validate()?;

    let last_lstm = config
        .layers
        .iter()
        .rposition(|l| matches!(l, LayerSpec::Lstm { .. }))
        .unwrap_or(0);

    let mut width = input_features;
    let mut layers = Vec::with_capacity(config.layers.len());

    for (i, spec) in config.layers.iter().enumerate() {
        let layer = match *spec {
            LayerSpec::Lstm { units } => {
                let layer = LstmLayer::new(width, units, i < last_lstm, rng);
                width = units;
                Layer::Lstm(layer)
            }
            LayerSpec::Dropout { rate } => Layer::Dropout(DropoutLayer { rate }),
            LayerSpec::Dense { units, activation } => {
                let layer = DenseLayer::new(width, units, activation, rng);
                width = units;
                Layer::Dense(layer)
            }
        };
        layers.push(layer);
    }

    let network = Network {
        layers,
        input_features,
    };
    tracing::debug!(
        "Built network: {} layers, {} parameters",
        network.layers.len(),
        network.parameter_count()
    );

    Ok(network)
}

impl Network {
    pub fn input_features(&self) -> usize {
        self.input_features
    }

    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .map(|l| match l {
                Layer::Lstm(lstm) => lstm.parameter_count(),
                Layer::Dense(dense) => dense.parameter_count(),
                Layer::Dropout(_) => 0,
            })
            .sum()
    }

    /// Forward pass over `[batch, steps, features]`, returning `[batch, 1]`
    /// probabilities. Passing an RNG switches on training mode: dropout is
    /// applied and per-layer caches are kept for `backward`.
    pub(crate) fn forward(
        &self,
        x: &Array3<f64>,
        mut rng: Option<&mut StdRng>,
    ) -> Result<(Array2<f64>, Vec<LayerCache>)> {
        if x.shape()[2] != self.input_features {
            return Err(PredictorError::config(format!(
                "network expects {} features per step, got {}",
                self.input_features,
                x.shape()[2]
            )));
        }

        let training = rng.is_some();
        let steps = (0..x.shape()[1])
            .map(|t| x.slice(s![.., t, ..]).to_owned())
            .collect();
        let mut current = Tensor::Sequence(steps);
        let mut caches = Vec::with_capacity(if training { self.layers.len() } else { 0 });

        for layer in &self.layers {
            current = match layer {
                Layer::Lstm(lstm) => {
                    let (mut hs, cache) = lstm.forward(&current.into_sequence()?, training)?;
                    if let Some(cache) = cache {
                        caches.push(LayerCache::Lstm(cache));
                    }
                    if lstm.return_sequences {
                        Tensor::Sequence(hs)
                    } else {
                        let last = hs
                            .pop()
                            .ok_or_else(|| PredictorError::config("window has no time steps"))?;
                        Tensor::Matrix(last)
                    }
                }
                Layer::Dropout(dropout) => match rng.as_deref_mut() {
                    Some(r) => {
                        let (out, mask) = dropout.forward_train(current, r)?;
                        caches.push(LayerCache::Dropout(mask));
                        out
                    }
                    None => current,
                },
                Layer::Dense(dense) => {
                    let (y, cache) = dense.forward(current.into_matrix()?, training)?;
                    if let Some(cache) = cache {
                        caches.push(LayerCache::Dense(cache));
                    }
                    Tensor::Matrix(y)
                }
            };
        }

        Ok((current.into_matrix()?, caches))
    }

    /// Inference-mode probabilities, one per window
    pub(crate) fn predict(&self, x: &Array3<f64>) -> Result<Vec<f64>> {
        let (probs, _) = self.forward(x, None)?;
        Ok(probs.column(0).iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }

    /// Backward pass from the gradient of the loss w.r.t. the final
    /// pre-sigmoid activation (`p - y` scaled for binary cross-entropy)
    pub(crate) fn backward(
        &self,
        caches: &[LayerCache],
        d_logits: Array2<f64>,
    ) -> Result<Vec<LayerGrads>> {
        if caches.len() != self.layers.len() {
            return Err(PredictorError::config("backward called without a training-mode forward"));
        }

        let last = self.layers.len() - 1;
        let mut grads: Vec<LayerGrads> = Vec::with_capacity(self.layers.len());
        let mut grad = Tensor::Matrix(d_logits);

        for (idx, (layer, cache)) in self.layers.iter().zip(caches.iter()).enumerate().rev() {
            let (next, layer_grads) = match (layer, cache) {
                (Layer::Dense(dense), LayerCache::Dense(cache)) => {
                    let dy = grad.into_matrix()?;
                    let (dx, g) = if idx == last {
                        dense.backward_linear(cache, &dy)
                    } else {
                        dense.backward(cache, &dy)
                    };
                    (Tensor::Matrix(dx), LayerGrads::Dense(g))
                }
                (Layer::Dropout(_), LayerCache::Dropout(mask)) => {
                    (DropoutLayer::backward(mask.as_ref(), grad)?, LayerGrads::Empty)
                }
                (Layer::Lstm(lstm), LayerCache::Lstm(cache)) => {
                    let dhs = match grad {
                        Tensor::Sequence(dhs) => dhs,
                        Tensor::Matrix(dh_last) => {
                            let mut dhs = vec![Array2::zeros(dh_last.raw_dim()); cache.len()];
                            if let Some(slot) = dhs.last_mut() {
                                *slot = dh_last;
                            }
                            dhs
                        }
                    };
                    let (dxs, g) = lstm.backward(cache, &dhs);
                    (Tensor::Sequence(dxs), LayerGrads::Lstm(g))
                }
                _ => return Err(PredictorError::config("layer cache out of order")),
            };
            grad = next;
            grads.push(layer_grads);
        }

        grads.reverse();
        Ok(grads)
    }

    /// Rescale gradients so their global L2 norm is at most `max_norm`.
    /// Returns the norm before clipping.
    pub(crate) fn clip_gradients(grads: &mut [LayerGrads], max_norm: f64) -> f64 {
        let norm = grads.iter().map(LayerGrads::squared_norm).sum::<f64>().sqrt();
        if norm > max_norm && norm.is_finite() {
            let factor = max_norm / norm;
            grads.iter_mut().for_each(|g| g.scale(factor));
        }
        norm
    }

    pub(crate) fn apply_gradients(&mut self, grads: &[LayerGrads], optimizer: &mut Adam) {
        let mut slot = 0;
        for (layer, grad) in self.layers.iter_mut().zip(grads.iter()) {
            match (layer, grad) {
                (Layer::Lstm(lstm), LayerGrads::Lstm(g)) => {
                    optimizer.update(slot, &mut lstm.w, &g.w);
                    optimizer.update(slot + 1, &mut lstm.u, &g.u);
                    optimizer.update(slot + 2, &mut lstm.b, &g.b);
                    slot += 3;
                }
                (Layer::Dense(dense), LayerGrads::Dense(g)) => {
                    optimizer.update(slot, &mut dense.w, &g.w);
                    optimizer.update(slot + 1, &mut dense.b, &g.b);
                    slot += 2;
                }
                _ => {}
            }
        }
    }
}
