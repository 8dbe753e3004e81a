// LSTM, dense and dropout layers with hand-written backward passes
//
// Activations flow as `[batch, features]` matrices. A sequence is one matrix
// per time step.

use super::config::{sigmoid, Activation};
use crate::error::PredictorError;
use crate::Result;
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;

/// Data passed between layers
#[derive(Debug, Clone)]
pub(crate) enum Tensor {
    Sequence(Vec<Array2<f64>>),
    Matrix(Array2<f64>),
}

impl Tensor {
    pub fn into_sequence(self) -> Result<Vec<Array2<f64>>> {
        match self {
            Tensor::Sequence(steps) => Ok(steps),
            Tensor::Matrix(_) => Err(PredictorError::config(
                "recurrent layer received a flat matrix instead of a sequence",
            )),
        }
    }

    pub fn into_matrix(self) -> Result<Array2<f64>> {
        match self {
            Tensor::Matrix(m) => Ok(m),
            Tensor::Sequence(_) => Err(PredictorError::config(
                "dense layer received a sequence; the LSTM before it must not return sequences",
            )),
        }
    }

    fn map(&self, mut f: impl FnMut(&Array2<f64>) -> Array2<f64>) -> Tensor {
        match self {
            Tensor::Sequence(steps) => Tensor::Sequence(steps.iter().map(&mut f).collect()),
            Tensor::Matrix(m) => Tensor::Matrix(f(m)),
        }
    }

    /// Element-wise product with a tensor of the same layout
    fn mul(&self, other: &Tensor) -> Result<Tensor> {
        match (self, other) {
            (Tensor::Sequence(a), Tensor::Sequence(b)) if a.len() == b.len() => Ok(
                Tensor::Sequence(a.iter().zip(b.iter()).map(|(x, y)| x * y).collect()),
            ),
            (Tensor::Matrix(a), Tensor::Matrix(b)) => Ok(Tensor::Matrix(a * b)),
            _ => Err(PredictorError::config("tensor layout mismatch in dropout")),
        }
    }
}

fn glorot_uniform(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-limit..limit))
}

/// Weights are packed gate-wise: input, forget, cell candidate, output
#[derive(Debug, Clone)]
pub(crate) struct LstmLayer {
    pub units: usize,
    pub return_sequences: bool,
    /// `[input, 4 * units]`
    pub w: Array2<f64>,
    /// `[units, 4 * units]`
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

#[derive(Debug)]
struct LstmStep {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

#[derive(Debug)]
pub(crate) struct LstmCache {
    steps: Vec<LstmStep>,
}

impl LstmCache {
    /// Number of cached time steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

#[derive(Debug)]
pub(crate) struct LstmGrads {
    pub w: Array2<f64>,
    pub u: Array2<f64>,
    pub b: Array1<f64>,
}

impl LstmLayer {
    pub fn new(input_size: usize, units: usize, return_sequences: bool, rng: &mut StdRng) -> Self {
        let mut b = Array1::zeros(4 * units);
        // Forget gate starts open
        b.slice_mut(s![units..2 * units]).fill(1.0);

        Self {
            units,
            return_sequences,
            w: glorot_uniform(input_size, 4 * units, rng),
            u: glorot_uniform(units, 4 * units, rng),
            b,
        }
    }

    pub fn input_size(&self) -> usize {
        self.w.nrows()
    }

    pub fn parameter_count(&self) -> usize {
        self.w.len() + self.u.len() + self.b.len()
    }

    /// Run the whole sequence; returns the hidden state at every step
    pub fn forward(
        &self,
        xs: &[Array2<f64>],
        keep_cache: bool,
    ) -> Result<(Vec<Array2<f64>>, Option<LstmCache>)> {
        let batch = xs.first().map(|x| x.nrows()).unwrap_or(0);
        let h = self.units;

        let mut h_prev = Array2::zeros((batch, h));
        let mut c_prev = Array2::zeros((batch, h));
        let mut outputs = Vec::with_capacity(xs.len());
        let mut steps = Vec::with_capacity(if keep_cache { xs.len() } else { 0 });

        for x in xs {
            if x.ncols() != self.input_size() {
                return Err(PredictorError::config(format!(
                    "LSTM expects {} inputs per step, got {}",
                    self.input_size(),
                    x.ncols()
                )));
            }

            let z = x.dot(&self.w) + h_prev.dot(&self.u) + &self.b;
            let i = z.slice(s![.., 0..h]).mapv(sigmoid);
            let f = z.slice(s![.., h..2 * h]).mapv(sigmoid);
            let g = z.slice(s![.., 2 * h..3 * h]).mapv(f64::tanh);
            let o = z.slice(s![.., 3 * h..4 * h]).mapv(sigmoid);

            let c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            if keep_cache {
                steps.push(LstmStep {
                    x: x.clone(),
                    h_prev,
                    c_prev,
                    i,
                    f,
                    g,
                    o,
                    tanh_c,
                });
            }

            outputs.push(h_next.clone());
            h_prev = h_next;
            c_prev = c;
        }

        let cache = keep_cache.then_some(LstmCache { steps });
        Ok((outputs, cache))
    }

    /// Backpropagation through time
    ///
    /// `dhs[t]` is the loss gradient w.r.t. the hidden output at step `t`.
    pub fn backward(
        &self,
        cache: &LstmCache,
        dhs: &[Array2<f64>],
    ) -> (Vec<Array2<f64>>, LstmGrads) {
        let h = self.units;
        let batch = cache.steps.first().map(|s| s.x.nrows()).unwrap_or(0);

        let mut dw = Array2::zeros(self.w.raw_dim());
        let mut du = Array2::zeros(self.u.raw_dim());
        let mut db = Array1::zeros(self.b.raw_dim());

        let mut dh_next = Array2::<f64>::zeros((batch, h));
        let mut dc_next = Array2::<f64>::zeros((batch, h));
        let mut dxs = vec![Array2::zeros((batch, self.input_size())); cache.steps.len()];

        for (t, step) in cache.steps.iter().enumerate().rev() {
            let dh = &dhs[t] + &dh_next;
            let dc = &dc_next + &(&dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v));

            let d_o = &dh * &step.tanh_c;
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            let mut dz = Array2::zeros((batch, 4 * h));
            dz.slice_mut(s![.., 0..h])
                .assign(&(d_i * &step.i.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., h..2 * h])
                .assign(&(d_f * &step.f.mapv(|v| v * (1.0 - v))));
            dz.slice_mut(s![.., 2 * h..3 * h])
                .assign(&(d_g * &step.g.mapv(|v| 1.0 - v * v)));
            dz.slice_mut(s![.., 3 * h..4 * h])
                .assign(&(d_o * &step.o.mapv(|v| v * (1.0 - v))));

            dw += &step.x.t().dot(&dz);
            du += &step.h_prev.t().dot(&dz);
            db += &dz.sum_axis(Axis(0));

            dxs[t] = dz.dot(&self.w.t());
            dh_next = dz.dot(&self.u.t());
        }

        (dxs, LstmGrads { w: dw, u: du, b: db })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DenseLayer {
    /// `[inputs, units]`
    pub w: Array2<f64>,
    pub b: Array1<f64>,
    pub activation: Activation,
}

#[derive(Debug)]
pub(crate) struct DenseCache {
    x: Array2<f64>,
    y: Array2<f64>,
}

#[derive(Debug)]
pub(crate) struct DenseGrads {
    pub w: Array2<f64>,
    pub b: Array1<f64>,
}

impl DenseLayer {
    pub fn new(inputs: usize, units: usize, activation: Activation, rng: &mut StdRng) -> Self {
        Self {
            w: glorot_uniform(inputs, units, rng),
            b: Array1::zeros(units),
            activation,
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.w.len() + self.b.len()
    }

    pub fn forward(&self, x: Array2<f64>, keep_cache: bool) -> Result<(Array2<f64>, Option<DenseCache>)> {
        if x.ncols() != self.w.nrows() {
            return Err(PredictorError::config(format!(
                "dense layer expects {} inputs, got {}",
                self.w.nrows(),
                x.ncols()
            )));
        }

        let activation = self.activation;
        let y = (x.dot(&self.w) + &self.b).mapv(|v| activation.apply(v));
        let cache = keep_cache.then(|| DenseCache { x, y: y.clone() });
        Ok((y, cache))
    }

    /// Gradient through the activation, then the affine map
    pub fn backward(&self, cache: &DenseCache, dy: &Array2<f64>) -> (Array2<f64>, DenseGrads) {
        let activation = self.activation;
        let dz = dy * &cache.y.mapv(|v| activation.derivative_from_output(v));
        self.backward_linear(cache, &dz)
    }

    /// Gradient of the affine map alone, given the pre-activation gradient
    pub fn backward_linear(&self, cache: &DenseCache, dz: &Array2<f64>) -> (Array2<f64>, DenseGrads) {
        let grads = DenseGrads {
            w: cache.x.t().dot(dz),
            b: dz.sum_axis(Axis(0)),
        };
        (dz.dot(&self.w.t()), grads)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DropoutLayer {
    pub rate: f64,
}

impl DropoutLayer {
    /// Inverted dropout: kept units are scaled by `1 / (1 - rate)`.
    /// Returns the mask so the backward pass can reuse it.
    pub fn forward_train(&self, input: Tensor, rng: &mut StdRng) -> Result<(Tensor, Option<Tensor>)> {
        if self.rate <= 0.0 {
            return Ok((input, None));
        }

        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let mask = input.map(|m| {
            Array2::from_shape_fn(m.raw_dim(), |_| {
                if rng.gen::<f64>() < keep {
                    scale
                } else {
                    0.0
                }
            })
        });

        let output = input.mul(&mask)?;
        Ok((output, Some(mask)))
    }

    pub fn backward(mask: Option<&Tensor>, grad: Tensor) -> Result<Tensor> {
        match mask {
            Some(mask) => grad.mul(mask),
            None => Ok(grad),
        }
    }
}
