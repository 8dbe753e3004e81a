use super::config::OptimizerConfig;
use ndarray::{Array, Dimension};

/// Adam with bias correction
///
/// Each parameter tensor owns a slot holding its first and second moments.
/// Slots are assigned by the network in a fixed order.
#[derive(Debug, Clone)]
pub struct Adam {
    config: OptimizerConfig,
    step: i32,
    moments: Vec<(Vec<f64>, Vec<f64>)>,
}

impl Adam {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            step: 0,
            moments: Vec::new(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Number of updates applied so far
    pub fn steps(&self) -> i32 {
        self.step
    }

    /// Advance the timestep; call once per mini-batch before `update`
    pub fn begin_step(&mut self) {
        self.step += 1;
    }

    pub fn update<D: Dimension>(
        &mut self,
        slot: usize,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
    ) {
        if self.moments.len() <= slot {
            self.moments.resize_with(slot + 1, Default::default);
        }
        let (m, v) = &mut self.moments[slot];
        if m.len() != param.len() {
            *m = vec![0.0; param.len()];
            *v = vec![0.0; param.len()];
        }

        let OptimizerConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            ..
        } = self.config;
        let t = self.step.max(1);
        let lr_t = learning_rate * (1.0 - beta2.powi(t)).sqrt() / (1.0 - beta1.powi(t));

        for (((p, g), m), v) in param
            .iter_mut()
            .zip(grad.iter())
            .zip(m.iter_mut())
            .zip(v.iter_mut())
        {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + epsilon);
        }
    }
}
