// Adam optimizer.
//
// Moment buffers are indexed by parameter position, so an `Adam` instance
// belongs to exactly one model and must always be stepped with that model's
// `params()` (same count, same order, same shapes). A mismatch is reported
// rather than silently reinitializing state.
//
// Update with bias correction folded into the step size:
//   m = β1·m + (1-β1)·g
//   v = β2·v + (1-β2)·g²
//   lr_t = lr · sqrt(1 - β2^t) / (1 - β1^t)
//   w -= lr_t · m / (sqrt(v) + ε)

use crate::error::NnError;
use crate::layer::Param;
use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    /// The usual GAN setting: a small step and a short first-moment memory.
    fn default() -> Self {
        Self {
            learning_rate: 0.0002,
            beta1: 0.5,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    pub config: AdamConfig,
    t: u64,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Number of updates applied so far.
    pub fn step_count(&self) -> u64 {
        self.t
    }

    /// Apply one update using the gradients stored alongside `params`.
    pub fn step(&mut self, params: Vec<Param<'_>>) -> Result<(), NnError> {
        if self.m.is_empty() {
            self.m = params
                .iter()
                .map(|p| ArrayD::zeros(p.value.raw_dim()))
                .collect();
            self.v = self.m.clone();
        }
        if params.len() != self.m.len() {
            return Err(NnError::ParamCount {
                expected: self.m.len(),
                found: params.len(),
            });
        }
        for (index, (p, m)) in params.iter().zip(&self.m).enumerate() {
            if p.value.shape() != m.shape() || p.grad.shape() != m.shape() {
                return Err(NnError::ParamShape {
                    index,
                    expected: m.shape().to_vec(),
                    found: p.value.shape().to_vec(),
                });
            }
        }

        self.t += 1;
        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.config;
        let t = self.t as i32;
        let lr_t = learning_rate * (1.0 - beta2.powi(t)).sqrt() / (1.0 - beta1.powi(t));

        for ((p, m), v) in params.into_iter().zip(&mut self.m).zip(&mut self.v) {
            Zip::from(p.value)
                .and(m)
                .and(v)
                .and(&p.grad)
                .for_each(|w, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *w -= lr_t * *m / (v.sqrt() + epsilon);
                });
        }
        Ok(())
    }
}
