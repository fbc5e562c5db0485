// Batch normalization over the feature axis of a (batch, features) input.
//
// Training mode normalizes with the batch mean and (biased) variance and
// folds them into the running statistics:
//   running = momentum * running + (1 - momentum) * batch
// Inference mode normalizes with the running statistics only. The running
// statistics start at mean 0 / variance 1, so an untrained network in
// inference mode is close to the identity.

use crate::error::NnError;
use crate::layer::{Mode, Param, as_2d, check_features};
use ndarray::{Array1, Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm {
    gamma: Array1<f32>,
    beta: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
    pub momentum: f32,
    pub epsilon: f32,
    #[serde(skip)]
    gamma_grad: Array1<f32>,
    #[serde(skip)]
    beta_grad: Array1<f32>,
    #[serde(skip)]
    cache: Option<BatchNormCache>,
}

#[derive(Debug, Clone)]
struct BatchNormCache {
    x_hat: Array2<f32>,
    inv_std: Array1<f32>,
    /// True when the forward pass normalized with batch statistics.
    batch_stats: bool,
}

impl BatchNorm {
    pub fn new(features: usize, momentum: f32, epsilon: f32) -> Self {
        Self {
            gamma: Array1::ones(features),
            beta: Array1::zeros(features),
            running_mean: Array1::zeros(features),
            running_var: Array1::ones(features),
            momentum,
            epsilon,
            gamma_grad: Array1::zeros(features),
            beta_grad: Array1::zeros(features),
            cache: None,
        }
    }

    pub fn features(&self) -> usize {
        self.gamma.len()
    }

    pub fn running_mean(&self) -> &Array1<f32> {
        &self.running_mean
    }

    pub fn running_var(&self) -> &Array1<f32> {
        &self.running_var
    }

    /// Trainable parameters only; the running statistics are state, not
    /// parameters.
    pub fn num_parameters(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }

    pub(crate) fn forward(
        &mut self,
        input: &ArrayD<f32>,
        mode: Mode,
    ) -> Result<ArrayD<f32>, NnError> {
        let x = as_2d(input, "batch_norm")?;
        check_features("batch_norm", self.features(), x.shape())?;

        let (mean, var, batch_stats) = match mode {
            Mode::Train if x.nrows() > 0 => {
                let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
                let centered = &x - &mean;
                let var = (&centered * &centered)
                    .mean_axis(Axis(0))
                    .unwrap_or_else(|| Array1::zeros(x.ncols()));
                let m = self.momentum;
                self.running_mean = &self.running_mean * m + &mean * (1.0 - m);
                self.running_var = &self.running_var * m + &var * (1.0 - m);
                (mean, var, true)
            }
            _ => (self.running_mean.clone(), self.running_var.clone(), false),
        };

        let eps = self.epsilon;
        let inv_std = var.mapv(|v| 1.0 / (v + eps).sqrt());
        let x_hat = (&x - &mean) * &inv_std;
        let y = &x_hat * &self.gamma + &self.beta;
        self.cache = Some(BatchNormCache {
            x_hat,
            inv_std,
            batch_stats,
        });
        Ok(y.into_dyn())
    }

    pub(crate) fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let g = as_2d(grad_output, "batch_norm")?;
        let cache = self
            .cache
            .as_ref()
            .ok_or(NnError::NoForwardCache("batch_norm"))?;

        let gamma_grad = (&g * &cache.x_hat).sum_axis(Axis(0));
        let beta_grad = g.sum_axis(Axis(0));
        let d_x_hat = &g * &self.gamma;

        let dx = if cache.batch_stats {
            let n = g.nrows() as f32;
            let sum_d = d_x_hat.sum_axis(Axis(0));
            let sum_d_xhat = (&d_x_hat * &cache.x_hat).sum_axis(Axis(0));
            let inner = &d_x_hat * n - &sum_d - &(&cache.x_hat * &sum_d_xhat);
            inner * &(&cache.inv_std / n)
        } else {
            // Running statistics are constants with respect to the input.
            d_x_hat * &cache.inv_std
        };

        self.gamma_grad = gamma_grad;
        self.beta_grad = beta_grad;
        Ok(dx.into_dyn())
    }

    pub(crate) fn params(&mut self) -> Vec<Param<'_>> {
        if self.gamma_grad.len() != self.gamma.len() {
            self.gamma_grad = Array1::zeros(self.gamma.len());
            self.beta_grad = Array1::zeros(self.beta.len());
        }
        vec![
            Param {
                value: self.gamma.view_mut().into_dyn(),
                grad: self.gamma_grad.view().into_dyn(),
            },
            Param {
                value: self.beta.view_mut().into_dyn(),
                grad: self.beta_grad.view().into_dyn(),
            },
        ]
    }
}
