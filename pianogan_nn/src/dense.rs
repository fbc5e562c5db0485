// Fully connected layer: `y = x · W + b`.

use crate::error::NnError;
use crate::init::glorot_uniform;
use crate::layer::{Param, as_2d, check_features};
use ndarray::{Array1, Array2, ArrayD, Axis};
use pianogan_prng::Prng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// (input_dim, output_dim)
    weight: Array2<f32>,
    bias: Array1<f32>,
    #[serde(skip)]
    weight_grad: Array2<f32>,
    #[serde(skip)]
    bias_grad: Array1<f32>,
    #[serde(skip)]
    input: Option<Array2<f32>>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    pub fn new(input_dim: usize, output_dim: usize, rng: &mut Prng) -> Self {
        Self::from_parts(
            glorot_uniform(rng, input_dim, output_dim),
            Array1::zeros(output_dim),
        )
    }

    pub fn from_parts(weight: Array2<f32>, bias: Array1<f32>) -> Self {
        Self {
            weight_grad: Array2::zeros(weight.dim()),
            bias_grad: Array1::zeros(bias.len()),
            weight,
            bias,
            input: None,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weight.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.ncols()
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    pub(crate) fn forward(&mut self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let x = as_2d(input, "dense")?;
        check_features("dense", self.input_dim(), x.shape())?;
        let y = x.dot(&self.weight) + &self.bias;
        self.input = Some(x.to_owned());
        Ok(y.into_dyn())
    }

    pub(crate) fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let g = as_2d(grad_output, "dense")?;
        let x = self.input.as_ref().ok_or(NnError::NoForwardCache("dense"))?;
        self.weight_grad = x.t().dot(&g);
        self.bias_grad = g.sum_axis(Axis(0));
        Ok(g.dot(&self.weight.t()).into_dyn())
    }

    pub(crate) fn params(&mut self) -> Vec<Param<'_>> {
        if self.weight_grad.dim() != self.weight.dim() {
            self.weight_grad = Array2::zeros(self.weight.dim());
            self.bias_grad = Array1::zeros(self.bias.len());
        }
        vec![
            Param {
                value: self.weight.view_mut().into_dyn(),
                grad: self.weight_grad.view().into_dyn(),
            },
            Param {
                value: self.bias.view_mut().into_dyn(),
                grad: self.bias_grad.view().into_dyn(),
            },
        ]
    }
}
