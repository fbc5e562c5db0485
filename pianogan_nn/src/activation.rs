// Element-wise activations. Shape-agnostic: they accept any rank.

use crate::error::NnError;
use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

/// `x` for positive inputs, `alpha * x` otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeakyRelu {
    pub alpha: f32,
    #[serde(skip)]
    input: Option<ArrayD<f32>>,
}

impl LeakyRelu {
    pub fn new(alpha: f32) -> Self {
        Self { alpha, input: None }
    }

    pub(crate) fn forward(&mut self, input: &ArrayD<f32>) -> ArrayD<f32> {
        let alpha = self.alpha;
        let y = input.mapv(|v| if v > 0.0 { v } else { alpha * v });
        self.input = Some(input.clone());
        y
    }

    pub(crate) fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let x = self
            .input
            .as_ref()
            .ok_or(NnError::NoForwardCache("leaky_relu"))?;
        let alpha = self.alpha;
        let mut grad = grad_output.clone();
        Zip::from(&mut grad).and(x).for_each(|g, &v| {
            if v <= 0.0 {
                *g *= alpha;
            }
        });
        Ok(grad)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tanh {
    #[serde(skip)]
    output: Option<ArrayD<f32>>,
}

impl Tanh {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn forward(&mut self, input: &ArrayD<f32>) -> ArrayD<f32> {
        let y = input.mapv(f32::tanh);
        self.output = Some(y.clone());
        y
    }

    pub(crate) fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let y = self.output.as_ref().ok_or(NnError::NoForwardCache("tanh"))?;
        Ok(grad_output * &y.mapv(|v| 1.0 - v * v))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sigmoid {
    #[serde(skip)]
    output: Option<ArrayD<f32>>,
}

impl Sigmoid {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn forward(&mut self, input: &ArrayD<f32>) -> ArrayD<f32> {
        let y = input.mapv(sigmoid);
        self.output = Some(y.clone());
        y
    }

    pub(crate) fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let y = self
            .output
            .as_ref()
            .ok_or(NnError::NoForwardCache("sigmoid"))?;
        Ok(grad_output * &y.mapv(|v| v * (1.0 - v)))
    }
}

/// Logistic function, stable for large |x|.
pub fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{Layer, Mode};
    use crate::testutil::check_gradients;
    use ndarray::{Array2, Array3, array};
    use pianogan_prng::Prng;

    #[test]
    fn leaky_relu_scales_negatives() {
        let mut layer = LeakyRelu::new(0.2);
        let y = layer.forward(&array![[-1.0, 0.0, 2.0]].into_dyn());
        assert_eq!(y, array![[-0.2, 0.0, 2.0]].into_dyn());
        let g = layer.backward(&array![[1.0, 1.0, 1.0]].into_dyn()).unwrap();
        assert_eq!(g, array![[0.2, 0.2, 1.0]].into_dyn());
    }

    #[test]
    fn sigmoid_is_stable_at_extremes() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(100.0) <= 1.0 && sigmoid(100.0) > 0.999);
        assert!(sigmoid(-100.0) >= 0.0 && sigmoid(-100.0) < 1e-3);
        assert!(sigmoid(-1000.0).is_finite());
    }

    #[test]
    fn tanh_gradient_matches_finite_differences() {
        let mut rng = Prng::new(5);
        let input = Array3::from_shape_fn((2, 3, 2), |_| rng.range_f32(-2.0, 2.0)).into_dyn();
        check_gradients(Layer::Tanh(Tanh::new()), input, Mode::Train, &mut rng);
    }

    #[test]
    fn sigmoid_gradient_matches_finite_differences() {
        let mut rng = Prng::new(6);
        let input = Array2::from_shape_fn((4, 3), |_| rng.range_f32(-3.0, 3.0)).into_dyn();
        check_gradients(Layer::Sigmoid(Sigmoid::new()), input, Mode::Train, &mut rng);
    }
}
