// The `Layer` enum: every layer kind a `Sequential` model can hold.
//
// Layers are a closed enum rather than trait objects so a whole model derives
// `Serialize`/`Deserialize` and round-trips through bincode without a type
// registry. Each variant owns its parameters, their gradients, and whatever
// it cached on the last forward pass.
//
// Contract shared by every variant:
// - `forward` caches what `backward` needs, in both modes. `Mode` only
//   changes behavior for layers that have batch statistics (batch norm).
// - `backward` takes dLoss/dOutput for the most recent forward call,
//   overwrites the layer's parameter gradients, and returns dLoss/dInput.
//   Gradients are never accumulated across calls.
// - `params` yields (value, gradient) pairs in a fixed order; the optimizer
//   relies on that order being stable for the life of the model.
//
// All tensors carry the batch on axis 0. Shapes elsewhere in this crate
// exclude the batch axis unless stated otherwise.

use crate::activation::{LeakyRelu, Sigmoid, Tanh};
use crate::batch_norm::BatchNorm;
use crate::dense::Dense;
use crate::error::NnError;
use crate::lstm::{Bidirectional, Lstm};
use ndarray::{ArrayD, ArrayView2, ArrayView3, ArrayViewD, ArrayViewMutD, Ix2, Ix3, IxDyn};
use serde::{Deserialize, Serialize};

/// Whether a forward pass is part of a training update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Use batch statistics and update running statistics.
    Train,
    /// Use running statistics; nothing in the layer changes.
    Infer,
}

/// A trainable tensor and the gradient computed for it by the last
/// `backward` call.
pub struct Param<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewD<'a, f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Layer {
    Dense(Dense),
    LeakyRelu(LeakyRelu),
    BatchNorm(BatchNorm),
    Tanh(Tanh),
    Sigmoid(Sigmoid),
    Reshape(Reshape),
    Lstm(Lstm),
    Bidirectional(Bidirectional),
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Dense(_) => "dense",
            Layer::LeakyRelu(_) => "leaky_relu",
            Layer::BatchNorm(_) => "batch_norm",
            Layer::Tanh(_) => "tanh",
            Layer::Sigmoid(_) => "sigmoid",
            Layer::Reshape(_) => "reshape",
            Layer::Lstm(_) => "lstm",
            Layer::Bidirectional(_) => "bidirectional",
        }
    }

    pub fn forward(&mut self, input: &ArrayD<f32>, mode: Mode) -> Result<ArrayD<f32>, NnError> {
        match self {
            Layer::Dense(l) => l.forward(input),
            Layer::LeakyRelu(l) => Ok(l.forward(input)),
            Layer::BatchNorm(l) => l.forward(input, mode),
            Layer::Tanh(l) => Ok(l.forward(input)),
            Layer::Sigmoid(l) => Ok(l.forward(input)),
            Layer::Reshape(l) => l.forward(input),
            Layer::Lstm(l) => l.forward(input),
            Layer::Bidirectional(l) => l.forward(input),
        }
    }

    pub fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        match self {
            Layer::Dense(l) => l.backward(grad_output),
            Layer::LeakyRelu(l) => l.backward(grad_output),
            Layer::BatchNorm(l) => l.backward(grad_output),
            Layer::Tanh(l) => l.backward(grad_output),
            Layer::Sigmoid(l) => l.backward(grad_output),
            Layer::Reshape(l) => l.backward(grad_output),
            Layer::Lstm(l) => l.backward(grad_output),
            Layer::Bidirectional(l) => l.backward(grad_output),
        }
    }

    pub fn params(&mut self) -> Vec<Param<'_>> {
        match self {
            Layer::Dense(l) => l.params(),
            Layer::BatchNorm(l) => l.params(),
            Layer::Lstm(l) => l.params(),
            Layer::Bidirectional(l) => l.params(),
            Layer::LeakyRelu(_) | Layer::Tanh(_) | Layer::Sigmoid(_) | Layer::Reshape(_) => {
                Vec::new()
            }
        }
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            Layer::Dense(l) => l.num_parameters(),
            Layer::BatchNorm(l) => l.num_parameters(),
            Layer::Lstm(l) => l.num_parameters(),
            Layer::Bidirectional(l) => l.num_parameters(),
            Layer::LeakyRelu(_) | Layer::Tanh(_) | Layer::Sigmoid(_) | Layer::Reshape(_) => 0,
        }
    }

    /// Output shape (without batch axis) for a given input shape.
    pub fn output_shape(&self, input: &[usize]) -> Vec<usize> {
        match self {
            Layer::Dense(l) => vec![l.output_dim()],
            Layer::Reshape(l) => l.target.clone(),
            Layer::Lstm(l) => l.output_shape(input),
            Layer::Bidirectional(l) => l.output_shape(input),
            Layer::LeakyRelu(_) | Layer::BatchNorm(_) | Layer::Tanh(_) | Layer::Sigmoid(_) => {
                input.to_vec()
            }
        }
    }
}

/// Reinterpret each sample as `target` (batch axis untouched).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reshape {
    pub target: Vec<usize>,
    #[serde(skip)]
    input_shape: Option<Vec<usize>>,
}

impl Reshape {
    pub fn new(target: Vec<usize>) -> Self {
        Self {
            target,
            input_shape: None,
        }
    }

    fn forward(&mut self, input: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let batch = input.shape().first().copied().unwrap_or(0);
        let mut shape = vec![batch];
        shape.extend_from_slice(&self.target);
        let out = reshape(input, &shape, "reshape")?;
        self.input_shape = Some(input.shape().to_vec());
        Ok(out)
    }

    fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let shape = self
            .input_shape
            .as_ref()
            .ok_or(NnError::NoForwardCache("reshape"))?;
        reshape(grad_output, shape, "reshape")
    }
}

/// Copy `array` into a new array of `shape`, reading in logical order.
pub(crate) fn reshape(
    array: &ArrayD<f32>,
    shape: &[usize],
    layer: &'static str,
) -> Result<ArrayD<f32>, NnError> {
    let data: Vec<f32> = array.iter().copied().collect();
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| NnError::Shape {
        layer,
        expected: format!("{} elements", shape.iter().product::<usize>()),
        found: array.shape().to_vec(),
    })
}

pub(crate) fn as_2d<'a>(
    array: &'a ArrayD<f32>,
    layer: &'static str,
) -> Result<ArrayView2<'a, f32>, NnError> {
    array
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| NnError::Shape {
            layer,
            expected: "(batch, features)".into(),
            found: array.shape().to_vec(),
        })
}

pub(crate) fn as_3d<'a>(
    array: &'a ArrayD<f32>,
    layer: &'static str,
) -> Result<ArrayView3<'a, f32>, NnError> {
    array
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| NnError::Shape {
            layer,
            expected: "(batch, steps, features)".into(),
            found: array.shape().to_vec(),
        })
}

/// Fail with a shape error unless `found` has exactly `expected` elements
/// along the feature axis.
pub(crate) fn check_features(
    layer: &'static str,
    expected: usize,
    found: &[usize],
) -> Result<(), NnError> {
    if found.last().copied() == Some(expected) {
        Ok(())
    } else {
        Err(NnError::Shape {
            layer,
            expected: format!("{expected} input features"),
            found: found.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn reshape_round_trips_gradient() {
        let mut layer = Reshape::new(vec![3, 1]);
        let x = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f32).into_dyn();
        let y = layer.forward(&x).unwrap();
        assert_eq!(y.shape(), &[2, 3, 1]);
        assert_eq!(y[[1, 2, 0]], 5.0);
        let g = layer.backward(&y).unwrap();
        assert_eq!(g, x);
    }

    #[test]
    fn reshape_rejects_wrong_element_count() {
        let mut layer = Reshape::new(vec![4, 1]);
        let x = Array2::<f32>::zeros((2, 3)).into_dyn();
        assert!(matches!(layer.forward(&x), Err(NnError::Shape { .. })));
    }

    #[test]
    fn as_3d_reports_shape() {
        let x = Array3::<f32>::zeros((1, 2, 3)).into_dyn();
        assert!(as_3d(&x, "t").is_ok());
        let err = as_2d(&x, "t").unwrap_err();
        assert!(err.to_string().contains("[1, 2, 3]"));
    }
}
