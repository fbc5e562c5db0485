// Sequential model: an ordered stack of layers with persistence.
//
// Models are saved with bincode. Only parameters and configuration are
// stored; gradients and forward caches are rebuilt on demand, so a loaded
// model is ready for inference or for further training with a fresh
// optimizer.

use crate::error::NnError;
use crate::layer::{Layer, Mode, Param};
use log::debug;
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequential {
    name: String,
    /// Per-sample input shape (no batch axis).
    input_shape: Vec<usize>,
    layers: Vec<Layer>,
}

impl Sequential {
    pub fn new(name: impl Into<String>, input_shape: Vec<usize>) -> Self {
        Self {
            name: name.into(),
            input_shape,
            layers: Vec::new(),
        }
    }

    /// Append a layer (builder style).
    pub fn with(mut self, layer: Layer) -> Self {
        self.layers.push(layer);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    /// Per-sample output shape, derived from the layer stack.
    pub fn output_shape(&self) -> Vec<usize> {
        self.layers
            .iter()
            .fold(self.input_shape.clone(), |shape, layer| layer.output_shape(&shape))
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn forward(&mut self, input: &ArrayD<f32>, mode: Mode) -> Result<ArrayD<f32>, NnError> {
        let mut activation = input.clone();
        for layer in &mut self.layers {
            activation = layer.forward(&activation, mode)?;
        }
        Ok(activation)
    }

    /// Backpropagate `grad_output` through every layer, leaving parameter
    /// gradients in place. Returns the gradient with respect to the input.
    pub fn backward(&mut self, grad_output: &ArrayD<f32>) -> Result<ArrayD<f32>, NnError> {
        let mut grad = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(&grad)?;
        }
        Ok(grad)
    }

    pub fn params(&mut self) -> Vec<Param<'_>> {
        self.layers.iter_mut().flat_map(|l| l.params()).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(Layer::num_parameters).sum()
    }

    /// One line per layer: name, output shape, parameter count.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "model {} (input {:?}, {} parameters)",
            self.name,
            self.input_shape,
            self.num_parameters()
        )];
        let mut shape = self.input_shape.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            shape = layer.output_shape(&shape);
            lines.push(format!(
                "  {:>2} {:<14} {:<16} {:>10}",
                i,
                layer.name(),
                format!("{shape:?}"),
                layer.num_parameters()
            ));
        }
        lines
    }

    pub fn save(&self, path: &Path) -> Result<(), NnError> {
        let file = File::create(path).map_err(|source| NnError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self).map_err(|source| NnError::Codec {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(|source| NnError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("saved model {} to {}", self.name, path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, NnError> {
        let file = File::open(path).map_err(|source| NnError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Sequential =
            bincode::deserialize_from(BufReader::new(file)).map_err(|source| NnError::Codec {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            "loaded model {} ({} parameters) from {}",
            model.name,
            model.num_parameters(),
            path.display()
        );
        Ok(model)
    }
}
