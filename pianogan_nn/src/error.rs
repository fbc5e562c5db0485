// Error type for the layer library.
//
// Shape errors carry the layer name and the offending input shape so a
// misconfigured network fails with a message that points at the layer.
// Persistence errors carry the model file path.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NnError {
    #[error("{layer}: expected input of shape {expected}, got {found:?}")]
    Shape {
        layer: &'static str,
        expected: String,
        found: Vec<usize>,
    },

    #[error("{0}: backward called before forward")]
    NoForwardCache(&'static str),

    #[error("optimizer tracks {expected} parameters but the model exposes {found}")]
    ParamCount { expected: usize, found: usize },

    #[error("parameter {index} changed shape from {expected:?} to {found:?}")]
    ParamShape {
        index: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("model file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model file {}: {source}", path.display())]
    Codec {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
}
