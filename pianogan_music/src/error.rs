// Error types for the training and generation pipeline.
//
// `ExtractError` describes why one MIDI file could not be turned into tokens;
// `PipelineError` is what every public pipeline operation returns, and wraps
// the per-file error together with the offending path.

use crate::token::TokenParseError;
use pianogan_nn::NnError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed MIDI: {0}")]
    Parse(#[from] midly::Error),

    #[error("SMPTE timecode timing is not supported")]
    Timecode,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("corpus directory {} does not exist", .0.display())]
    MissingCorpus(PathBuf),

    #[error("no .mid or .midi files under {}", .0.display())]
    EmptyCorpus(PathBuf),

    #[error("corpus has {found} tokens but a window needs {needed}")]
    NotEnoughTokens { found: usize, needed: usize },

    #[error(transparent)]
    Token(#[from] TokenParseError),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("network: {0}")]
    Network(#[from] NnError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PipelineError::Io { path, source }
    }

    pub(crate) fn json(path: impl Into<PathBuf>) -> impl FnOnce(serde_json::Error) -> Self {
        let path = path.into();
        move |source| PipelineError::Json { path, source }
    }
}
