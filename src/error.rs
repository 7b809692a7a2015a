//! Error types surfaced by the executor, result store and checkpoint layers.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can escape the executor's public API.
///
/// `EarlyBail` is deliberately absent here: it is an expected control-flow
/// signal produced by debug mode, not a failure, and is modeled as a
/// [`crate::executor::PhaseOutcome`] returned by the phase driver rather than
/// propagated through this enum. A malformed update file is likewise never
/// surfaced as an error: [`crate::lifecycle::LifeCycleMonitor`] downgrades it
/// to a `STOP` action internally.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("model contract violated: {0}")]
    ModelContract(String),

    #[error("no results available")]
    NoResults,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ExecutorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExecutorError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<bincode::Error> for ExecutorError {
    fn from(e: bincode::Error) -> Self {
        ExecutorError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for ExecutorError {
    fn from(e: serde_json::Error) -> Self {
        ExecutorError::Serialization(e.to_string())
    }
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
