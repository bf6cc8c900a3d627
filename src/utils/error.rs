//! Error types for the image pipeline.
//!
//! Every failure surfaced by parsing, sources, transforms or the remote
//! optimizer is converted into [`PipelineError`]. Payloads are plain strings so
//! the error is cheap to clone, which lets a single failed dial be handed to
//! every caller waiting on it.

use std::io;
use std::time::Duration;
use serde::Serialize;
use thiserror::Error;

/// Main error type for the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PipelineError {
    /// No source is registered under the name
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Malformed source URI, missing credential or database
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Task-chain arity/parse failure or invalid lookup parameter
    #[error("Argument error: {0}")]
    Argument(String),

    /// Failure reported by a source, the codec or the remote optimizer
    #[error("Backend error: {0}")]
    Backend(String),

    /// The chain did not finish within its deadline
    #[error("Pipeline timed out after {0:?}")]
    Timeout(Duration),

    /// Control signal: stop the chain and return the current image.
    #[error("abort next")]
    AbortNext,
}

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

// Helper methods for error creation
impl PipelineError {
    pub fn not_found<T: Into<String>>(name: T) -> Self {
        Self::NotFound(name.into())
    }

    pub fn configuration<T: Into<String>>(msg: T) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn argument<T: Into<String>>(msg: T) -> Self {
        Self::Argument(msg.into())
    }

    pub fn backend<T: Into<String>>(msg: T) -> Self {
        Self::Backend(msg.into())
    }

    /// Returns `true` for the [`PipelineError::AbortNext`] control signal.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::AbortNext)
    }
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        Self::Backend(format!("IO error: {err}"))
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        Self::Backend(format!("Image codec error: {err}"))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        Self::Backend(format!("HTTP error: {err}"))
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Backend(format!("Task panicked: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_is_distinguished() {
        assert!(PipelineError::AbortNext.is_abort());
        assert!(!PipelineError::backend("boom").is_abort());
    }

    #[test]
    fn io_errors_become_backend_errors() {
        let err: PipelineError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, PipelineError::Backend(ref msg) if msg.contains("gone")));
    }
}
