//! Error types for tenderflow.
//!
//! Library crates use [`TenderflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only [`TenderflowError::SourceUnavailable`] is allowed to end a run early.
//! Everything else is caught at a tender or file boundary and turned into a
//! degraded record or a dropped tender.

use std::path::PathBuf;

/// Top-level error type for all tenderflow operations.
#[derive(Debug, thiserror::Error)]
pub enum TenderflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The tender source could not be reached or refused our credentials.
    #[error("tender source unavailable after {attempts} attempt(s): {message}")]
    SourceUnavailable { attempts: u32, message: String },

    /// The tender source answered, but a request for one tender failed.
    #[error("source error: {0}")]
    Source(String),

    /// Network/HTTP error while talking to the portal or the sink.
    #[error("network error: {0}")]
    Network(String),

    /// The bundle transfer itself failed (refused, non-2xx, cut short).
    #[error("bundle download failed: {0}")]
    Download(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A record was asked to move to a status its lifecycle does not allow.
    #[error("tender {reference}: cannot move from {from} to {to}")]
    Lifecycle {
        reference: String,
        from: String,
        to: String,
    },

    /// Data validation error (invalid manifest, bad date, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Writing the run artifact failed.
    #[error("artifact error: {0}")]
    Artifact(String),

    /// A blocking worker task died before returning.
    #[error("task failed: {0}")]
    Task(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TenderflowError>;

impl TenderflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceUnavailable { .. } | Self::Config { .. })
    }
}
