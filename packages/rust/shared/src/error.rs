//! Error types for Presswork.
//!
//! Library crates use [`PressworkError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! The build pipeline isolates recoverable failures (a bad file, a bad
//! entry, an unreadable asset) at the smallest granularity and logs them;
//! only configuration and output-writing failures surface as errors.

use std::path::PathBuf;

/// Top-level error type for all Presswork operations.
#[derive(Debug, thiserror::Error)]
pub enum PressworkError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Content file parsing error (YAML, JSON, or Markdown).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Schema or entry validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Output artifact writing error. Always fatal.
    #[error("output error: {0}")]
    Output(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PressworkError>;

impl PressworkError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
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
}
