//! Error types for AgencyScout.
//!
//! Library crates use [`ScoutError`] via `thiserror`.
//! App crates wrap this with `color-eyre` for rich diagnostics.
//!
//! Propagation policy: per-field and per-extractor failures never surface
//! here — they degrade the affected field to `None` inside the extractors.
//! Per-request failures are retried by the engine up to a bound and then
//! recorded. Only storage failures are allowed to abort a run.

use std::path::PathBuf;

/// Top-level error type for all AgencyScout operations.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during a fetch.
    #[error("network error: {0}")]
    Network(String),

    /// The target served a block page (status, short body, or block phrase).
    #[error("blocked: {reason}")]
    Blocked { reason: String },

    /// HTML or embedded-payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A detail page produced no organization name from any source.
    #[error("no organization name found on {url}")]
    NoName { url: String },

    /// Database or dataset layer error. Run-fatal.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad input, invalid URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScoutError>;

impl ScoutError {
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
