//! Application error types.
//!
//! Provides unified error handling with actionable context for debugging.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types with specific context for actionable debugging
#[derive(Debug, Error)]
pub enum Error {
    /// IO error with path context
    #[error("IO error at {path:?}: {source}")]
    Io {
        /// The underlying IO error.
        source: std::io::Error,
        /// File path where the error occurred, if known.
        path: Option<std::path::PathBuf>,
    },

    /// Configuration error with guidance
    #[error("Configuration error: {message}. {hint}")]
    Config {
        /// Description of the configuration problem.
        message: String,
        /// Actionable guidance for fixing the issue.
        hint: &'static str,
    },

    /// File parsing error
    #[error("Parse error in {file:?}: {message}")]
    Parse {
        /// File that failed to parse, if known.
        file: Option<std::path::PathBuf>,
        /// Description of the parse failure.
        message: String,
    },

    /// No item with this id exists
    #[error("Unknown lower third: {0}")]
    UnknownItem(String),

    /// No group with this id exists
    #[error("Unknown group: {0}")]
    UnknownGroup(String),

    /// The operation would break a store invariant
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Generic message error (escape hatch)
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an IO error with path context
    pub fn io(source: std::io::Error, path: impl Into<Option<std::path::PathBuf>>) -> Self {
        Self::Io { source, path: path.into() }
    }

    /// Create a config error with actionable hint
    pub fn config(message: impl Into<String>, hint: &'static str) -> Self {
        Self::Config { message: message.into(), hint }
    }

    /// Create a parse error with file context
    pub fn parse(message: impl Into<String>, file: impl Into<Option<std::path::PathBuf>>) -> Self {
        Self::Parse { file: file.into(), message: message.into() }
    }

    /// The storage root has not been configured.
    pub fn no_output_dir() -> Self {
        Self::config(
            "no output directory configured",
            "Set LOWERDECK_OUTPUT_DIR or choose a folder before editing",
        )
    }
}

// Convenience conversions
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io { source: e, path: None }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Self::Msg(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Self::Msg(s.to_string())
    }
}

/// Stable success/error shape handed to the control-plane bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Failure description; absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpResult {
    /// Successful result.
    pub const fn success() -> Self {
        Self { ok: true, error: None }
    }

    /// Failed result carrying a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self { ok: false, error: Some(message.into()) }
    }

    /// Collapse any store result into the bridge shape.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(e) => Self::failure(e.to_string()),
        }
    }
}
