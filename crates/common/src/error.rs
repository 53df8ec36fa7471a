//! Error types shared across Shadercap crates.

use std::path::PathBuf;

/// Top-level error type for Shadercap operations.
#[derive(Debug, thiserror::Error)]
pub enum ShadercapError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Timed out: {message}")]
    Timeout { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Render surface error: {message}")]
    Surface { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("{format} encoder failed (status {status}): {output}")]
    Subprocess {
        format: String,
        status: String,
        output: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ShadercapError.
pub type ShadercapResult<T> = Result<T, ShadercapError>;

impl ShadercapError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn subprocess(
        format: impl Into<String>,
        status: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Subprocess {
            format: format.into(),
            status: status.into(),
            output: output.into(),
        }
    }

    /// Whether this error came from an I/O failure (write, create, delete).
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::CreateDir { .. })
    }
}
