//! Error handling for card construction and configuration.
//!
//! Port accesses, timer programming and rendering never fail: faults on those
//! paths are logged and degrade to a defined idle value. Only loading
//! configuration and firmware images can return an error.

use std::path::PathBuf;
use thiserror::Error;

/// Convenient result alias for card setup.
pub type Result<T> = std::result::Result<T, ImfcError>;

/// Errors that may occur while configuring or loading the card.
#[derive(Debug, Error)]
pub enum ImfcError {
    /// IO error while reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Firmware image could not be read.
    #[error("failed to open IMFC ROM image '{}': {source}", path.display())]
    Firmware {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying IO failure.
        source: std::io::Error,
    },

    /// Configuration rejected during validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file is not valid JSON for [`crate::CardConfig`].
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<String> for ImfcError {
    fn from(msg: String) -> Self {
        ImfcError::Config(msg)
    }
}

impl From<&str> for ImfcError {
    fn from(msg: &str) -> Self {
        ImfcError::Config(msg.to_string())
    }
}
