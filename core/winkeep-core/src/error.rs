//! Error types for winkeep-core operations.
//!
//! Only internal seams (store, launcher, config) return these. The public
//! launch surface on [`crate::LaunchManager`] absorbs and logs them.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum WinkeepError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Store Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Store error: {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Data directory not found")]
    DataDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // Launch Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl WinkeepError {
    pub(crate) fn store(context: impl Into<String>, source: rusqlite::Error) -> Self {
        WinkeepError::Store {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WinkeepError::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using WinkeepError.
pub type Result<T> = std::result::Result<T, WinkeepError>;

impl From<WinkeepError> for String {
    fn from(err: WinkeepError) -> String {
        err.to_string()
    }
}
