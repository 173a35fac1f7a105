//! Error types for nova-inventory

use thiserror::Error;

/// Main error type for inventory operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Directory walk error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("Backend '{backend}' failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Invalid content hash: {value}")]
    InvalidHash { value: String },

    #[error("Classification failed for {path}: {reason}")]
    Classification { path: String, reason: String },

    #[error("Inventory store error: {reason}")]
    Store { reason: String },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("A reconciliation run is already in progress")]
    RunInProgress,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn backend(backend: &str, reason: impl Into<String>) -> Self {
        Error::Backend {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn store(reason: impl Into<String>) -> Self {
        Error::Store {
            reason: reason.into(),
        }
    }
}

/// Result type alias for inventory operations
pub type Result<T> = std::result::Result<T, Error>;
