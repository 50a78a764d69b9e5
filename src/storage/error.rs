//! Error taxonomy for object-store and local filesystem failures.

use std::path::Path;

use thiserror::Error;

/// Errors surfaced by an [`ObjectStore`](super::ObjectStore) or by the local
/// filesystem side of a transfer.
///
/// The `Display` text is what a failed transfer item shows to the user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// Network unreachable, DNS/endpoint misconfiguration, TLS failure, timeout.
    #[error("Connection failed: {message}")]
    Transport { message: String },

    /// Invalid or insufficient credentials for the requested operation.
    #[error("Access denied: {message}")]
    Unauthorized { message: String },

    /// Bucket or key does not exist.
    #[error("Not found: {key}")]
    NotFound { key: String },

    /// Unable to create/open/read/write a local file or directory.
    #[error("Local file error{}: {message}", for_path(.path))]
    LocalIo { path: String, message: String },

    /// Anything else, kept as its raw description.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Wrap an I/O error together with the path it happened on.
    pub fn local(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::LocalIo {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

fn for_path(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!(" for {path}")
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::LocalIo {
            path: String::new(),
            message: err.to_string(),
        }
    }
}
