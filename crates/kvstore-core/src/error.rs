//! Error types shared by every storage backend

use thiserror::Error;

/// Errors a storage backend can report.
///
/// A missing or expired key is never an error: reads leave the destination
/// untouched and deletes are no-ops.
#[derive(Error, Debug)]
pub enum KvError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cannot decode stored value for key '{key}': {message}")]
    Decode { key: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection pool exhausted ({max_active} active connections)")]
    PoolExhausted { max_active: usize },

    #[error("Operation canceled")]
    Canceled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl KvError {
    /// Build a decode error for `key` from any displayable cause
    pub fn decode(key: &str, cause: impl std::fmt::Display) -> Self {
        KvError::Decode {
            key: key.to_string(),
            message: cause.to_string(),
        }
    }

    /// True when the failure came from reaching the backend rather than from the data
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            KvError::Transport(_) | KvError::PoolExhausted { .. }
        )
    }

    /// True when the caller's scope ended the operation
    pub fn is_canceled(&self) -> bool {
        matches!(self, KvError::Canceled | KvError::DeadlineExceeded)
    }
}

/// Result type alias for storage operations
pub type KvResult<T> = Result<T, KvError>;
