//! Error types for the Tether engine.

use thiserror::Error;

use crate::transport::TransportError;

/// All possible errors from the Tether engine.
///
/// Errors are `Clone` because a single failed execution is shared by every
/// caller that joined it through the deduplicator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Remote call errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("remote returned status {status}")]
    Status {
        status: u16,
        message: Option<String>,
    },

    #[error("request cancelled")]
    Cancelled,

    // Local state errors
    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid store file: {0}")]
    InvalidStoreFile(String),
}

impl Error {
    /// The server-supplied message attached to a non-2xx response, if any.
    pub fn remote_message(&self) -> Option<&str> {
        match self {
            Error::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
