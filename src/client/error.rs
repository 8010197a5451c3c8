//! Backend Status Errors

use thiserror::Error;

/// A non-OK status returned by the backend client.
///
/// The variants mirror the status classes a distributed storage client
/// reports. The `Display` form is what ends up on the wire after `ERR `.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    TimedOut(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Aborted: {0}")]
    Aborted(String),
}

impl BackendError {
    /// The message without the status class prefix.
    pub fn message(&self) -> &str {
        match self {
            BackendError::NotFound(m)
            | BackendError::TimedOut(m)
            | BackendError::NetworkError(m)
            | BackendError::InvalidArgument(m)
            | BackendError::IllegalState(m)
            | BackendError::IoError(m)
            | BackendError::RuntimeError(m)
            | BackendError::Aborted(m) => m,
        }
    }

    /// Returns true for timeouts.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, BackendError::TimedOut(_))
    }
}
