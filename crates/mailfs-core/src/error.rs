//! Errors reported by mail store implementations.

use std::io;
use thiserror::Error;

/// Failure of a single mail store call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has no message with this id.
    #[error("message {0} not found")]
    NotFound(u64),

    /// The session could not be established or was lost.
    #[error("mail store connection failed: {0}")]
    Connection(String),

    /// The store answered, but refused or failed the request.
    #[error("mail store rejected request: {0}")]
    Protocol(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// True when the message is known not to exist remotely.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// True when the session itself is gone and a new one may succeed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Io(_))
    }
}

/// Result type for mail store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_details() {
        assert!(StoreError::NotFound(42).to_string().contains("42"));
        assert!(
            StoreError::Protocol("NO [TRYCREATE]".into())
                .to_string()
                .contains("TRYCREATE")
        );
    }

    #[test]
    fn not_found_classification() {
        assert!(StoreError::NotFound(1).is_not_found());
        assert!(!StoreError::Connection("reset".into()).is_not_found());
    }

    #[test]
    fn connection_lost_classification() {
        assert!(StoreError::Connection("reset".into()).is_connection_lost());
        assert!(StoreError::Io(io::Error::other("broken pipe")).is_connection_lost());
        assert!(!StoreError::Protocol("NO".into()).is_connection_lost());
        assert!(!StoreError::NotFound(1).is_connection_lost());
    }

    #[test]
    fn from_io_error() {
        let err: StoreError = io::Error::other("broken pipe").into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
