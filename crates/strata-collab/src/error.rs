//! Error types for strata-collab
//!
//! The variants mirror how a failure is surfaced to a connection: some are
//! answered in-band, some close the socket, and only [`Error::InternalFault`]
//! tears a whole room down.

use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Collaboration error type
#[derive(Debug, Error)]
pub enum Error {
    /// Unparseable client message
    #[error("invalid message: {0}")]
    Client(String),

    /// A reader tried to mutate, or a non-owner tried an owner action
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Missing or invalid credentials
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Room absent from memory and from the store
    #[error("room not found: {0}")]
    NotFound(String),

    /// Store failure
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Unexpected processing failure; the room is torn down
    #[error("internal fault: {0}")]
    InternalFault(String),

    /// The room hub shut down before handling the request
    #[error("room closed")]
    Closed,
}

impl Error {
    /// Create a client error
    #[must_use]
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    /// Create a permission error
    #[must_use]
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create an internal fault
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalFault(msg.into())
    }

    /// Whether the connection should be closed after reporting this error
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::NotFound(_) | Self::InternalFault(_) | Self::Closed
        )
    }

    /// Get error code for protocol messages
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Client(_) => "invalid_message",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Auth(e) => e.code(),
            Self::NotFound(_) => "room_not_found",
            Self::Persistence(_) => "persistence_error",
            Self::InternalFault(_) => "internal_error",
            Self::Closed => "room_closed",
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Persistence(other.to_string()),
        }
    }
}

impl From<strata_core::Error> for Error {
    fn from(err: strata_core::Error) -> Self {
        Self::InternalFault(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Client(err.to_string())
    }
}

/// Result type alias for collaboration operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::client("x").code(), "invalid_message");
        assert_eq!(Error::permission_denied("x").code(), "permission_denied");
        assert_eq!(Error::Closed.code(), "room_closed");
        assert_eq!(
            Error::from(AuthError::MissingCredentials).code(),
            "missing_credentials"
        );
    }

    #[test]
    fn test_terminal_errors() {
        assert!(Error::NotFound("r".to_string()).is_terminal());
        assert!(Error::internal("boom").is_terminal());
        assert!(!Error::permission_denied("reader").is_terminal());
        assert!(!Error::client("bad json").is_terminal());
    }

    #[test]
    fn test_from_store_error() {
        let err: Error = StoreError::NotFound("abc".to_string()).into();
        assert!(matches!(err, Error::NotFound(ref id) if id == "abc"));

        let err: Error = StoreError::Database("locked".to_string()).into();
        assert_eq!(err.code(), "persistence_error");
    }

    #[test]
    fn test_from_core_error() {
        let err: Error = strata_core::Error::invariant("row 3 missing").into();
        assert_eq!(err.code(), "internal_error");
        assert!(err.to_string().contains("row 3 missing"));
    }
}
