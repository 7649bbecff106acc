//! Error types for strata-core

use thiserror::Error;

/// Document error type
#[derive(Debug, Error)]
pub enum Error {
    /// A command referenced state that does not exist. Commands coming out of
    /// `Document::prepare` or the history never do this, so seeing one means
    /// the document and its history have diverged.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// A lithology attribute received a value of the wrong shape
    #[error("invalid value for lithology field {field}: {value}")]
    InvalidFieldValue {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },
}

impl Error {
    /// Create an invariant violation error
    #[must_use]
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    /// Get error code for protocol messages
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invariant(_) => "invariant_violation",
            Self::InvalidFieldValue { .. } => "invalid_field_value",
        }
    }
}

/// Result type alias for document operations
pub type Result<T> = std::result::Result<T, Error>;
