//! Error taxonomy for helpdesk operations

use crate::db::DbError;
use thiserror::Error;

/// Why an operation did not happen.
///
/// Validation and not-found failures are detected before a transaction is
/// opened where possible. Anything returned from inside a transaction rolls
/// it back.
#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] DbError),
}

impl From<diesel::result::Error> for HelpdeskError {
    fn from(e: diesel::result::Error) -> Self {
        HelpdeskError::Infrastructure(DbError::Query(e))
    }
}

impl HelpdeskError {
    pub fn validation(msg: impl Into<String>) -> Self {
        HelpdeskError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        HelpdeskError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        HelpdeskError::Conflict(msg.into())
    }

    /// Stable label for logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            HelpdeskError::Validation(_) => "validation",
            HelpdeskError::NotFound(_) => "not_found",
            HelpdeskError::Conflict(_) => "conflict",
            HelpdeskError::Infrastructure(_) => "infrastructure",
        }
    }
}

pub type Result<T> = std::result::Result<T, HelpdeskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(HelpdeskError::validation("x").kind(), "validation");
        assert_eq!(HelpdeskError::not_found("x").kind(), "not_found");
        assert_eq!(HelpdeskError::conflict("x").kind(), "conflict");
        let infra: HelpdeskError = diesel::result::Error::NotFound.into();
        assert_eq!(infra.kind(), "infrastructure");
    }

    #[test]
    fn test_message_is_the_reason() {
        let err = HelpdeskError::conflict("ticket 4 was already evaluated");
        assert_eq!(err.to_string(), "ticket 4 was already evaluated");
    }
}
