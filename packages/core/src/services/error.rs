//! Service Layer Error Types
//!
//! Errors of the apply service: a batch is either rejected with one
//! [`SyncErrorKind`] (nothing written) or fails in the database (rolled back).

use crate::db::DatabaseError;
use crate::sync::SyncErrorKind;
use thiserror::Error;

/// Apply operation errors
#[derive(Error, Debug)]
pub enum ApplyError {
    /// The batch violates a rule; the document is unchanged
    #[error("Batch rejected ({kind}): {detail}")]
    Rejected { kind: SyncErrorKind, detail: String },

    /// Database operation failed; the transaction was rolled back
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),
}

impl ApplyError {
    /// Create a rejection error
    pub fn rejected(kind: SyncErrorKind, detail: impl Into<String>) -> Self {
        Self::Rejected {
            kind,
            detail: detail.into(),
        }
    }

    /// Create a document not found error
    pub fn document_not_found(document_id: &str) -> Self {
        Self::rejected(
            SyncErrorKind::DocumentDoesNotExist,
            format!("document {} does not exist", document_id),
        )
    }

    /// Conflict kind, if this is a rejection
    pub fn kind(&self) -> Option<SyncErrorKind> {
        match self {
            Self::Rejected { kind, .. } => Some(*kind),
            Self::Database(_) => None,
        }
    }
}

impl From<crate::services::validation::Rejection> for ApplyError {
    fn from(rejection: crate::services::validation::Rejection) -> Self {
        Self::Rejected {
            kind: rejection.kind,
            detail: rejection.detail,
        }
    }
}
