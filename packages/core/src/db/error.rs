//! Outline Storage Errors
//!
//! Failures of the per-server outline database: opening the file, creating
//! the documents/nodes/children/tombstones tables, and the statements an
//! apply transaction runs. A stored row that no longer decodes (a child list
//! that is not a JSON id array, an unknown node status, a non-text note
//! column) is reported as [`DatabaseError::CorruptRow`]; loading never skips
//! a row.

use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Apply-level rejections (conflict kinds) are not database errors; they are
/// reported by the service layer before anything is written.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The database file could not be opened
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// A table or index of the outline schema could not be created
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Permission denied when accessing database
    #[error("Permission denied for database path: {path}")]
    PermissionDenied { path: PathBuf },

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    /// A node, child list, tombstone or document statement failed
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// A stored node or child list row could not be decoded
    #[error("Corrupt row: {context}")]
    CorruptRow { context: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied(path: PathBuf) -> Self {
        Self::PermissionDenied { path }
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn corrupt_row(context: impl Into<String>) -> Self {
        Self::CorruptRow {
            context: context.into(),
        }
    }
}
