//! Sync Error Types
//!
//! [`SyncErrorKind`] is the fixed conflict taxonomy shared by the server (which
//! rejects a batch with exactly one kind) and the client (which reports it).
//! [`SyncError`] is what [`SyncClient::save`](super::SyncClient::save) returns.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Reason a batch was rejected as a whole
///
/// Serialized as the bare variant name (`"DeleteRootNodeConflict"`), which is
/// the `errorKind` value on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncErrorKind {
    /// Batch root list missing or empty
    RootNodeEmpty,
    /// Persisted root row malformed or absent for a non-empty document
    RootNodeMissing,
    /// Deleted id was never known to the document
    DeleteDoesNotExist,
    /// Same id both updated and deleted
    DeleteUpdateConflict,
    /// Deleted id still listed under root
    DeleteRootNodeConflict,
    /// Deleted id still referenced by a surviving parent, or leaves children behind
    DeleteParentNodeConflict,
    /// Child of a newly inserted parent does not resolve
    InsertChildDoesNotExist,
    /// Child of a newly inserted parent is being deleted
    InsertChildDeleteConflict,
    /// Child of an existing parent does not resolve
    UpdateChildDoesNotExist,
    /// Child of an existing parent is being deleted
    UpdateChildDeleteConflict,
    /// Only one of `noteHtml`/`noteText` supplied
    NoteHtmlOrTextMissing,
    /// Unknown document, or not owned by the caller
    DocumentDoesNotExist,
    /// Updated id (or child-list owner) does not exist
    UpdateDoesNotExist,
    /// Resulting adjacency contains a cycle
    CycleDetected,
    /// Resulting adjacency lists a node under two parents
    MultipleParents,
    /// Resulting adjacency leaves a node unreachable from root
    OrphanedNode,
}

impl SyncErrorKind {
    pub const ALL: [SyncErrorKind; 16] = [
        Self::RootNodeEmpty,
        Self::RootNodeMissing,
        Self::DeleteDoesNotExist,
        Self::DeleteUpdateConflict,
        Self::DeleteRootNodeConflict,
        Self::DeleteParentNodeConflict,
        Self::InsertChildDoesNotExist,
        Self::InsertChildDeleteConflict,
        Self::UpdateChildDoesNotExist,
        Self::UpdateChildDeleteConflict,
        Self::NoteHtmlOrTextMissing,
        Self::DocumentDoesNotExist,
        Self::UpdateDoesNotExist,
        Self::CycleDetected,
        Self::MultipleParents,
        Self::OrphanedNode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RootNodeEmpty => "RootNodeEmpty",
            Self::RootNodeMissing => "RootNodeMissing",
            Self::DeleteDoesNotExist => "DeleteDoesNotExist",
            Self::DeleteUpdateConflict => "DeleteUpdateConflict",
            Self::DeleteRootNodeConflict => "DeleteRootNodeConflict",
            Self::DeleteParentNodeConflict => "DeleteParentNodeConflict",
            Self::InsertChildDoesNotExist => "InsertChildDoesNotExist",
            Self::InsertChildDeleteConflict => "InsertChildDeleteConflict",
            Self::UpdateChildDoesNotExist => "UpdateChildDoesNotExist",
            Self::UpdateChildDeleteConflict => "UpdateChildDeleteConflict",
            Self::NoteHtmlOrTextMissing => "NoteHtmlOrTextMissing",
            Self::DocumentDoesNotExist => "DocumentDoesNotExist",
            Self::UpdateDoesNotExist => "UpdateDoesNotExist",
            Self::CycleDetected => "CycleDetected",
            Self::MultipleParents => "MultipleParents",
            Self::OrphanedNode => "OrphanedNode",
        }
    }

    /// Kinds that describe a clash between the batch and persisted state
    /// rather than a malformed request
    pub fn is_conflict(&self) -> bool {
        !matches!(self, Self::DocumentDoesNotExist)
    }
}

impl FromStr for SyncErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Invalid sync error kind: {}", s))
    }
}

impl std::fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a client save
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Server refused the batch; nothing was applied
    #[error("Batch rejected: {0}")]
    Rejected(SyncErrorKind),

    /// Request never produced a server answer (network, timeout)
    #[error("Transport failed: {0}")]
    Transport(String),

    /// Server answered with a failure outside the conflict taxonomy
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The client was detached while the request was in flight
    #[error("Sync client detached")]
    Detached,

    /// The shared store lock was poisoned by a panicking editor
    #[error("Local outline state unavailable")]
    LocalStateUnavailable,
}

impl SyncError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Whether sending the same changes again may succeed
    ///
    /// Rejections are deterministic for the same batch against the same
    /// server state, so they are never retried automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::Detached | Self::LocalStateUnavailable => false,
        }
    }
}
