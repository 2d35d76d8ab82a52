//! Batched sync: wire contract, client and transport
//!
//! The client side of reconciliation. A [`SyncClient`] turns the pending
//! changes of an outline into one [`SyncBatch`](wire::SyncBatch) and ships it
//! through a [`SyncTransport`]; the server applies it atomically or rejects
//! it with a [`SyncErrorKind`].

mod client;
mod error;
mod transport;
pub mod wire;

pub use client::{FocusMemory, SaveOutcome, SyncClient};
pub use error::{SyncError, SyncErrorKind};
pub use transport::{HttpTransport, SyncTransport};
pub use wire::{
    CreateDocumentResponse, Mutations, NodePayload, PersistedTree, SyncBatch, SyncErrorResponse,
    SyncRequest, USER_HEADER,
};
