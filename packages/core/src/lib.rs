//! Outline Core
//!
//! The outline-tree engine behind a notes/todo editor: a client-held
//! hierarchical document that is edited interactively, tracks exactly what
//! changed, and reconciles that change set with a server copy in atomic
//! batches under strict structural invariants.
//!
//! # Architecture
//!
//! - **Plain client store**: Node Table + Adjacency Map + Mutation Tracker,
//!   no UI framework dependency, observer hook for rendering
//! - **Batched sync**: one request carries every pending change; at most one
//!   request per document is in flight
//! - **All-or-nothing apply**: the server validates a batch against a fixed
//!   conflict taxonomy and writes it in one libsql transaction
//!
//! # Modules
//!
//! - [`models`] - Node data structures
//! - [`tree`] - Client tree store, editor operations, navigator, tracker
//! - [`sync`] - Wire contract, sync client and transports
//! - [`db`] - Database layer with libsql integration
//! - [`services`] - Batch validation and the transactional apply service
//! - [`http`] - axum endpoints of the sync server
//! - [`config`] - Server and client configuration

pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod services;
pub mod sync;
pub mod tree;

// Re-export commonly used types
pub use config::{ServerConfig, SyncConfig};
pub use db::{DatabaseError, DatabaseService};
pub use models::*;
pub use services::{ApplyError, ApplyService};
pub use sync::{SaveOutcome, SyncClient, SyncError, SyncErrorKind};
pub use tree::{OutlineStore, SharedOutline, TreeEditError, ROOT_ID};
