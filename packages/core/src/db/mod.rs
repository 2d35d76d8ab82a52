//! Database Layer
//!
//! Server-side persistence of outline documents using libsql (SQLite):
//!
//! - Database initialization and connection management
//! - Node rows, per-parent child lists and delete tombstones
//! - Transaction primitives used by the apply service
//!
//! Conflict detection lives in the service layer; this module only reads and
//! writes rows.

mod database;
mod error;

pub use database::{ChildListRow, DatabaseService, DbNodeParams, DocumentRow};
pub use error::DatabaseError;
