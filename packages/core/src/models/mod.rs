//! Data Models
//!
//! This module contains the core data structures shared by the client tree
//! store and the server:
//!
//! - `OutlineNode` - A single outline entry (todo item)
//! - `NodeStatus` - Active / completed / cancelled
//! - `Note` - Rich note with html and plain-text projections

mod node;

pub use node::{NodeStatus, Note, OutlineNode};
