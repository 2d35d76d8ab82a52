//! Tree Editor Error Types
//!
//! Local refusals raised synchronously by the tree editor. None of these ever
//! reach the network layer: an edit that would break the tree is rejected
//! before it touches the Node Table, the Adjacency Map or the tracker.

use thiserror::Error;

/// Errors from tree store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeEditError {
    /// Node id is not present in the Node Table
    #[error("Node not found: {id}")]
    NodeNotFound { id: String },

    /// Parent id is neither the root nor an existing node
    #[error("Parent node not found: {parent_id}")]
    ParentNotFound { parent_id: String },

    /// Insert anchor is not a child of the requested parent
    #[error("Node {anchor_id} is not a child of {parent_id}")]
    AnchorNotInParent {
        anchor_id: String,
        parent_id: String,
    },

    /// Node id already exists in the document
    #[error("Node already exists: {id}")]
    DuplicateNode { id: String },

    /// The root list must always keep at least one node
    #[error("Cannot delete the last top-level node")]
    LastRootNode,

    /// Loaded or edited tree breaks a structural invariant
    #[error("Tree invariant violated: {0}")]
    InvariantViolation(String),
}

impl TreeEditError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NodeNotFound { id: id.into() }
    }

    pub fn parent_not_found(parent_id: impl Into<String>) -> Self {
        Self::ParentNotFound {
            parent_id: parent_id.into(),
        }
    }

    pub fn anchor_not_in_parent(anchor_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self::AnchorNotInParent {
            anchor_id: anchor_id.into(),
            parent_id: parent_id.into(),
        }
    }

    pub fn duplicate_node(id: impl Into<String>) -> Self {
        Self::DuplicateNode { id: id.into() }
    }

    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
