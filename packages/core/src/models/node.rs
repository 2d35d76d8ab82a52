//! Outline Node Data Structures
//!
//! This module defines the `OutlineNode` struct held in the client Node Table and
//! persisted by the server, plus its status and rich-note types.
//!
//! # Architecture
//!
//! - **Identity**: Opaque string ids (UUID v4 generated client side, never reused)
//! - **Content**: Plain/rich text blob in `content`, optional secondary `note`
//! - **Status**: Exactly one of active, completed or cancelled
//! - **Structure**: Nodes never store their parent; tree shape lives in the
//!   adjacency map so a node can never have two parents
//!
//! # Examples
//!
//! ```rust
//! use outline_core::models::{NodeStatus, OutlineNode};
//!
//! let mut node = OutlineNode::new();
//! node.content = "Buy milk".to_string();
//! assert_eq!(node.status, NodeStatus::Active);
//!
//! node.toggle_completed();
//! assert_eq!(node.status, NodeStatus::Completed);
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Completion status of an outline node
///
/// Completed and cancelled are mutually exclusive; toggling one off returns
/// the node to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Open item (default)
    #[default]
    Active,
    /// Item done
    Completed,
    /// Item dropped, will not be done
    Cancelled,
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid node status: {}", s)),
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Rich-text note attached to a node
///
/// Both projections always travel together: the html is what the editor
/// renders, the text is what search and previews use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub html: String,
    pub text: String,
}

impl Note {
    pub fn new(html: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            text: text.into(),
        }
    }
}

/// A single outline entry (todo item)
///
/// # Fields
///
/// - `id`: Unique identifier, never reused after deletion
/// - `content`: Primary text of the entry
/// - `note`: Optional rich note (html + plain text projections)
/// - `status`: Active, completed or cancelled
/// - `collapsed`: Whether the node's children are hidden in the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineNode {
    pub id: String,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<Note>,

    #[serde(default)]
    pub status: NodeStatus,

    #[serde(default)]
    pub collapsed: bool,
}

impl OutlineNode {
    /// Create an empty active node with a fresh UUID
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create an empty active node with a caller-chosen id
    ///
    /// Used when loading persisted nodes and in tests that need stable ids.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: String::new(),
            note: None,
            status: NodeStatus::Active,
            collapsed: false,
        }
    }

    /// Builder-style content setter
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == NodeStatus::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == NodeStatus::Cancelled
    }

    /// Flip the completed bit, clearing cancelled
    pub fn toggle_completed(&mut self) {
        self.status = match self.status {
            NodeStatus::Completed => NodeStatus::Active,
            _ => NodeStatus::Completed,
        };
    }

    /// Flip the cancelled bit, clearing completed
    pub fn toggle_cancelled(&mut self) {
        self.status = match self.status {
            NodeStatus::Cancelled => NodeStatus::Active,
            _ => NodeStatus::Cancelled,
        };
    }
}

impl Default for OutlineNode {
    fn default() -> Self {
        Self::new()
    }
}
