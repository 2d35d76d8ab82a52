//! Sync Wire Contract
//!
//! Request/response types for the batched sync operation. The JSON shape is
//! stable regardless of transport:
//!
//! ```text
//! {
//!   "documentId": "...",
//!   "children": { "root": ["a", "b"], "a": ["c"] },
//!   "mutations": {
//!     "insert": { "c": { "content": "", "status": "active", "collapsed": false } },
//!     "update": { "a": { "content": "Groceries", "noteHtml": "<p>x</p>", "noteText": "x", ... } },
//!     "delete": ["d"]
//!   }
//! }
//! ```
//!
//! Success is an empty 2xx response. Failure carries `{ "errorKind": ... }`
//! and has no partial effects.

use crate::models::{NodeStatus, Note, OutlineNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Header carrying the authenticated caller id
pub const USER_HEADER: &str = "x-outline-user";

/// Node fields as they travel on the wire
///
/// The note is split into its two projections; the server rejects a payload
/// that carries only one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePayload {
    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_html: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_text: Option<String>,

    #[serde(default)]
    pub status: NodeStatus,

    #[serde(default)]
    pub collapsed: bool,
}

impl NodePayload {
    /// True when exactly one note projection is present
    pub fn has_partial_note(&self) -> bool {
        self.note_html.is_some() != self.note_text.is_some()
    }

    /// Rebuild the node this payload describes
    pub fn into_node(self, id: impl Into<String>) -> OutlineNode {
        let note = match (self.note_html, self.note_text) {
            (Some(html), Some(text)) => Some(Note { html, text }),
            _ => None,
        };
        OutlineNode {
            id: id.into(),
            content: self.content,
            note,
            status: self.status,
            collapsed: self.collapsed,
        }
    }
}

impl From<&OutlineNode> for NodePayload {
    fn from(node: &OutlineNode) -> Self {
        Self {
            content: node.content.clone(),
            note_html: node.note.as_ref().map(|n| n.html.clone()),
            note_text: node.note.as_ref().map(|n| n.text.clone()),
            status: node.status,
            collapsed: node.collapsed,
        }
    }
}

/// Content mutations of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutations {
    #[serde(default)]
    pub insert: BTreeMap<String, NodePayload>,

    #[serde(default)]
    pub update: BTreeMap<String, NodePayload>,

    #[serde(default)]
    pub delete: Vec<String>,
}

impl Mutations {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insert.len() + self.update.len() + self.delete.len()
    }
}

/// One bundle of structural and content changes, applied atomically
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// Root list (always) plus every parent list touched since the last sync
    #[serde(default)]
    pub children: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub mutations: Mutations,
}

impl SyncBatch {
    /// Submitted root list, if any
    pub fn root_children(&self) -> Option<&[String]> {
        self.children
            .get(crate::tree::ROOT_ID)
            .map(Vec::as_slice)
    }
}

/// Sync request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub document_id: String,

    #[serde(flatten)]
    pub batch: SyncBatch,
}

impl SyncRequest {
    pub fn new(document_id: impl Into<String>, batch: SyncBatch) -> Self {
        Self {
            document_id: document_id.into(),
            batch,
        }
    }
}

/// Failure body returned by the sync endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorResponse {
    /// One of the `SyncErrorKind` names, or `Internal`/`InvalidRequest`
    pub error_kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body returned when a document is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentResponse {
    pub document_id: String,
}

/// Full persisted copy of a document, as served to a client opening it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTree {
    pub nodes: Vec<OutlineNode>,
    pub children: BTreeMap<String, Vec<String>>,
}
