//! Outline Store Events
//!
//! Change notifications emitted by [`OutlineStore`](super::OutlineStore)
//! whenever the Node Table or Adjacency Map changes. They follow the observer
//! pattern so a rendering layer (or the idle-save timer) can subscribe
//! without coupling to the store internals.
//!
//! # Architecture
//!
//! Events go out on a tokio broadcast channel, so any number of subscribers
//! can listen. Sending never blocks the editing thread; a subscriber that
//! falls behind sees `RecvError::Lagged` and should re-read the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the outline store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutlineEvent {
    /// A node was added under `parent_id`
    #[serde(rename = "node:inserted", rename_all = "camelCase")]
    NodeInserted { id: String, parent_id: String },

    /// Content, note, status or collapse state of a node changed
    #[serde(rename = "node:updated")]
    NodeUpdated { id: String },

    /// A node and its subtree were removed
    #[serde(rename = "nodes:deleted")]
    NodesDeleted { ids: Vec<String> },

    /// A parent's ordered child list changed
    #[serde(rename = "children:changed", rename_all = "camelCase")]
    ChildrenChanged { parent_id: String },

    /// A batch was confirmed by the server
    #[serde(rename = "sync:completed")]
    Synced { at: DateTime<Utc> },
}

impl OutlineEvent {
    /// String form of the event type, used in logs
    pub fn event_type(&self) -> &str {
        match self {
            OutlineEvent::NodeInserted { .. } => "node:inserted",
            OutlineEvent::NodeUpdated { .. } => "node:updated",
            OutlineEvent::NodesDeleted { .. } => "nodes:deleted",
            OutlineEvent::ChildrenChanged { .. } => "children:changed",
            OutlineEvent::Synced { .. } => "sync:completed",
        }
    }

    /// True for events caused by a local edit (everything but `Synced`)
    pub fn is_edit(&self) -> bool {
        !matches!(self, OutlineEvent::Synced { .. })
    }
}
