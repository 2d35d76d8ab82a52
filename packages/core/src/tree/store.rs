//! Outline Store
//!
//! In-memory client copy of one outline document: the Node Table, the
//! Adjacency Map and the Mutation Tracker, kept consistent by the tree editor
//! operations in [`editor`](super::editor).
//!
//! # Architecture
//!
//! - **Plain store**: no UI framework dependency; explicit read accessors
//! - **Observer hook**: [`OutlineStore::subscribe`] hands out broadcast
//!   receivers of [`OutlineEvent`]
//! - **Single owner**: all operations are synchronous and run to completion.
//!   Async callers share it as [`SharedOutline`] and never hold the lock
//!   across an await point
//!
//! # Examples
//!
//! ```rust
//! use outline_core::tree::{OutlineStore, ROOT_ID};
//!
//! let mut store = OutlineStore::new();
//! let first = store.root_children()[0].clone();
//! let second = store.add(ROOT_ID, Some(&first)).unwrap();
//! store.nest(&second).unwrap();
//!
//! assert_eq!(store.children(&first), &[second]);
//! assert!(store.check_invariants().is_ok());
//! ```

use crate::models::OutlineNode;
use crate::sync::wire::{Mutations, NodePayload, PersistedTree, SyncBatch};
use crate::tree::adjacency::{AdjacencyMap, ROOT_ID};
use crate::tree::error::TreeEditError;
use crate::tree::events::OutlineEvent;
use crate::tree::tracker::{MutationTracker, PendingMutations};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Broadcast buffer for store events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Store shared between the editing side and the sync client
pub type SharedOutline = Arc<Mutex<OutlineStore>>;

/// Client-side tree store for one outline document
#[derive(Debug)]
pub struct OutlineStore {
    pub(crate) nodes: HashMap<String, OutlineNode>,
    pub(crate) adjacency: AdjacencyMap,
    pub(crate) tracker: MutationTracker,
    events: broadcast::Sender<OutlineEvent>,
}

impl OutlineStore {
    /// Create a fresh document holding a single empty top-level node
    ///
    /// The node is pending insert, so the first sync creates it server side.
    pub fn new() -> Self {
        let mut store = Self::empty();
        let first = OutlineNode::new();
        store.tracker.mark_inserted(&first.id);
        store.tracker.touch_parent(ROOT_ID);
        store.adjacency.push_child(ROOT_ID, &first.id);
        store.nodes.insert(first.id.clone(), first);
        store
    }

    fn empty() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            nodes: HashMap::new(),
            adjacency: AdjacencyMap::new(),
            tracker: MutationTracker::new(),
            events,
        }
    }

    /// Load a persisted tree with a clean tracker
    ///
    /// An empty snapshot (a document nobody has written yet) becomes a fresh
    /// document, exactly like [`OutlineStore::new`].
    pub fn from_snapshot(
        nodes: Vec<OutlineNode>,
        children: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, TreeEditError> {
        if nodes.is_empty() && children.values().all(Vec::is_empty) {
            return Ok(Self::new());
        }

        let adjacency = AdjacencyMap::from_lists(children).map_err(|id| {
            TreeEditError::invariant_violation(format!("node {} has more than one parent", id))
        })?;

        let mut store = Self::empty();
        store.adjacency = adjacency;
        store.nodes = nodes.into_iter().map(|n| (n.id.clone(), n)).collect();
        store.check_invariants()?;
        Ok(store)
    }

    /// Load the tree served by the sync endpoint
    pub fn from_persisted(tree: PersistedTree) -> Result<Self, TreeEditError> {
        Self::from_snapshot(tree.nodes, tree.children)
    }

    //
    // READ ACCESSORS
    //

    pub fn node(&self, id: &str) -> Option<&OutlineNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &OutlineNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ordered children of `parent_id` (node id or [`ROOT_ID`])
    pub fn children(&self, parent_id: &str) -> &[String] {
        self.adjacency.children(parent_id)
    }

    pub fn root_children(&self) -> &[String] {
        self.adjacency.children(ROOT_ID)
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.adjacency.parent_of(id)
    }

    pub fn adjacency(&self) -> &AdjacencyMap {
        &self.adjacency
    }

    /// Snapshot of the pending mutation ids (excluding any in-flight batch)
    pub fn pending_mutations(&self) -> PendingMutations {
        self.tracker.pending()
    }

    /// True when there are local edits that have not been sent yet
    pub fn has_pending_changes(&self) -> bool {
        !self.tracker.is_empty()
    }

    pub fn is_syncing(&self) -> bool {
        self.tracker.has_flight()
    }

    //
    // OBSERVER HOOK
    //

    /// Subscribe to change events
    pub fn subscribe(&self) -> broadcast::Receiver<OutlineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: OutlineEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    //
    // SYNC SUPPORT
    //

    /// Start a sync: move pending work in flight and assemble the batch
    ///
    /// Returns `None` when nothing is pending or a batch is already in flight.
    pub fn begin_sync(&mut self) -> Option<SyncBatch> {
        let snapshot = self.tracker.begin_flight()?;

        let mut mutations = Mutations::default();
        for id in &snapshot.mutations.insert {
            match self.nodes.get(id) {
                Some(node) => {
                    mutations.insert.insert(id.clone(), NodePayload::from(node));
                }
                None => tracing::warn!("Pending insert for missing node '{}' skipped", id),
            }
        }
        for id in &snapshot.mutations.update {
            match self.nodes.get(id) {
                Some(node) => {
                    mutations.update.insert(id.clone(), NodePayload::from(node));
                }
                None => tracing::warn!("Pending update for missing node '{}' skipped", id),
            }
        }
        // Deleted locally, possibly persisted by a failed request; paired with their deletes
        mutations.insert.extend(snapshot.unconfirmed_inserts);
        mutations.delete = snapshot.mutations.delete.into_iter().collect();
        self.tracker.record_sent_inserts(&mutations.insert);

        let mut children = BTreeMap::new();
        children.insert(ROOT_ID.to_string(), self.root_children().to_vec());
        for parent in snapshot.touched_parents {
            // A touched parent that was deleted afterwards has no list to send
            if parent != ROOT_ID && self.nodes.contains_key(&parent) {
                let list = self.children(&parent).to_vec();
                children.insert(parent, list);
            }
        }

        Some(SyncBatch {
            children,
            mutations,
        })
    }

    /// The in-flight batch was applied by the server
    pub fn complete_sync(&mut self, at: DateTime<Utc>) {
        self.tracker.complete_flight();
        self.emit(OutlineEvent::Synced { at });
    }

    /// The in-flight batch failed; keep its changes pending
    pub fn abort_sync(&mut self) {
        self.tracker.abort_flight();
    }

    /// Describe the whole document as a single insert batch
    ///
    /// Used to seed an empty server document (export, first upload).
    pub fn full_batch(&self) -> SyncBatch {
        let insert = self
            .nodes
            .values()
            .map(|node| (node.id.clone(), NodePayload::from(node)))
            .collect();
        let mut children = self.adjacency.to_map();
        children
            .entry(ROOT_ID.to_string())
            .or_default();

        SyncBatch {
            children,
            mutations: Mutations {
                insert,
                ..Mutations::default()
            },
        }
    }

    /// Plain copy of the tree, comparable with what the server persists
    pub fn to_persisted(&self) -> PersistedTree {
        let mut nodes: Vec<OutlineNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        PersistedTree {
            nodes,
            children: self.adjacency.to_map(),
        }
    }

    //
    // INVARIANTS
    //

    /// Verify the structural invariants of the document
    ///
    /// - root list is non-empty
    /// - every node is reachable from root exactly once (no cycles, one parent)
    /// - every listed id has a Node Table entry
    pub fn check_invariants(&self) -> Result<(), TreeEditError> {
        if self.root_children().is_empty() {
            return Err(TreeEditError::invariant_violation("root list is empty"));
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(self.nodes.len());
        let mut stack: Vec<&str> = vec![ROOT_ID];
        while let Some(parent) = stack.pop() {
            for child in self.children(parent) {
                if !self.nodes.contains_key(child) {
                    return Err(TreeEditError::invariant_violation(format!(
                        "child {} of {} has no node",
                        child, parent
                    )));
                }
                if !seen.insert(child.as_str()) {
                    return Err(TreeEditError::invariant_violation(format!(
                        "node {} reached twice",
                        child
                    )));
                }
                stack.push(child.as_str());
            }
        }

        if seen.len() != self.nodes.len() {
            return Err(TreeEditError::invariant_violation(format!(
                "{} node(s) unreachable from root",
                self.nodes.len() - seen.len()
            )));
        }

        for (parent, _) in self.adjacency.lists() {
            if parent.as_str() != ROOT_ID && !self.nodes.contains_key(parent) {
                return Err(TreeEditError::invariant_violation(format!(
                    "child list owned by missing node {}",
                    parent
                )));
            }
        }

        Ok(())
    }
}

impl Default for OutlineStore {
    fn default() -> Self {
        Self::new()
    }
}
