//! Mutation Tracker
//!
//! Records, per node id, the single pending operation since the last
//! successful sync, plus the set of parents whose child lists changed.
//!
//! # Coalescing
//!
//! - `insert` followed by edits stays `insert`
//! - edits to an existing node become/stay `update`
//! - `delete` wins; an inserted-then-deleted node leaves no entry at all,
//!   unless its insert was already sent (see below)
//!
//! # In-flight batches
//!
//! A sync request takes the pending set into a separate in-flight slot
//! ([`MutationTracker::begin_flight`]). Edits made while the request is
//! outstanding accumulate in a fresh pending set. On success the slot is
//! dropped; on failure it is merged back under the same coalescing rules so
//! the next attempt resends everything that did not land.
//!
//! A failed request may still have been applied (the response was lost). The
//! tracker keeps the payload of every insert such a request carried. If that
//! node is deleted before a later sync confirms it, the delete is kept and
//! the payload is resent with it as an insert, so the server accepts the
//! delete whether or not the first insert landed.

use crate::sync::wire::NodePayload;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Pending operation kind for one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

/// Pending node ids grouped by operation, sorted for deterministic batches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingMutations {
    pub insert: BTreeSet<String>,
    pub update: BTreeSet<String>,
    pub delete: BTreeSet<String>,
}

impl PendingMutations {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    pub fn len(&self) -> usize {
        self.insert.len() + self.update.len() + self.delete.len()
    }

    fn from_entries(entries: &HashMap<String, MutationKind>) -> Self {
        let mut out = Self::default();
        for (id, kind) in entries {
            let set = match kind {
                MutationKind::Insert => &mut out.insert,
                MutationKind::Update => &mut out.update,
                MutationKind::Delete => &mut out.delete,
            };
            set.insert(id.clone());
        }
        out
    }
}

/// Snapshot handed to the sync client when a request starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlightSnapshot {
    pub mutations: PendingMutations,
    pub touched_parents: BTreeSet<String>,
    /// Inserts of deleted nodes that an earlier failed request may have applied
    pub unconfirmed_inserts: BTreeMap<String, NodePayload>,
}

#[derive(Debug, Default)]
struct Flight {
    entries: HashMap<String, MutationKind>,
    touched: BTreeSet<String>,
    sent_inserts: BTreeMap<String, NodePayload>,
}

/// Dirty-state bookkeeping for one outline document
#[derive(Debug, Default)]
pub struct MutationTracker {
    entries: HashMap<String, MutationKind>,
    touched: BTreeSet<String>,
    /// Inserts that went out in a request that failed
    unconfirmed: BTreeMap<String, NodePayload>,
    in_flight: Option<Flight>,
}

impl MutationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_inserted(&mut self, id: &str) {
        self.entries.insert(id.to_string(), MutationKind::Insert);
    }

    pub fn mark_updated(&mut self, id: &str) {
        match self.entries.get(id) {
            Some(MutationKind::Insert) | Some(MutationKind::Delete) => {}
            _ => {
                self.entries.insert(id.to_string(), MutationKind::Update);
            }
        }
    }

    /// Mark `id` and its whole subtree deleted
    ///
    /// Ids still pending insert are dropped instead, unless a failed request
    /// already carried that insert.
    pub fn mark_deleted(&mut self, id: &str, subtree_ids: &[String]) {
        for target in std::iter::once(id).chain(subtree_ids.iter().map(String::as_str)) {
            match self.entries.get(target) {
                Some(MutationKind::Insert) if !self.unconfirmed.contains_key(target) => {
                    self.entries.remove(target);
                }
                _ => {
                    self.entries
                        .insert(target.to_string(), MutationKind::Delete);
                }
            }
            self.touched.remove(target);
        }
    }

    /// Record that `parent_id`'s child list changed
    pub fn touch_parent(&mut self, parent_id: &str) {
        self.touched.insert(parent_id.to_string());
    }

    /// Pending operation for one id, ignoring the in-flight batch
    pub fn kind_of(&self, id: &str) -> Option<MutationKind> {
        self.entries.get(id).copied()
    }

    pub fn pending(&self) -> PendingMutations {
        PendingMutations::from_entries(&self.entries)
    }

    pub fn touched_parents(&self) -> &BTreeSet<String> {
        &self.touched
    }

    /// True when nothing is waiting to be sent
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.touched.is_empty()
    }

    pub fn has_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Deleted ids whose insert must be resent next to their delete
    pub fn unconfirmed_inserts(&self) -> impl Iterator<Item = &str> {
        self.unconfirmed
            .keys()
            .filter(|id| self.entries.get(id.as_str()) == Some(&MutationKind::Delete))
            .map(String::as_str)
    }

    /// Move the pending set into the in-flight slot
    ///
    /// Returns `None` when a batch is already in flight or nothing is pending.
    pub fn begin_flight(&mut self) -> Option<FlightSnapshot> {
        if self.in_flight.is_some() || self.is_empty() {
            return None;
        }

        let flight = Flight {
            entries: std::mem::take(&mut self.entries),
            touched: std::mem::take(&mut self.touched),
            sent_inserts: BTreeMap::new(),
        };
        // Surviving nodes are sent from the node table as plain inserts
        let mut unconfirmed_inserts = std::mem::take(&mut self.unconfirmed);
        unconfirmed_inserts
            .retain(|id, _| flight.entries.get(id) == Some(&MutationKind::Delete));
        let snapshot = FlightSnapshot {
            mutations: PendingMutations::from_entries(&flight.entries),
            touched_parents: flight.touched.clone(),
            unconfirmed_inserts,
        };
        self.in_flight = Some(flight);
        Some(snapshot)
    }

    /// Remember the insert payloads that went out with the in-flight batch
    pub fn record_sent_inserts(&mut self, inserts: &BTreeMap<String, NodePayload>) {
        if let Some(flight) = self.in_flight.as_mut() {
            flight.sent_inserts = inserts.clone();
        }
    }

    /// The in-flight batch was applied by the server
    pub fn complete_flight(&mut self) {
        self.in_flight = None;
    }

    /// The in-flight batch failed; fold it back into the pending set
    pub fn abort_flight(&mut self) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };

        for (id, sent) in flight.entries {
            let merged = match (sent, self.entries.get(&id).copied()) {
                // The insert may have landed; the delete has to go out either way
                (MutationKind::Insert, Some(MutationKind::Delete)) => MutationKind::Delete,
                (MutationKind::Insert, _) => MutationKind::Insert,
                (MutationKind::Update, Some(later)) => later,
                (MutationKind::Update, None) => MutationKind::Update,
                (MutationKind::Delete, _) => MutationKind::Delete,
            };
            self.entries.insert(id, merged);
        }
        self.touched.extend(flight.touched);

        for (id, payload) in flight.sent_inserts {
            if self.entries.contains_key(&id) {
                self.unconfirmed.insert(id, payload);
            }
        }
    }
}
