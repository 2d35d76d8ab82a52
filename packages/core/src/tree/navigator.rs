//! Navigator (closest-node lookup)
//!
//! Treats the document as the flattened, collapse-aware, depth-first
//! sequence of visible nodes (children of a collapsed node are skipped) and
//! answers "which node is above/below this one". Used for arrow-key focus
//! movement and for picking the node that receives focus after a delete or a
//! completed save.
//!
//! [`closest`] walks siblings, ancestors and descendants directly instead of
//! materialising the sequence, so a lookup costs O(depth + siblings).
//! [`flatten_visible`] builds the full sequence for callers that need it.

use crate::tree::adjacency::ROOT_ID;
use crate::tree::store::OutlineStore;
use serde::{Deserialize, Serialize};

/// Direction for focus movement and sibling swaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// Flattened, collapse-aware, depth-first sequence of visible node ids
pub fn flatten_visible(store: &OutlineStore) -> Vec<String> {
    let mut out = Vec::with_capacity(store.len());
    let mut stack: Vec<&str> = store
        .root_children()
        .iter()
        .rev()
        .map(String::as_str)
        .collect();

    while let Some(id) = stack.pop() {
        out.push(id.to_string());
        if expanded(store, id) {
            stack.extend(store.children(id).iter().rev().map(String::as_str));
        }
    }
    out
}

/// Predecessor (`Up`) or successor (`Down`) of `id` among visible nodes
///
/// Returns `None` at either end of the sequence, and for ids that are
/// unknown or hidden under a collapsed ancestor.
pub fn closest(store: &OutlineStore, id: &str, direction: Direction) -> Option<String> {
    if !is_visible(store, id) {
        return None;
    }

    match direction {
        Direction::Up => above(store, id),
        Direction::Down => {
            if expanded(store, id) {
                if let Some(first) = store.children(id).first() {
                    return Some(first.clone());
                }
            }
            next_outside_subtree(store, id)
        }
    }
}

/// First visible node after the whole subtree of `id`
///
/// This is the successor of `id` with its descendants skipped, used to pick a
/// focus target below a node that is about to be deleted.
pub fn next_outside_subtree(store: &OutlineStore, id: &str) -> Option<String> {
    let mut current = id;
    loop {
        let (parent, index) = store.adjacency().position(current)?;
        if let Some(next) = store.children(parent).get(index + 1) {
            return Some(next.clone());
        }
        if parent == ROOT_ID {
            return None;
        }
        current = parent;
    }
}

/// Focus target for the delete of `id`, computed before the delete
///
/// The visible node above, else the first one after the subtree. A node
/// hidden under a collapsed ancestor hands focus to its nearest visible
/// ancestor instead.
pub fn focus_after_delete(store: &OutlineStore, id: &str) -> Option<String> {
    if !store.contains(id) {
        return None;
    }
    if !is_visible(store, id) {
        return nearest_visible_ancestor(store, id);
    }
    closest(store, id, Direction::Up).or_else(|| next_outside_subtree(store, id))
}

fn nearest_visible_ancestor(store: &OutlineStore, id: &str) -> Option<String> {
    let mut current = store.parent_of(id);
    while let Some(parent) = current {
        if parent == ROOT_ID {
            return None;
        }
        if is_visible(store, parent) {
            return Some(parent.to_string());
        }
        current = store.parent_of(parent);
    }
    None
}

/// Focus target after a save or a reload
///
/// Keeps `previous` when it still exists, otherwise falls back to the first
/// node of the visible sequence.
pub fn resolve_focus(store: &OutlineStore, previous: Option<&str>) -> Option<String> {
    match previous {
        Some(id) if store.contains(id) => Some(id.to_string()),
        _ => store.root_children().first().cloned(),
    }
}

fn above(store: &OutlineStore, id: &str) -> Option<String> {
    let (parent, index) = store.adjacency().position(id)?;
    if index == 0 {
        return (parent != ROOT_ID).then(|| parent.to_string());
    }

    // Deepest last visible descendant of the previous sibling
    let mut current = store.children(parent)[index - 1].as_str();
    while expanded(store, current) {
        match store.children(current).last() {
            Some(last) => current = last.as_str(),
            None => break,
        }
    }
    Some(current.to_string())
}

fn expanded(store: &OutlineStore, id: &str) -> bool {
    store.node(id).map(|n| !n.collapsed).unwrap_or(false)
}

fn is_visible(store: &OutlineStore, id: &str) -> bool {
    if !store.contains(id) {
        return false;
    }
    let mut current = store.parent_of(id);
    while let Some(parent) = current {
        if parent == ROOT_ID {
            return true;
        }
        if !expanded(store, parent) {
            return false;
        }
        current = store.parent_of(parent);
    }
    false
}
