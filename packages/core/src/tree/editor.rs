//! Tree Editor
//!
//! Operations that mutate the Node Table and the Adjacency Map together and
//! record what changed in the Mutation Tracker.
//!
//! Structural operations (add, delete, nest, unnest, move) only ever move an
//! id between two valid positions, so the tree invariants hold by
//! construction. Pure re-arrangements carry no per-node mutation flag: the
//! touched parent lists travel in the batch's `children` map instead.

use crate::models::{Note, OutlineNode};
use crate::tree::adjacency::ROOT_ID;
use crate::tree::error::TreeEditError;
use crate::tree::events::OutlineEvent;
use crate::tree::navigator::{self, Direction};
use crate::tree::store::OutlineStore;

impl OutlineStore {
    /// Add an empty node under `parent_id`, right after `after_id` (or last)
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` when `parent_id` is neither root nor a node
    /// - `AnchorNotInParent` when `after_id` is not a child of `parent_id`
    pub fn add(&mut self, parent_id: &str, after_id: Option<&str>) -> Result<String, TreeEditError> {
        self.insert_node(parent_id, after_id, OutlineNode::new())
    }

    /// Add a pre-built node (e.g. pasted content) under `parent_id`
    pub fn insert_node(
        &mut self,
        parent_id: &str,
        after_id: Option<&str>,
        node: OutlineNode,
    ) -> Result<String, TreeEditError> {
        if parent_id != ROOT_ID && !self.nodes.contains_key(parent_id) {
            return Err(TreeEditError::parent_not_found(parent_id));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(TreeEditError::duplicate_node(&node.id));
        }

        let siblings = self.adjacency.children(parent_id);
        let index = match after_id {
            Some(anchor) => {
                let position = siblings
                    .iter()
                    .position(|c| c == anchor)
                    .ok_or_else(|| TreeEditError::anchor_not_in_parent(anchor, parent_id))?;
                position + 1
            }
            None => siblings.len(),
        };

        let id = node.id.clone();
        self.adjacency.insert_child(parent_id, index, &id);
        self.nodes.insert(id.clone(), node);
        self.tracker.mark_inserted(&id);
        self.tracker.touch_parent(parent_id);

        tracing::debug!("Added node '{}' under '{}' at {}", id, parent_id, index);
        self.emit(OutlineEvent::NodeInserted {
            id: id.clone(),
            parent_id: parent_id.to_string(),
        });
        self.emit(OutlineEvent::ChildrenChanged {
            parent_id: parent_id.to_string(),
        });
        Ok(id)
    }

    /// Delete `id` together with its whole subtree
    ///
    /// Returns the node that should receive focus next: the visible node
    /// above, or the one below the deleted subtree when `id` was first.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` for an unknown id
    /// - `LastRootNode` when `id` is the only top-level node
    pub fn delete(&mut self, id: &str) -> Result<Option<String>, TreeEditError> {
        let (parent_id, _) = self
            .adjacency
            .position(id)
            .map(|(parent, index)| (parent.to_string(), index))
            .ok_or_else(|| TreeEditError::node_not_found(id))?;

        if parent_id == ROOT_ID && self.root_children().len() == 1 {
            return Err(TreeEditError::LastRootNode);
        }

        let focus = navigator::focus_after_delete(self, id);

        let descendants = self.adjacency.descendants(id);
        self.adjacency.remove_child(id);
        for removed in std::iter::once(id).chain(descendants.iter().map(String::as_str)) {
            self.adjacency.remove_list(removed);
            self.nodes.remove(removed);
        }
        self.tracker.mark_deleted(id, &descendants);
        self.tracker.touch_parent(&parent_id);

        tracing::debug!(
            "Deleted node '{}' with {} descendant(s)",
            id,
            descendants.len()
        );

        let mut ids = Vec::with_capacity(descendants.len() + 1);
        ids.push(id.to_string());
        ids.extend(descendants);
        self.emit(OutlineEvent::NodesDeleted { ids });
        self.emit(OutlineEvent::ChildrenChanged { parent_id });
        Ok(focus)
    }

    /// Indent: make `id` the last child of its preceding sibling
    ///
    /// Returns `false` (no-op) when `id` is the first child of its parent.
    pub fn nest(&mut self, id: &str) -> Result<bool, TreeEditError> {
        let (parent_id, index) = self.locate(id)?;
        if index == 0 {
            return Ok(false);
        }

        let new_parent = self.adjacency.children(&parent_id)[index - 1].clone();
        self.adjacency.remove_child(id);
        self.adjacency.push_child(&new_parent, id);
        self.record_move(&parent_id, &new_parent);
        Ok(true)
    }

    /// Outdent: make `id` the next sibling of its parent, one level up
    ///
    /// Returns `false` (no-op) when `id` is already top-level.
    pub fn unnest(&mut self, id: &str) -> Result<bool, TreeEditError> {
        let (parent_id, _) = self.locate(id)?;
        if parent_id == ROOT_ID {
            return Ok(false);
        }

        let (grandparent_id, parent_index) = self
            .adjacency
            .position(&parent_id)
            .map(|(grandparent, index)| (grandparent.to_string(), index))
            .ok_or_else(|| TreeEditError::invariant_violation(format!("{} is detached", parent_id)))?;

        self.adjacency.remove_child(id);
        self.adjacency
            .insert_child(&grandparent_id, parent_index + 1, id);
        self.record_move(&parent_id, &grandparent_id);
        Ok(true)
    }

    /// Swap `id` with its previous (`Up`) or next (`Down`) sibling
    ///
    /// Returns `false` (no-op) at the list boundary.
    pub fn move_node(&mut self, id: &str, direction: Direction) -> Result<bool, TreeEditError> {
        let (parent_id, index) = self.locate(id)?;
        let len = self.adjacency.children(&parent_id).len();

        let target = match direction {
            Direction::Up if index > 0 => index - 1,
            Direction::Down if index + 1 < len => index + 1,
            _ => return Ok(false),
        };

        self.adjacency.swap(&parent_id, index, target);
        self.tracker.touch_parent(&parent_id);
        self.emit(OutlineEvent::ChildrenChanged { parent_id });
        Ok(true)
    }

    pub fn toggle_collapsed(&mut self, id: &str) -> Result<(), TreeEditError> {
        self.edit_node(id, |node| node.collapsed = !node.collapsed)
    }

    /// Flip completed; clears cancelled
    pub fn toggle_completed(&mut self, id: &str) -> Result<(), TreeEditError> {
        self.edit_node(id, OutlineNode::toggle_completed)
    }

    /// Flip cancelled; clears completed
    pub fn toggle_cancelled(&mut self, id: &str) -> Result<(), TreeEditError> {
        self.edit_node(id, OutlineNode::toggle_cancelled)
    }

    pub fn update_content(&mut self, id: &str, text: impl Into<String>) -> Result<(), TreeEditError> {
        let text = text.into();
        self.edit_node(id, move |node| node.content = text)
    }

    /// Replace the note; both projections are always stored together
    pub fn update_note(
        &mut self,
        id: &str,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), TreeEditError> {
        let note = Note::new(html, text);
        self.edit_node(id, move |node| node.note = Some(note))
    }

    pub fn clear_note(&mut self, id: &str) -> Result<(), TreeEditError> {
        self.edit_node(id, |node| node.note = None)
    }

    //
    // HELPERS
    //

    fn locate(&self, id: &str) -> Result<(String, usize), TreeEditError> {
        self.adjacency
            .position(id)
            .map(|(parent, index)| (parent.to_string(), index))
            .ok_or_else(|| TreeEditError::node_not_found(id))
    }

    fn record_move(&mut self, from_parent: &str, to_parent: &str) {
        self.tracker.touch_parent(from_parent);
        self.tracker.touch_parent(to_parent);
        self.emit(OutlineEvent::ChildrenChanged {
            parent_id: from_parent.to_string(),
        });
        self.emit(OutlineEvent::ChildrenChanged {
            parent_id: to_parent.to_string(),
        });
    }

    fn edit_node<F>(&mut self, id: &str, edit: F) -> Result<(), TreeEditError>
    where
        F: FnOnce(&mut OutlineNode),
    {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeEditError::node_not_found(id))?;
        edit(node);
        self.tracker.mark_updated(id);
        self.emit(OutlineEvent::NodeUpdated { id: id.to_string() });
        Ok(())
    }
}
