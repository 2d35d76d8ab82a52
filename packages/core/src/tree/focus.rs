//! Focus registry
//!
//! Maps node ids to whatever handle the rendering layer uses to focus a row
//! (a widget id, a DOM ref, a channel). Handles live in a slot arena with a
//! free list and are looked up through an id index, so registering and
//! dropping rows while the outline scrolls never shifts existing slots.

use crate::tree::store::OutlineStore;
use std::collections::HashMap;

#[derive(Debug)]
pub struct FocusRegistry<H> {
    slots: Vec<Option<(String, H)>>,
    index: HashMap<String, usize>,
    free: Vec<usize>,
}

impl<H> Default for FocusRegistry<H> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
        }
    }
}

impl<H> FocusRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` for `id`, returning the handle it replaces
    pub fn register(&mut self, id: impl Into<String>, handle: H) -> Option<H> {
        let id = id.into();
        if let Some(&slot) = self.index.get(&id) {
            let entry = self.slots[slot].as_mut()?;
            return Some(std::mem::replace(&mut entry.1, handle));
        }

        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some((id.clone(), handle));
                slot
            }
            None => {
                self.slots.push(Some((id.clone(), handle)));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
        None
    }

    pub fn unregister(&mut self, id: &str) -> Option<H> {
        let slot = self.index.remove(id)?;
        let (_, handle) = self.slots[slot].take()?;
        self.free.push(slot);
        Some(handle)
    }

    pub fn get(&self, id: &str) -> Option<&H> {
        let slot = *self.index.get(id)?;
        self.slots[slot].as_ref().map(|(_, handle)| handle)
    }

    /// Drop handles whose node is gone from `store`; returns how many
    pub fn prune(&mut self, store: &OutlineStore) -> usize {
        let stale: Vec<String> = self
            .index
            .keys()
            .filter(|id| !store.contains(id))
            .cloned()
            .collect();
        for id in &stale {
            self.unregister(id);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ROOT_ID;

    #[test]
    fn test_register_replace_and_unregister() {
        let mut registry = FocusRegistry::new();
        assert_eq!(registry.register("a", 1), None);
        assert_eq!(registry.register("a", 2), Some(1));
        assert_eq!(registry.get("a"), Some(&2));

        assert_eq!(registry.unregister("a"), Some(2));
        assert!(registry.is_empty());
        assert_eq!(registry.get("a"), None);
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut registry = FocusRegistry::new();
        registry.register("a", 'a');
        registry.register("b", 'b');
        registry.unregister("a");
        registry.register("c", 'c');

        assert_eq!(registry.slots.len(), 2);
        assert_eq!(registry.get("b"), Some(&'b'));
        assert_eq!(registry.get("c"), Some(&'c'));
    }

    #[test]
    fn test_prune_drops_deleted_nodes() {
        let mut store = OutlineStore::new();
        let first = store.root_children()[0].clone();
        let second = store.add(ROOT_ID, Some(&first)).unwrap();

        let mut registry = FocusRegistry::new();
        registry.register(first.clone(), "first");
        registry.register(second.clone(), "second");

        store.delete(&second).unwrap();

        assert_eq!(registry.prune(&store), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&first), Some(&"first"));
    }
}
