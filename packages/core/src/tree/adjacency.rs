//! Adjacency Map
//!
//! Ordered parent → children index for one outline document. The synthetic
//! [`ROOT_ID`] parent holds the top-level list.
//!
//! A reverse child → parent index is kept alongside the ordered lists so that
//! position lookups (needed by every structural edit) are O(1) for the parent
//! and O(siblings) for the index. Empty lists are pruned, so a parent with no
//! children simply has no entry.

use std::collections::{BTreeMap, HashMap};

/// Synthetic parent id that holds the top-level node list
pub const ROOT_ID: &str = "root";

/// Ordered parent → children lists plus the reverse parent index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdjacencyMap {
    children: HashMap<String, Vec<String>>,
    parents: HashMap<String, String>,
}

impl AdjacencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from raw lists
    ///
    /// Returns the id of the first child found in more than one list (or twice
    /// in the same list) as the error.
    pub fn from_lists<I>(lists: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut map = Self::new();
        for (parent, kids) in lists {
            for kid in &kids {
                if map.parents.insert(kid.clone(), parent.clone()).is_some() {
                    return Err(kid.clone());
                }
            }
            if !kids.is_empty() {
                map.children.insert(parent, kids);
            }
        }
        Ok(map)
    }

    /// Ordered children of `parent` (empty when it has none)
    pub fn children(&self, parent: &str) -> &[String] {
        self.children.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    /// True when `id` is attached somewhere in the tree
    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id)
    }

    /// Parent id and index of `id` within that parent's list
    pub fn position(&self, id: &str) -> Option<(&str, usize)> {
        let parent = self.parents.get(id)?;
        let index = self.children(parent).iter().position(|c| c == id)?;
        Some((parent.as_str(), index))
    }

    /// Insert `id` into `parent` at `index` (clamped to the list length)
    pub fn insert_child(&mut self, parent: &str, index: usize, id: &str) {
        let list = self.children.entry(parent.to_string()).or_default();
        let index = index.min(list.len());
        list.insert(index, id.to_string());
        self.parents.insert(id.to_string(), parent.to_string());
    }

    /// Append `id` as the last child of `parent`
    pub fn push_child(&mut self, parent: &str, id: &str) {
        let len = self.children(parent).len();
        self.insert_child(parent, len, id);
    }

    /// Detach `id` from its parent list, returning where it was
    pub fn remove_child(&mut self, id: &str) -> Option<(String, usize)> {
        let parent = self.parents.remove(id)?;
        let list = self.children.get_mut(&parent)?;
        let index = list.iter().position(|c| c == id)?;
        list.remove(index);
        if list.is_empty() {
            self.children.remove(&parent);
        }
        Some((parent, index))
    }

    /// Drop the whole list owned by `parent`, un-indexing its children
    pub fn remove_list(&mut self, parent: &str) -> Vec<String> {
        let kids = self.children.remove(parent).unwrap_or_default();
        for kid in &kids {
            self.parents.remove(kid);
        }
        kids
    }

    /// Swap two positions within one parent's list
    pub fn swap(&mut self, parent: &str, a: usize, b: usize) {
        if let Some(list) = self.children.get_mut(parent) {
            if a < list.len() && b < list.len() {
                list.swap(a, b);
            }
        }
    }

    /// All descendants of `id` in depth-first pre-order, excluding `id`
    pub fn descendants(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self.children(id).iter().rev().map(String::as_str).collect();
        while let Some(next) = stack.pop() {
            out.push(next.to_string());
            stack.extend(self.children(next).iter().rev().map(String::as_str));
        }
        out
    }

    /// True when `ancestor` appears on the parent chain of `id`
    pub fn is_ancestor(&self, ancestor: &str, id: &str) -> bool {
        let mut current = self.parent_of(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent_of(parent);
        }
        false
    }

    /// Iterate over every non-empty list
    pub fn lists(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.children.iter()
    }

    /// Number of attached (non-root) ids
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Sorted copy of every list, suitable for the wire and for equality checks
    pub fn to_map(&self) -> BTreeMap<String, Vec<String>> {
        self.children
            .iter()
            .map(|(parent, kids)| (parent.clone(), kids.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn sample() -> AdjacencyMap {
        AdjacencyMap::from_lists(vec![
            (ROOT_ID.to_string(), ids(&["a", "c"])),
            ("a".to_string(), ids(&["b"])),
            ("c".to_string(), ids(&["d"])),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_lists_indexes_parents() {
        let map = sample();
        assert_eq!(map.parent_of("b"), Some("a"));
        assert_eq!(map.parent_of("a"), Some(ROOT_ID));
        assert_eq!(map.position("c"), Some((ROOT_ID, 1)));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_from_lists_rejects_second_parent() {
        let result = AdjacencyMap::from_lists(vec![
            (ROOT_ID.to_string(), ids(&["a", "b"])),
            ("a".to_string(), ids(&["b"])),
        ]);
        assert_eq!(result.unwrap_err(), "b");
    }

    #[test]
    fn test_remove_child_prunes_empty_list() {
        let mut map = sample();
        assert_eq!(map.remove_child("b"), Some(("a".to_string(), 0)));
        assert!(map.children("a").is_empty());
        assert!(!map.to_map().contains_key("a"));
        assert!(!map.contains("b"));
    }

    #[test]
    fn test_descendants_pre_order() {
        let mut map = sample();
        map.push_child("b", "e");
        assert_eq!(map.descendants("a"), ids(&["b", "e"]));
        assert_eq!(map.descendants(ROOT_ID), ids(&["a", "b", "e", "c", "d"]));
    }

    #[test]
    fn test_is_ancestor() {
        let map = sample();
        assert!(map.is_ancestor("c", "d"));
        assert!(map.is_ancestor(ROOT_ID, "d"));
        assert!(!map.is_ancestor("a", "d"));
    }

    #[test]
    fn test_insert_child_clamps_index() {
        let mut map = sample();
        map.insert_child(ROOT_ID, 99, "z");
        assert_eq!(map.children(ROOT_ID), ids(&["a", "c", "z"]).as_slice());
    }
}
