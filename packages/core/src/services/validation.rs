//! Batch validation
//!
//! Turns a [`SyncBatch`] plus the persisted state of its document into an
//! [`ApplyPlan`], or rejects it with exactly one [`SyncErrorKind`]. Pure: no
//! I/O, so the whole conflict taxonomy is unit tested here and the apply
//! service only has to write what the plan says.
//!
//! Checks run in a fixed order and the first violation wins:
//!
//! 1. root row present when the document has nodes (`RootNodeMissing`)
//! 2. batch root list non-empty (`RootNodeEmpty`)
//! 3. updates target live nodes and are not also deleted
//! 4. every submitted child list resolves, and lists nothing being deleted
//! 5. deletes are known and leave no parent or child referencing them
//! 6. notes carry both projections
//! 7. the merged tree is reachable from root exactly once per node

use crate::sync::{NodePayload, SyncBatch, SyncErrorKind};
use crate::tree::ROOT_ID;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A batch refusal, before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: SyncErrorKind,
    pub detail: String,
}

impl Rejection {
    pub fn new(kind: SyncErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// What the server currently holds for one document
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    node_ids: HashSet<String>,
    children: BTreeMap<String, Vec<String>>,
    parents: HashMap<String, String>,
    tombstones: HashSet<String>,
}

impl PersistedState {
    pub fn new(
        node_ids: HashSet<String>,
        children: BTreeMap<String, Vec<String>>,
        tombstones: HashSet<String>,
    ) -> Self {
        let parents = children
            .iter()
            .flat_map(|(parent, kids)| kids.iter().map(move |kid| (kid.clone(), parent.clone())))
            .collect();
        Self {
            node_ids,
            children,
            parents,
            tombstones,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_ids.contains(id)
    }

    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }
}

/// Writes for one accepted batch, in application order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyPlan {
    /// Ids to remove and tombstone
    pub deletes: Vec<String>,
    /// Node rows to create, or rewrite when an earlier attempt already did
    pub inserts: Vec<(String, NodePayload)>,
    pub updates: Vec<(String, NodePayload)>,
    /// Child lists to overwrite (an empty list removes the row)
    pub child_lists: Vec<(String, Vec<String>)>,
}

impl ApplyPlan {
    pub fn write_count(&self) -> usize {
        self.deletes.len() + self.inserts.len() + self.updates.len() + self.child_lists.len()
    }
}

struct Context<'a> {
    state: &'a PersistedState,
    batch: &'a SyncBatch,
    deleting: HashSet<&'a str>,
    /// Inserts that will really be written (tombstoned ids are never revived)
    inserting: HashSet<&'a str>,
}

impl<'a> Context<'a> {
    fn exists(&self, id: &str) -> bool {
        self.state.contains(id) || self.inserting.contains(id)
    }

    fn is_deleting(&self, id: &str) -> bool {
        self.deleting.contains(id)
    }
}

/// Validate `batch` against `state` and plan its writes
pub fn plan_batch(state: &PersistedState, batch: &SyncBatch) -> Result<ApplyPlan, Rejection> {
    let deleting: HashSet<&str> = batch.mutations.delete.iter().map(String::as_str).collect();
    let inserting: HashSet<&str> = batch
        .mutations
        .insert
        .keys()
        .map(String::as_str)
        .filter(|id| !state.is_tombstoned(id))
        .collect();
    let cx = Context {
        state,
        batch,
        deleting,
        inserting,
    };

    check_root(&cx)?;
    check_updates(&cx)?;
    check_child_lists(&cx)?;
    check_deletes(&cx)?;
    check_notes(&cx)?;
    check_structure(&cx)?;

    Ok(build_plan(&cx))
}

fn check_root(cx: &Context<'_>) -> Result<(), Rejection> {
    if !cx.state.node_ids.is_empty() && !cx.state.children.contains_key(ROOT_ID) {
        return Err(Rejection::new(
            SyncErrorKind::RootNodeMissing,
            "document has nodes but no root list",
        ));
    }

    match cx.batch.root_children() {
        Some(root) if !root.is_empty() => Ok(()),
        _ => Err(Rejection::new(
            SyncErrorKind::RootNodeEmpty,
            "batch root list is missing or empty",
        )),
    }
}

fn check_updates(cx: &Context<'_>) -> Result<(), Rejection> {
    for id in cx.batch.mutations.update.keys() {
        if cx.is_deleting(id) {
            return Err(Rejection::new(
                SyncErrorKind::DeleteUpdateConflict,
                format!("node {} is both updated and deleted", id),
            ));
        }
        if !cx.exists(id) {
            return Err(Rejection::new(
                SyncErrorKind::UpdateDoesNotExist,
                format!("updated node {} does not exist", id),
            ));
        }
    }
    Ok(())
}

fn check_child_lists(cx: &Context<'_>) -> Result<(), Rejection> {
    for (parent, kids) in &cx.batch.children {
        if parent == ROOT_ID {
            for kid in kids {
                if cx.is_deleting(kid) {
                    return Err(Rejection::new(
                        SyncErrorKind::DeleteRootNodeConflict,
                        format!("deleted node {} is still listed under root", kid),
                    ));
                }
                if !cx.exists(kid) {
                    return Err(Rejection::new(
                        SyncErrorKind::UpdateChildDoesNotExist,
                        format!("root child {} does not exist", kid),
                    ));
                }
            }
            continue;
        }

        if cx.is_deleting(parent) {
            if kids.is_empty() {
                continue;
            }
            return Err(Rejection::new(
                SyncErrorKind::DeleteParentNodeConflict,
                format!("deleted node {} still lists children", parent),
            ));
        }
        if !cx.exists(parent) {
            return Err(Rejection::new(
                SyncErrorKind::UpdateDoesNotExist,
                format!("child list owner {} does not exist", parent),
            ));
        }

        let owner_inserted = cx.batch.mutations.insert.contains_key(parent);
        for kid in kids {
            if cx.is_deleting(kid) {
                let kind = if owner_inserted {
                    SyncErrorKind::InsertChildDeleteConflict
                } else {
                    SyncErrorKind::UpdateChildDeleteConflict
                };
                return Err(Rejection::new(
                    kind,
                    format!("deleted node {} is still a child of {}", kid, parent),
                ));
            }
            if !cx.exists(kid) {
                let kind = if owner_inserted {
                    SyncErrorKind::InsertChildDoesNotExist
                } else {
                    SyncErrorKind::UpdateChildDoesNotExist
                };
                return Err(Rejection::new(
                    kind,
                    format!("child {} of {} does not exist", kid, parent),
                ));
            }
        }
    }
    Ok(())
}

fn check_deletes(cx: &Context<'_>) -> Result<(), Rejection> {
    let relisted: HashSet<&str> = cx
        .batch
        .children
        .values()
        .flatten()
        .map(String::as_str)
        .collect();

    for id in &cx.batch.mutations.delete {
        let persisted = cx.state.contains(id);
        if !persisted {
            if cx.batch.mutations.insert.contains_key(id) || cx.state.is_tombstoned(id) {
                continue;
            }
            return Err(Rejection::new(
                SyncErrorKind::DeleteDoesNotExist,
                format!("deleted node {} does not exist", id),
            ));
        }

        if let Some(parent) = cx.state.parents.get(id) {
            let parent_keeps_it = parent != ROOT_ID
                && !cx.is_deleting(parent)
                && !cx.batch.children.contains_key(parent);
            if parent_keeps_it {
                return Err(Rejection::new(
                    SyncErrorKind::DeleteParentNodeConflict,
                    format!("deleted node {} is still a child of {}", id, parent),
                ));
            }
        }

        let stranded = cx
            .state
            .children
            .get(id)
            .into_iter()
            .flatten()
            .find(|kid| !cx.is_deleting(kid) && !relisted.contains(kid.as_str()));
        if let Some(kid) = stranded {
            return Err(Rejection::new(
                SyncErrorKind::DeleteParentNodeConflict,
                format!("deleting {} would strand child {}", id, kid),
            ));
        }
    }
    Ok(())
}

fn check_notes(cx: &Context<'_>) -> Result<(), Rejection> {
    let mutations = &cx.batch.mutations;
    let partial = mutations
        .insert
        .iter()
        .chain(mutations.update.iter())
        .find(|(_, payload)| payload.has_partial_note());

    match partial {
        Some((id, _)) => Err(Rejection::new(
            SyncErrorKind::NoteHtmlOrTextMissing,
            format!("note of {} lacks its html or text form", id),
        )),
        None => Ok(()),
    }
}

/// Adjacency after the batch: persisted lists overridden by submitted ones,
/// without the lists of deleted parents
fn merged_children<'a>(cx: &Context<'a>) -> HashMap<&'a str, &'a [String]> {
    let mut merged: HashMap<&str, &[String]> = cx
        .state
        .children
        .iter()
        .map(|(parent, kids)| (parent.as_str(), kids.as_slice()))
        .collect();
    for (parent, kids) in &cx.batch.children {
        merged.insert(parent.as_str(), kids.as_slice());
    }
    merged.retain(|parent, _| !cx.is_deleting(parent));
    merged
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

fn check_structure(cx: &Context<'_>) -> Result<(), Rejection> {
    let merged = merged_children(cx);
    let surviving: HashSet<&str> = cx
        .state
        .node_ids
        .iter()
        .map(String::as_str)
        .chain(cx.inserting.iter().copied())
        .filter(|id| !cx.is_deleting(id))
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(surviving.len());
    walk(ROOT_ID, &merged, &surviving, &mut marks)?;

    let mut unreached: Vec<&str> = surviving
        .iter()
        .copied()
        .filter(|id| !marks.contains_key(id))
        .collect();
    if unreached.is_empty() {
        return Ok(());
    }

    // Unreachable nodes are either orphans or part of a detached cycle
    unreached.sort_unstable();
    for id in &unreached {
        if !marks.contains_key(id) {
            walk(*id, &merged, &surviving, &mut marks)?;
        }
    }
    Err(Rejection::new(
        SyncErrorKind::OrphanedNode,
        format!("node {} is not reachable from root", unreached[0]),
    ))
}

/// Iterative depth-first walk that reports the first revisit
fn walk<'a>(
    start: &'a str,
    merged: &HashMap<&'a str, &'a [String]>,
    surviving: &HashSet<&str>,
    marks: &mut HashMap<&'a str, Mark>,
) -> Result<(), Rejection> {
    // (node, index of the next child to visit)
    let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
    marks.insert(start, Mark::OnStack);

    while let Some(&mut (node, ref mut next)) = stack.last_mut() {
        let kids = merged.get(node).copied().unwrap_or(&[]);
        let Some(kid) = kids.get(*next) else {
            marks.insert(node, Mark::Done);
            stack.pop();
            continue;
        };
        *next += 1;
        let kid = kid.as_str();

        if !surviving.contains(kid) {
            return Err(Rejection::new(
                SyncErrorKind::UpdateChildDoesNotExist,
                format!("child {} of {} does not exist", kid, node),
            ));
        }
        match marks.get(kid) {
            Some(Mark::OnStack) => {
                return Err(Rejection::new(
                    SyncErrorKind::CycleDetected,
                    format!("node {} is its own ancestor", kid),
                ))
            }
            Some(Mark::Done) => {
                return Err(Rejection::new(
                    SyncErrorKind::MultipleParents,
                    format!("node {} is listed under more than one parent", kid),
                ))
            }
            None => {
                marks.insert(kid, Mark::OnStack);
                stack.push((kid, 0));
            }
        }
    }
    Ok(())
}

fn build_plan(cx: &Context<'_>) -> ApplyPlan {
    let mutations = &cx.batch.mutations;

    let deletes = mutations
        .delete
        .iter()
        .filter(|id| !cx.state.is_tombstoned(id))
        .cloned()
        .collect();

    let inserts = mutations
        .insert
        .iter()
        .filter(|(id, _)| cx.inserting.contains(id.as_str()) && !cx.is_deleting(id))
        .map(|(id, payload)| (id.clone(), payload.clone()))
        .collect();

    let updates = mutations
        .update
        .iter()
        .map(|(id, payload)| (id.clone(), payload.clone()))
        .collect();

    let child_lists = cx
        .batch
        .children
        .iter()
        .filter(|(parent, _)| !cx.is_deleting(parent))
        .map(|(parent, kids)| (parent.clone(), kids.clone()))
        .collect();

    ApplyPlan {
        deletes,
        inserts,
        updates,
        child_lists,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutlineNode;

    fn ids(values: &str) -> Vec<String> {
        values.split_whitespace().map(str::to_string).collect()
    }

    fn payload(content: &str) -> NodePayload {
        NodePayload::from(&OutlineNode::with_id("_").with_content(content))
    }

    /// Persisted document: root(a(b), c)
    fn state() -> PersistedState {
        let mut children = BTreeMap::new();
        children.insert(ROOT_ID.to_string(), ids("a c"));
        children.insert("a".to_string(), ids("b"));
        PersistedState::new(
            ids("a b c").into_iter().collect(),
            children,
            ids("gone").into_iter().collect(),
        )
    }

    fn batch(root: &str) -> SyncBatch {
        let mut batch = SyncBatch::default();
        batch.children.insert(ROOT_ID.to_string(), ids(root));
        batch
    }

    fn kind(result: Result<ApplyPlan, Rejection>) -> SyncErrorKind {
        result.unwrap_err().kind
    }

    #[test]
    fn test_plain_update_is_planned() {
        let mut b = batch("a c");
        b.mutations.update.insert("b".to_string(), payload("B"));

        let plan = plan_batch(&state(), &b).unwrap();
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.child_lists, vec![(ROOT_ID.to_string(), ids("a c"))]);
    }

    #[test]
    fn test_fresh_document_accepts_first_batch() {
        let mut b = batch("x");
        b.mutations.insert.insert("x".to_string(), payload(""));

        let plan = plan_batch(&PersistedState::default(), &b).unwrap();
        assert_eq!(plan.inserts.len(), 1);
    }

    #[test]
    fn test_root_checks() {
        let no_root = PersistedState::new(
            ids("a").into_iter().collect(),
            BTreeMap::new(),
            HashSet::new(),
        );
        assert_eq!(kind(plan_batch(&no_root, &batch("a"))), SyncErrorKind::RootNodeMissing);

        assert_eq!(kind(plan_batch(&state(), &batch(""))), SyncErrorKind::RootNodeEmpty);
        assert_eq!(
            kind(plan_batch(&state(), &SyncBatch::default())),
            SyncErrorKind::RootNodeEmpty
        );
    }

    #[test]
    fn test_update_checks() {
        let mut b = batch("a c");
        b.mutations.update.insert("zz".to_string(), payload(""));
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::UpdateDoesNotExist);

        let mut b = batch("a");
        b.mutations.update.insert("c".to_string(), payload(""));
        b.mutations.delete.push("c".to_string());
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::DeleteUpdateConflict);
    }

    #[test]
    fn test_child_list_checks_follow_owner_kind() {
        let mut b = batch("a c");
        b.children.insert("c".to_string(), ids("ghost"));
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::UpdateChildDoesNotExist);

        let mut b = batch("a c n");
        b.mutations.insert.insert("n".to_string(), payload(""));
        b.children.insert("n".to_string(), ids("ghost"));
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::InsertChildDoesNotExist);

        let mut b = batch("a");
        b.children.insert("a".to_string(), ids("b c"));
        b.mutations.delete.push("c".to_string());
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::UpdateChildDeleteConflict);

        let mut b = batch("a n");
        b.mutations.insert.insert("n".to_string(), payload(""));
        b.children.insert("n".to_string(), ids("c"));
        b.mutations.delete.push("c".to_string());
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::InsertChildDeleteConflict);
    }

    #[test]
    fn test_delete_root_conflict() {
        let mut b = batch("a c");
        b.mutations.delete.push("c".to_string());
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::DeleteRootNodeConflict);
    }

    #[test]
    fn test_delete_checks() {
        let mut b = batch("a c");
        b.mutations.delete.push("never".to_string());
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::DeleteDoesNotExist);

        // b's parent list is not part of the batch
        let mut b = batch("a c");
        b.mutations.delete.push("b".to_string());
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::DeleteParentNodeConflict);

        // a's child b would be left without a parent
        let mut b = batch("c");
        b.mutations.delete.push("a".to_string());
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::DeleteParentNodeConflict);
    }

    #[test]
    fn test_cascade_delete_is_accepted() {
        let mut b = batch("c");
        b.mutations.delete.extend(ids("a b"));

        let plan = plan_batch(&state(), &b).unwrap();
        assert_eq!(plan.deletes, ids("a b"));
        assert_eq!(plan.child_lists, vec![(ROOT_ID.to_string(), ids("c"))]);
    }

    #[test]
    fn test_stale_delete_retry_succeeds() {
        let mut b = batch("a c");
        b.mutations.delete.push("gone".to_string());

        let plan = plan_batch(&state(), &b).unwrap();
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_insert_of_persisted_id_is_idempotent() {
        let mut b = batch("a c");
        b.mutations.insert.insert("c".to_string(), payload("C"));

        let plan = plan_batch(&state(), &b).unwrap();
        assert_eq!(plan.inserts[0].0, "c");
    }

    #[test]
    fn test_tombstoned_insert_is_not_revived() {
        let mut b = batch("a c");
        b.mutations.insert.insert("gone".to_string(), payload(""));

        let plan = plan_batch(&state(), &b).unwrap();
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn test_partial_note_rejected() {
        let mut b = batch("a c");
        let mut partial = payload("");
        partial.note_html = Some("<p>x</p>".to_string());
        b.mutations.update.insert("c".to_string(), partial);
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::NoteHtmlOrTextMissing);
    }

    #[test]
    fn test_structural_checks() {
        // c moved under a, then a moved under c
        let mut b = batch("a");
        b.children.insert("a".to_string(), ids("b c"));
        b.children.insert("c".to_string(), ids("a"));
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::CycleDetected);

        let mut b = batch("a c");
        b.children.insert("c".to_string(), ids("b"));
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::MultipleParents);

        // Inserted but never listed
        let mut b = batch("a c");
        b.mutations.insert.insert("n".to_string(), payload(""));
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::OrphanedNode);

        // c and its new child form a loop cut off from root
        let mut b = batch("a");
        b.mutations.insert.insert("n".to_string(), payload(""));
        b.children.insert("c".to_string(), ids("n"));
        b.children.insert("n".to_string(), ids("c"));
        assert_eq!(kind(plan_batch(&state(), &b)), SyncErrorKind::CycleDetected);
    }

    #[test]
    fn test_move_between_lists_is_accepted() {
        // unnest b: a's list emptied, b appended to root
        let mut b = batch("a b c");
        b.children.insert("a".to_string(), Vec::new());

        let plan = plan_batch(&state(), &b).unwrap();
        assert_eq!(plan.child_lists.len(), 2);
    }
}
