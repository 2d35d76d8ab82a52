//! Property Tests for the Tree Store
//!
//! Random edit sequences must keep the structural invariants, coalesce
//! pending mutations into disjoint sets, and produce a batch the server
//! accepts and converges on.

#[cfg(test)]
mod tree_property_tests {
    use outline_core::tree::{Direction, TreeEditError};
    use outline_core::{ApplyService, DatabaseService, OutlineNode, OutlineStore, ROOT_ID};
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    enum EditOp {
        Add(usize),
        AddChild(usize),
        Delete(usize),
        Nest(usize),
        Unnest(usize),
        MoveUp(usize),
        MoveDown(usize),
        ToggleCollapsed(usize),
        ToggleCompleted(usize),
        Edit(usize, String),
        Note(usize),
    }

    fn edit_op() -> impl Strategy<Value = EditOp> {
        prop_oneof![
            any::<usize>().prop_map(EditOp::Add),
            any::<usize>().prop_map(EditOp::AddChild),
            any::<usize>().prop_map(EditOp::Delete),
            any::<usize>().prop_map(EditOp::Nest),
            any::<usize>().prop_map(EditOp::Unnest),
            any::<usize>().prop_map(EditOp::MoveUp),
            any::<usize>().prop_map(EditOp::MoveDown),
            any::<usize>().prop_map(EditOp::ToggleCollapsed),
            any::<usize>().prop_map(EditOp::ToggleCompleted),
            (any::<usize>(), "[a-z ]{0,12}").prop_map(|(i, text)| EditOp::Edit(i, text)),
            any::<usize>().prop_map(EditOp::Note),
        ]
    }

    /// root: n0(n4, n5(n6)), n1, n2, n3
    fn seeded_store() -> OutlineStore {
        let nodes = (0..7)
            .map(|i| OutlineNode::with_id(format!("n{}", i)).with_content(format!("item {}", i)))
            .collect();
        let mut children = BTreeMap::new();
        children.insert(
            ROOT_ID.to_string(),
            vec!["n0".into(), "n1".into(), "n2".into(), "n3".into()],
        );
        children.insert("n0".to_string(), vec!["n4".into(), "n5".into()]);
        children.insert("n5".to_string(), vec!["n6".into()]);
        OutlineStore::from_snapshot(nodes, children).unwrap()
    }

    /// Document order, independent of collapse state
    fn preorder(store: &OutlineStore) -> Vec<String> {
        let mut order = Vec::with_capacity(store.len());
        let mut stack: Vec<String> = store.root_children().iter().rev().cloned().collect();
        while let Some(id) = stack.pop() {
            stack.extend(store.children(&id).iter().rev().cloned());
            order.push(id);
        }
        order
    }

    fn apply_op(store: &mut OutlineStore, op: &EditOp) {
        let order = preorder(store);
        let pick = |i: usize| order[i % order.len()].clone();

        let result = match op {
            EditOp::Add(i) => {
                let anchor = pick(*i);
                let parent = store.parent_of(&anchor).unwrap().to_string();
                store.add(&parent, Some(&anchor)).map(|_| ())
            }
            EditOp::AddChild(i) => store.add(&pick(*i), None).map(|_| ()),
            EditOp::Delete(i) => store.delete(&pick(*i)).map(|_| ()),
            EditOp::Nest(i) => store.nest(&pick(*i)).map(|_| ()),
            EditOp::Unnest(i) => store.unnest(&pick(*i)).map(|_| ()),
            EditOp::MoveUp(i) => store.move_node(&pick(*i), Direction::Up).map(|_| ()),
            EditOp::MoveDown(i) => store.move_node(&pick(*i), Direction::Down).map(|_| ()),
            EditOp::ToggleCollapsed(i) => store.toggle_collapsed(&pick(*i)),
            EditOp::ToggleCompleted(i) => store.toggle_completed(&pick(*i)),
            EditOp::Edit(i, text) => store.update_content(&pick(*i), text.clone()),
            EditOp::Note(i) => store.update_note(&pick(*i), "<p>note</p>", "note"),
        };

        match result {
            Ok(()) | Err(TreeEditError::LastRootNode) => {}
            Err(e) => panic!("{:?} failed: {}", op, e),
        }
    }

    proptest! {
        #[test]
        fn prop_edits_preserve_invariants(ops in prop::collection::vec(edit_op(), 0..60)) {
            let mut store = seeded_store();
            for op in &ops {
                apply_op(&mut store, op);
                prop_assert!(store.check_invariants().is_ok(), "after {:?}", op);
            }
        }

        #[test]
        fn prop_pending_mutations_coalesce(ops in prop::collection::vec(edit_op(), 0..60)) {
            let mut store = seeded_store();
            for op in &ops {
                apply_op(&mut store, op);
            }

            let pending = store.pending_mutations();
            prop_assert!(pending.insert.is_disjoint(&pending.update));
            prop_assert!(pending.insert.is_disjoint(&pending.delete));
            prop_assert!(pending.update.is_disjoint(&pending.delete));

            for id in &pending.delete {
                prop_assert!(!store.contains(id));
                // Only nodes the server already knows are ever sent as deletes
                prop_assert!(id.starts_with('n'));
            }
            for id in pending.insert.iter().chain(pending.update.iter()) {
                prop_assert!(store.contains(id));
            }
            for id in &pending.insert {
                prop_assert!(!id.starts_with('n'));
            }
        }

        #[test]
        fn prop_unnest_undoes_nest(ops in prop::collection::vec(edit_op(), 0..30), target in any::<usize>()) {
            let mut store = seeded_store();
            for op in &ops {
                apply_op(&mut store, op);
            }

            let order = preorder(&store);
            let id = order[target % order.len()].clone();
            let before = store.adjacency().to_map();

            if store.nest(&id).unwrap() {
                prop_assert!(store.unnest(&id).unwrap());
                prop_assert_eq!(store.adjacency().to_map(), before);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_server_converges_on_client(ops in prop::collection::vec(edit_op(), 1..40)) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let temp_dir = TempDir::new().unwrap();
                let db = DatabaseService::new(temp_dir.path().join("prop.db")).await.unwrap();
                let service = ApplyService::new(Arc::new(db));
                let doc = service.create_document("alice").await.unwrap();

                let mut store = seeded_store();
                service.apply(&doc, "alice", &store.full_batch()).await.unwrap();

                for op in &ops {
                    apply_op(&mut store, op);
                }

                if let Some(batch) = store.begin_sync() {
                    if let Err(e) = service.apply(&doc, "alice", &batch).await {
                        panic!("batch rejected: {} ({:?})", e, batch);
                    }
                    store.complete_sync(chrono::Utc::now());
                }

                let tree = service.load_tree(&doc, "alice").await.unwrap();
                assert_eq!(tree, store.to_persisted());
                assert!(!store.has_pending_changes());
            });
        }
    }
}
