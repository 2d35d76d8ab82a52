//! Apply Service
//!
//! Server side of the sync protocol: validates a batch against the persisted
//! copy of its document and writes it in one transaction, or rejects it and
//! leaves the document untouched.
//!
//! # Concurrency
//!
//! Applies for the same document are serialized by a per-document async
//! mutex, and each runs inside `BEGIN IMMEDIATE` so the state it validated is
//! the state it writes. Different documents proceed independently.

use crate::db::{DatabaseError, DatabaseService, DbNodeParams};
use crate::services::error::ApplyError;
use crate::services::validation::{plan_batch, ApplyPlan, PersistedState, Rejection};
use crate::sync::{PersistedTree, SyncBatch, SyncErrorKind};
use crate::tree::ROOT_ID;
use libsql::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

/// Per-document write locks
type LockTable = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Counts of what an accepted batch wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub deleted: usize,
    pub inserted: usize,
    pub updated: usize,
    pub lists_written: usize,
}

impl From<&ApplyPlan> for ApplySummary {
    fn from(plan: &ApplyPlan) -> Self {
        Self {
            deleted: plan.deletes.len(),
            inserted: plan.inserts.len(),
            updated: plan.updates.len(),
            lists_written: plan.child_lists.len(),
        }
    }
}

#[derive(Debug)]
pub struct ApplyService {
    db: Arc<DatabaseService>,
    locks: Mutex<LockTable>,
}

impl ApplyService {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self {
            db,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    fn lock_table(&self) -> MutexGuard<'_, LockTable> {
        match self.locks.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn document_lock(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.lock_table()
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the entry for `document_id` once no apply holds or awaits it
    fn release_document_lock(&self, document_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.lock_table();
        // The table's copy plus `lock`
        if Arc::strong_count(&lock) == 2 {
            locks.remove(document_id);
        }
    }

    /// Number of documents with a live write lock entry
    pub fn tracked_document_locks(&self) -> usize {
        self.lock_table().len()
    }

    /// Create an empty document owned by `owner_id`
    pub async fn create_document(&self, owner_id: &str) -> Result<String, ApplyError> {
        let document_id = uuid::Uuid::new_v4().to_string();
        self.db.db_create_document(&document_id, owner_id).await?;
        info!("📄 Created document {} for {}", document_id, owner_id);
        Ok(document_id)
    }

    /// Persisted tree of a document owned by `owner_id`
    pub async fn load_tree(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<PersistedTree, ApplyError> {
        let conn = self.db.connect_with_timeout().await?;
        self.check_owner(&conn, document_id, owner_id).await?;

        let nodes = self.db.db_load_nodes(&conn, document_id).await?;
        let children = self.db.db_load_child_map(&conn, document_id).await?;
        Ok(PersistedTree { nodes, children })
    }

    /// Apply a batch atomically, or reject it with one conflict kind
    #[instrument(skip(self, batch), fields(mutations = batch.mutations.len()))]
    pub async fn apply(
        &self,
        document_id: &str,
        owner_id: &str,
        batch: &SyncBatch,
    ) -> Result<ApplySummary, ApplyError> {
        let lock = self.document_lock(document_id);
        let write_guard = lock.lock().await;
        let result = self.apply_locked(document_id, owner_id, batch).await;
        drop(write_guard);
        self.release_document_lock(document_id, lock);
        result
    }

    async fn apply_locked(
        &self,
        document_id: &str,
        owner_id: &str,
        batch: &SyncBatch,
    ) -> Result<ApplySummary, ApplyError> {
        let conn = self.db.connect_with_timeout().await?;
        self.db.begin_immediate(&conn).await?;

        match self.apply_in_transaction(&conn, document_id, owner_id, batch).await {
            Ok(summary) => {
                self.db.commit(&conn).await?;
                info!(
                    "✅ Applied batch to {}: {} deleted, {} inserted, {} updated, {} list(s)",
                    document_id,
                    summary.deleted,
                    summary.inserted,
                    summary.updated,
                    summary.lists_written
                );
                Ok(summary)
            }
            Err(e) => {
                self.db.rollback(&conn).await;
                match &e {
                    ApplyError::Rejected { kind, detail } => {
                        warn!("Batch for {} rejected with {}: {}", document_id, kind, detail)
                    }
                    ApplyError::Database(db_error) => {
                        error!("Batch for {} failed: {}", document_id, db_error)
                    }
                }
                Err(e)
            }
        }
    }

    async fn apply_in_transaction(
        &self,
        conn: &Connection,
        document_id: &str,
        owner_id: &str,
        batch: &SyncBatch,
    ) -> Result<ApplySummary, ApplyError> {
        self.check_owner(conn, document_id, owner_id).await?;

        let state = self.load_state(conn, document_id).await?;
        let plan = plan_batch(&state, batch)?;
        debug!("Planned {} write(s)", plan.write_count());

        for id in &plan.deletes {
            self.db.db_delete_node(conn, document_id, id).await?;
        }
        for (id, payload) in plan.inserts.iter().chain(plan.updates.iter()) {
            let node = payload.clone().into_node(id.as_str());
            self.db
                .db_upsert_node(conn, DbNodeParams::from_node(document_id, &node))
                .await?;
        }
        for (parent, kids) in &plan.child_lists {
            self.db
                .db_write_children(conn, document_id, parent, kids)
                .await?;
        }
        self.db.db_touch_document(conn, document_id).await?;

        Ok(ApplySummary::from(&plan))
    }

    async fn check_owner(
        &self,
        conn: &Connection,
        document_id: &str,
        owner_id: &str,
    ) -> Result<(), ApplyError> {
        match self.db.db_get_document(conn, document_id).await? {
            Some(doc) if doc.owner_id == owner_id => Ok(()),
            _ => Err(ApplyError::document_not_found(document_id)),
        }
    }

    async fn load_state(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<PersistedState, ApplyError> {
        let node_ids = self
            .db
            .db_load_nodes(conn, document_id)
            .await?
            .into_iter()
            .map(|node| node.id)
            .collect();

        let mut children = std::collections::BTreeMap::new();
        for row in self.db.db_load_children(conn, document_id).await? {
            match row.child_ids {
                Some(ids) => {
                    children.insert(row.parent_id, ids);
                }
                None if row.parent_id == ROOT_ID => {
                    return Err(Rejection::new(
                        SyncErrorKind::RootNodeMissing,
                        "stored root list is malformed",
                    )
                    .into());
                }
                None => {
                    return Err(DatabaseError::corrupt_row(format!(
                        "child list of {} in document {}",
                        row.parent_id, document_id
                    ))
                    .into());
                }
            }
        }

        let tombstones = self.db.db_load_tombstones(conn, document_id).await?;
        Ok(PersistedState::new(node_ids, children, tombstones))
    }
}
