//! Database Connection Management
//!
//! Connection handling, schema and row-level statements for the server copy
//! of outline documents, built on libsql.
//!
//! # Architecture
//!
//! - **Path-agnostic**: accepts any valid PathBuf
//! - **WAL mode**: readers never block the single writer of a document
//! - **Adjacency rows**: one row per parent holding its ordered child ids as
//!   a JSON array, mirroring the `children` map of a sync batch
//! - **Tombstones**: deleted ids are remembered per document so a retried
//!   delete is recognised as stale instead of unknown
//!
//! # Connection pattern
//!
//! Use `connect_with_timeout()` in async code. The 5-second busy timeout lets
//! a writer wait for the lock instead of failing with `SQLITE_BUSY`.
//!
//! Statements that participate in an apply transaction take the connection
//! as a parameter; the caller owns `BEGIN IMMEDIATE`/`COMMIT`/`ROLLBACK`.
//!
//! ```no_run
//! # use outline_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db_service = DatabaseService::new(PathBuf::from("./data/outline.db")).await?;
//! let conn = db_service.connect_with_timeout().await?;
//! db_service.begin_immediate(&conn).await?;
//! // ... statements ...
//! db_service.commit(&conn).await?;
//! # Ok(())
//! # }
//! ```

use crate::db::error::DatabaseError;
use crate::models::{NodeStatus, Note, OutlineNode};
use chrono::Utc;
use libsql::{Builder, Connection, Database, Row, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Database service for managing the libsql connection and schema
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

/// Stored document metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub id: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Stored child list of one parent
///
/// `child_ids` is `None` when the stored JSON cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildListRow {
    pub parent_id: String,
    pub child_ids: Option<Vec<String>>,
}

/// Parameters for writing a node row (avoids too-many-arguments lint)
pub struct DbNodeParams<'a> {
    pub document_id: &'a str,
    pub id: &'a str,
    pub content: &'a str,
    pub note_html: Option<&'a str>,
    pub note_text: Option<&'a str>,
    pub status: NodeStatus,
    pub collapsed: bool,
}

impl<'a> DbNodeParams<'a> {
    pub fn from_node(document_id: &'a str, node: &'a OutlineNode) -> Self {
        Self {
            document_id,
            id: &node.id,
            content: &node.content,
            note_html: node.note.as_ref().map(|n| n.html.as_str()),
            note_text: node.note.as_ref().map(|n| n.text.as_str()),
            status: node.status,
            collapsed: node.collapsed,
        }
    }
}

impl DatabaseService {
    /// Create a new DatabaseService with the specified database path
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the parent directory cannot be created, the
    /// connection fails, or schema initialization fails.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() rather than
    /// execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Initialize database schema and configuration
    ///
    /// Idempotent (CREATE ... IF NOT EXISTS). New database files are
    /// checkpointed so the schema is on disk before the first writer arrives.
    ///
    /// # Schema
    ///
    /// - `documents`: id, owner, timestamps
    /// - `nodes`: one row per node, keyed by (document_id, id)
    /// - `children`: one row per parent, child ids as a JSON array
    /// - `tombstones`: ids deleted from a document
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        let statements = [
            (
                "documents",
                "CREATE TABLE IF NOT EXISTS documents (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
            ),
            (
                "nodes",
                "CREATE TABLE IF NOT EXISTS nodes (
                    document_id TEXT NOT NULL,
                    id TEXT NOT NULL,
                    content TEXT NOT NULL DEFAULT '',
                    note_html TEXT,
                    note_text TEXT,
                    status TEXT NOT NULL DEFAULT 'active',
                    collapsed INTEGER NOT NULL DEFAULT 0,
                    modified_at TEXT NOT NULL,
                    PRIMARY KEY (document_id, id),
                    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
                )",
            ),
            (
                "children",
                "CREATE TABLE IF NOT EXISTS children (
                    document_id TEXT NOT NULL,
                    parent_id TEXT NOT NULL,
                    child_ids JSON NOT NULL DEFAULT '[]',
                    PRIMARY KEY (document_id, parent_id),
                    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
                )",
            ),
            (
                "tombstones",
                "CREATE TABLE IF NOT EXISTS tombstones (
                    document_id TEXT NOT NULL,
                    id TEXT NOT NULL,
                    deleted_at TEXT NOT NULL,
                    PRIMARY KEY (document_id, id),
                    FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
                )",
            ),
        ];

        for (table, sql) in statements {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create {} table: {}",
                    table, e
                ))
            })?;
        }

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id)",
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!("Failed to create owner index: {}", e))
        })?;

        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Get a connection without configuring it
    ///
    /// Only for synchronous setup code and tests; async code should use
    /// `connect_with_timeout()`.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get an async connection with busy timeout configured
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, "PRAGMA busy_timeout = 5000")
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    //
    // TRANSACTIONS
    //

    /// Start a write transaction, taking the database write lock up front
    pub async fn begin_immediate(&self, conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(())
    }

    pub async fn commit(&self, conn: &Connection) -> Result<(), DatabaseError> {
        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    /// Roll back, ignoring failures (the transaction may already be gone)
    pub async fn rollback(&self, conn: &Connection) {
        if let Err(e) = conn.execute("ROLLBACK", ()).await {
            tracing::debug!("Rollback skipped: {}", e);
        }
    }

    //
    // DOCUMENTS
    //

    /// Insert a document row owned by `owner_id`
    pub async fn db_create_document(
        &self,
        document_id: &str,
        owner_id: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO documents (id, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
            (document_id, owner_id, now.as_str(), now.as_str()),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert document: {}", e)))?;

        Ok(())
    }

    pub async fn db_get_document(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<Option<DocumentRow>, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT id, owner_id, created_at, updated_at FROM documents WHERE id = ?",
                [document_id],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to query document: {}", e))
            })?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        else {
            return Ok(None);
        };

        Ok(Some(DocumentRow {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        }))
    }

    pub async fn db_touch_document(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE documents SET updated_at = ? WHERE id = ?",
            (now.as_str(), document_id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to touch document: {}", e)))?;
        Ok(())
    }

    //
    // NODES
    //

    pub async fn db_load_nodes(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<Vec<OutlineNode>, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT id, content, note_html, note_text, status, collapsed
                 FROM nodes WHERE document_id = ? ORDER BY id",
                [document_id],
            )
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to query nodes: {}", e)))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            nodes.push(row_to_node(&row)?);
        }
        Ok(nodes)
    }

    /// Insert a node row, or overwrite every field of an existing one
    pub async fn db_upsert_node(
        &self,
        conn: &Connection,
        params: DbNodeParams<'_>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let status = params.status.to_string();

        conn.execute(
            "INSERT INTO nodes (document_id, id, content, note_html, note_text, status, collapsed, modified_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (document_id, id) DO UPDATE SET
                content = excluded.content,
                note_html = excluded.note_html,
                note_text = excluded.note_text,
                status = excluded.status,
                collapsed = excluded.collapsed,
                modified_at = excluded.modified_at",
            (
                params.document_id,
                params.id,
                params.content,
                params.note_html,
                params.note_text,
                status.as_str(),
                params.collapsed as i64,
                now.as_str(),
            ),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to write node {}: {}", params.id, e))
        })?;

        Ok(())
    }

    /// Delete a node row and remember the id as a tombstone
    pub async fn db_delete_node(
        &self,
        conn: &Connection,
        document_id: &str,
        id: &str,
    ) -> Result<(), DatabaseError> {
        conn.execute(
            "DELETE FROM nodes WHERE document_id = ? AND id = ?",
            (document_id, id),
        )
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete node {}: {}", id, e)))?;

        conn.execute(
            "DELETE FROM children WHERE document_id = ? AND parent_id = ?",
            (document_id, id),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to delete child list of {}: {}", id, e))
        })?;

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT OR IGNORE INTO tombstones (document_id, id, deleted_at) VALUES (?, ?, ?)",
            (document_id, id, now.as_str()),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to record tombstone {}: {}", id, e))
        })?;

        Ok(())
    }

    pub async fn db_load_tombstones(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<HashSet<String>, DatabaseError> {
        let mut rows = conn
            .query("SELECT id FROM tombstones WHERE document_id = ?", [document_id])
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to query tombstones: {}", e))
            })?;

        let mut ids = HashSet::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            ids.insert(row.get::<String>(0)?);
        }
        Ok(ids)
    }

    //
    // CHILD LISTS
    //

    pub async fn db_load_children(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<Vec<ChildListRow>, DatabaseError> {
        let mut rows = conn
            .query(
                "SELECT parent_id, child_ids FROM children WHERE document_id = ? ORDER BY parent_id",
                [document_id],
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to query child lists: {}", e))
            })?;

        let mut lists = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::sql_execution(e.to_string()))?
        {
            let parent_id: String = row.get(0)?;
            let child_ids = match optional_text(&row, 1)? {
                Some(raw) => serde_json::from_str::<Vec<String>>(&raw).ok(),
                None => None,
            };
            lists.push(ChildListRow {
                parent_id,
                child_ids,
            });
        }
        Ok(lists)
    }

    /// Replace the child list of `parent_id`; an empty list removes the row
    pub async fn db_write_children(
        &self,
        conn: &Connection,
        document_id: &str,
        parent_id: &str,
        child_ids: &[String],
    ) -> Result<(), DatabaseError> {
        if child_ids.is_empty() {
            conn.execute(
                "DELETE FROM children WHERE document_id = ? AND parent_id = ?",
                (document_id, parent_id),
            )
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!(
                    "Failed to clear child list of {}: {}",
                    parent_id, e
                ))
            })?;
            return Ok(());
        }

        let json = serde_json::to_string(child_ids).map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to encode child list: {}", e))
        })?;

        conn.execute(
            "INSERT INTO children (document_id, parent_id, child_ids) VALUES (?, ?, ?)
             ON CONFLICT (document_id, parent_id) DO UPDATE SET child_ids = excluded.child_ids",
            (document_id, parent_id, json.as_str()),
        )
        .await
        .map_err(|e| {
            DatabaseError::sql_execution(format!(
                "Failed to write child list of {}: {}",
                parent_id, e
            ))
        })?;

        Ok(())
    }

    /// Decoded child lists; fails on a row whose JSON is corrupt
    pub async fn db_load_child_map(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<BTreeMap<String, Vec<String>>, DatabaseError> {
        self.db_load_children(conn, document_id)
            .await?
            .into_iter()
            .map(|row| match row.child_ids {
                Some(ids) => Ok((row.parent_id, ids)),
                None => Err(DatabaseError::corrupt_row(format!(
                    "child list of {} in document {}",
                    row.parent_id, document_id
                ))),
            })
            .collect()
    }
}

/// Text column that may be NULL
fn optional_text(row: &Row, idx: i32) -> Result<Option<String>, DatabaseError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(DatabaseError::corrupt_row(format!(
            "expected text in column {}, found {:?}",
            idx, other
        ))),
    }
}

fn row_to_node(row: &Row) -> Result<OutlineNode, DatabaseError> {
    let id: String = row.get(0)?;
    let status_raw: String = row.get(4)?;
    let status = status_raw
        .parse::<NodeStatus>()
        .map_err(|e| DatabaseError::corrupt_row(format!("node {}: {}", id, e)))?;

    let note = match (optional_text(row, 2)?, optional_text(row, 3)?) {
        (Some(html), Some(text)) => Some(Note { html, text }),
        _ => None,
    };

    Ok(OutlineNode {
        content: row.get(1)?,
        note,
        status,
        collapsed: row.get::<i64>(5)? != 0,
        id,
    })
}
