use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Result as SqliteResult, Transaction};
use std::path::Path;
use tokio::sync::broadcast;

use crate::storage::document::{
    ChangeNotice, Document, DocumentStore, Fields, SetMode, StoreError, WriteBatch, WriteOp,
    merge_fields,
};
use crate::storage::memory_store::CHANGE_CHANNEL_CAPACITY;
use crate::storage::paths::{CollectionPath, DocumentPath};

/// Document store persisted in a single SQLite table keyed by document path.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    notifier: broadcast::Sender<ChangeNotice>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        let (notifier, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            conn: Mutex::new(conn),
            notifier,
        }
    }

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }
        let store = Self::new(Connection::open(path)?);
        store.initialize()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Self::new(Connection::open_in_memory()?);
        store.initialize()?;
        Ok(store)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                path TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS documents_by_collection ON documents (collection, doc_id)",
            [],
        )?;
        Ok(())
    }

    pub fn table_exists(&self, table_name: &str) -> bool {
        let conn = self.conn.lock();
        let result: SqliteResult<i32> = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        );
        result.unwrap_or(0) > 0
    }

    fn load(tx: &Transaction<'_>, path: &DocumentPath) -> Result<Option<Fields>, StoreError> {
        let data: Option<String> = tx
            .query_row(
                "SELECT data FROM documents WHERE path = ?1",
                [path.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    fn store(tx: &Transaction<'_>, path: &DocumentPath, fields: &Fields) -> Result<(), StoreError> {
        let data = serde_json::to_string(fields)?;
        tx.execute(
            "INSERT OR REPLACE INTO documents (path, collection, doc_id, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                path.as_str(),
                path.parent().as_str(),
                path.id(),
                &data,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn apply(tx: &Transaction<'_>, op: WriteOp) -> Result<Option<DocumentPath>, StoreError> {
        match op {
            WriteOp::Set { path, fields, mode } => {
                let merged = match (mode, Self::load(tx, &path)?) {
                    (SetMode::Merge, Some(mut existing)) => {
                        merge_fields(&mut existing, fields);
                        existing
                    }
                    _ => fields,
                };
                Self::store(tx, &path, &merged)?;
                Ok(Some(path))
            }
            WriteOp::Update { path, fields } => {
                let Some(mut existing) = Self::load(tx, &path)? else {
                    return Err(StoreError::NotFound(path.to_string()));
                };
                merge_fields(&mut existing, fields);
                Self::store(tx, &path, &existing)?;
                Ok(Some(path))
            }
            WriteOp::Delete { path } => {
                let removed = tx.execute("DELETE FROM documents WHERE path = ?1", [path.as_str()])?;
                Ok((removed > 0).then_some(path))
            }
        }
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE path = ?1",
                [path.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => Ok(Some(Document::new(path.id(), serde_json::from_str(&data)?))),
            None => Ok(None),
        }
    }

    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT doc_id, data FROM documents WHERE collection = ?1 ORDER BY doc_id")?;
        let rows = stmt.query_map([path.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (id, data) = row?;
            documents.push(Document::new(id, serde_json::from_str(&data)?));
        }
        Ok(documents)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut touched = Vec::with_capacity(batch.len());
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            for op in batch.into_ops() {
                if let Some(path) = Self::apply(&tx, op)? {
                    touched.push(path);
                }
            }
            tx.commit()?;
        }

        for path in touched {
            let _ = self.notifier.send(ChangeNotice { path });
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.notifier.subscribe()
    }
}
