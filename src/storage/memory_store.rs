use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::storage::document::{
    ChangeNotice, Document, DocumentStore, Fields, SetMode, StoreError, WriteBatch, WriteOp,
    merge_fields,
};
use crate::storage::paths::{CollectionPath, DocumentPath};

pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Process-local document store. Batches are staged on a copy and swapped in
/// only when every op succeeds.
pub struct MemoryStore {
    documents: Mutex<BTreeMap<DocumentPath, Fields>>,
    notifier: broadcast::Sender<ChangeNotice>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            documents: Mutex::new(BTreeMap::new()),
            notifier,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }

    fn apply(
        staged: &mut BTreeMap<DocumentPath, Fields>,
        op: WriteOp,
        touched: &mut Vec<DocumentPath>,
    ) -> Result<(), StoreError> {
        match op {
            WriteOp::Set { path, fields, mode } => {
                match (mode, staged.get_mut(&path)) {
                    (SetMode::Merge, Some(existing)) => merge_fields(existing, fields),
                    _ => {
                        staged.insert(path.clone(), fields);
                    }
                }
                touched.push(path);
            }
            WriteOp::Update { path, fields } => {
                let Some(existing) = staged.get_mut(&path) else {
                    return Err(StoreError::NotFound(path.to_string()));
                };
                merge_fields(existing, fields);
                touched.push(path);
            }
            WriteOp::Delete { path } => {
                if staged.remove(&path).is_some() {
                    touched.push(path);
                }
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.lock();
        Ok(documents
            .get(path)
            .map(|fields| Document::new(path.id(), fields.clone())))
    }

    async fn list(&self, path: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.lock();
        let mut listed: Vec<Document> = documents
            .iter()
            .filter(|(doc_path, _)| doc_path.parent() == *path)
            .map(|(doc_path, fields)| Document::new(doc_path.id(), fields.clone()))
            .collect();
        listed.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listed)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut touched = Vec::with_capacity(batch.len());
        {
            let mut documents = self.documents.lock();
            let mut staged = documents.clone();
            for op in batch.into_ops() {
                Self::apply(&mut staged, op, &mut touched)?;
            }
            *documents = staged;
        }

        for path in touched {
            // No receivers simply means nobody is subscribed yet.
            let _ = self.notifier.send(ChangeNotice { path });
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.notifier.subscribe()
    }
}
