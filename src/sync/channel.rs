use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::storage::{
    ChangeNotice, CollectionPath, Document, DocumentPath, DocumentStore, SharedStore, StoreError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Collection(CollectionPath),
    Document(DocumentPath),
}

impl Target {
    fn affected_by(&self, notice: &ChangeNotice) -> bool {
        match self {
            Target::Collection(path) => notice.in_collection(path),
            Target::Document(path) => notice.path == *path,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Collection(path) => write!(f, "{}", path),
            Target::Document(path) => write!(f, "{}", path),
        }
    }
}

enum Snapshot {
    Collection(Vec<Document>),
    Document(Option<Document>),
}

/// Read side of the remote store: long-lived subscriptions that hand the
/// complete current contents to a callback on every remote change.
#[derive(Clone)]
pub struct SyncChannel {
    store: SharedStore,
}

impl SyncChannel {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Calls `on_change` once with the existing contents (possibly empty), then
    /// again after every change to any document in the collection.
    pub fn subscribe<F>(&self, path: CollectionPath, mut on_change: F) -> Subscription
    where
        F: FnMut(Vec<Document>) + Send + 'static,
    {
        self.spawn(Target::Collection(path), move |snapshot| {
            if let Snapshot::Collection(documents) = snapshot {
                on_change(documents);
            }
        })
    }

    /// Single-document variant; `None` while the document does not exist.
    pub fn subscribe_document<F>(&self, path: DocumentPath, mut on_change: F) -> Subscription
    where
        F: FnMut(Option<Document>) + Send + 'static,
    {
        self.spawn(Target::Document(path), move |snapshot| {
            if let Snapshot::Document(document) = snapshot {
                on_change(document);
            }
        })
    }

    fn spawn<F>(&self, target: Target, on_change: F) -> Subscription
    where
        F: FnMut(Snapshot) + Send + 'static,
    {
        // Taken before the first read so no write can slip between read and listen.
        let changes = self.store.changes();
        let active = Arc::new(Mutex::new(true));
        let label = target.to_string();
        tracing::debug!("Subscribing to {}", label);

        let task = tokio::spawn(pump(
            self.store.clone(),
            target,
            changes,
            active.clone(),
            on_change,
        ));

        Subscription {
            label,
            active,
            task: Some(task),
        }
    }
}

async fn read(store: &dyn DocumentStore, target: &Target) -> Result<Snapshot, StoreError> {
    match target {
        Target::Collection(path) => store.list(path).await.map(Snapshot::Collection),
        Target::Document(path) => store.get(path).await.map(Snapshot::Document),
    }
}

async fn pump<F>(
    store: SharedStore,
    target: Target,
    mut changes: broadcast::Receiver<ChangeNotice>,
    active: Arc<Mutex<bool>>,
    mut on_change: F,
) where
    F: FnMut(Snapshot) + Send + 'static,
{
    loop {
        match read(store.as_ref(), &target).await {
            Ok(snapshot) => {
                // Held across the callback so dispose() waits out a delivery in progress.
                let guard = active.lock();
                if !*guard {
                    return;
                }
                on_change(snapshot);
            }
            Err(e) => {
                tracing::warn!("Subscription to {} failed, keeping last snapshot: {}", target, e);
            }
        }

        loop {
            match changes.recv().await {
                Ok(notice) if target.affected_by(&notice) => break,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Subscription to {} lagged by {} notices", target, skipped);
                    break;
                }
                Err(RecvError::Closed) => {
                    tracing::debug!("Store closed, ending subscription to {}", target);
                    return;
                }
            }
        }

        // A batch emits one notice per document; one re-read covers all of them.
        loop {
            match changes.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }
}

/// Disposer for one subscription. Disposal is idempotent and also happens on drop.
pub struct Subscription {
    label: String,
    active: Arc<Mutex<bool>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Returns once no callback is running; none will run afterwards.
    pub fn dispose(&mut self) {
        *self.active.lock() = false;
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("Disposed subscription to {}", self.label);
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
