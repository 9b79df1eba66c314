pub mod config;
pub mod document;
pub mod memory_store;
pub mod paths;
pub mod sqlite_store;

pub use document::{
    ChangeNotice, Document, DocumentStore, Fields, SetMode, SharedStore, StoreError, WriteBatch,
    WriteOp, encode,
};
#[cfg(test)]
pub use document::MockDocumentStore;
pub use memory_store::MemoryStore;
pub use paths::{CollectionPath, DocumentPath};
pub use sqlite_store::SqliteStore;
