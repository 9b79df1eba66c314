pub mod access;
pub mod app;
pub mod calendar;
pub mod input;
pub mod route;
pub mod storage;
pub mod sync;
pub mod ui;

pub use access::{AccessPolicy, Identity, Mutation};
pub use app::{CalendarSession, SessionError, SessionOptions};
pub use calendar::{Event, Legend, YearMonth};
pub use storage::{DocumentStore, MemoryStore, SharedStore, SqliteStore};
pub use sync::{EventStore, MemoSyncBuffer, SyncChannel};
