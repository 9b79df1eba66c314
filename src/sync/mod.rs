pub mod channel;
pub mod event_store;
pub mod memo;
pub mod write_errors;

pub use channel::{Subscription, SyncChannel};
pub use event_store::{EventStore, SharedEventStore};
pub use memo::{MemoError, MemoSyncBuffer, MemoTimings};
pub use write_errors::{WriteErrorHook, WriteErrorSink, WriteFailure};
