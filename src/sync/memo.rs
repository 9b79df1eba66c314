//! Per-month collaborative memo editor state.
//!
//! Local edits are coalesced by a single debounce timer into one upsert of the
//! month's memo document. Remote snapshots replace the editable content unless
//! the user is focused in the editor, in which case the latest remote value is
//! held back until the editor is blurred with no save pending. The buffer owns
//! its subscription and timer; dropping or disposing it cancels both.

use parking_lot::Mutex;
use serde_json::Value;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::access::Mutation;
use crate::calendar::YearMonth;
use crate::input::formatting::{FormatCommand, FormatError, apply_format, strip_html};
use crate::storage::config::MemoConfig;
use crate::storage::{DocumentPath, Fields, SetMode, SharedStore, paths};
use crate::sync::channel::{Subscription, SyncChannel};
use crate::sync::write_errors::WriteErrorSink;

pub const CONTENT_FIELD: &str = "content";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoError {
    #[error("Memo is read-only for viewers")]
    ReadOnly,
    #[error("Memo has not loaded yet")]
    Loading,
    #[error(transparent)]
    Format(#[from] FormatError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoTimings {
    pub debounce: Duration,
    pub saving_indicator: Duration,
}

impl Default for MemoTimings {
    fn default() -> Self {
        Self::from(&MemoConfig::default())
    }
}

impl From<&MemoConfig> for MemoTimings {
    fn from(config: &MemoConfig) -> Self {
        Self {
            debounce: config.debounce(),
            saving_indicator: config.saving_indicator(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteResolution {
    Apply,
    Defer,
}

/// Remote wins unless an editor who can type is focused.
pub fn resolve_remote_update(focused: bool, can_edit: bool) -> RemoteResolution {
    if focused && can_edit {
        RemoteResolution::Defer
    } else {
        RemoteResolution::Apply
    }
}

#[derive(Debug, Default)]
struct MemoState {
    content: String,
    remote_content: String,
    deferred_remote: Option<String>,
    focused: bool,
    loading: bool,
    saving: bool,
    save_generation: u64,
    pending_save: Option<JoinHandle<()>>,
    disposed: bool,
}

impl MemoState {
    /// Returns true for the snapshot that ends loading.
    fn receive_remote(&mut self, remote: String, can_edit: bool) -> bool {
        if self.disposed {
            return false;
        }
        let first = std::mem::replace(&mut self.loading, false);
        self.remote_content = remote.clone();
        if first {
            self.content = remote;
            self.deferred_remote = None;
            return true;
        }
        match resolve_remote_update(self.focused, can_edit) {
            RemoteResolution::Apply => {
                self.content = remote;
                self.deferred_remote = None;
            }
            RemoteResolution::Defer => {
                tracing::debug!("Deferring remote memo update while editor is focused");
                self.deferred_remote = Some(remote);
            }
        }
        false
    }
}

#[derive(Clone)]
struct MemoWriter {
    store: SharedStore,
    path: DocumentPath,
    timings: MemoTimings,
    errors: WriteErrorSink,
    state: Arc<Mutex<MemoState>>,
}

impl MemoWriter {
    async fn save(&self) {
        let (content, generation) = {
            let mut state = self.state.lock();
            state.pending_save = None;
            if state.disposed {
                tracing::debug!("Dropping memo save for disposed buffer {}", self.path);
                return;
            }
            // Our write supersedes anything held back; the store keeps the last writer.
            state.deferred_remote = None;
            state.save_generation += 1;
            state.saving = true;
            (state.content.clone(), state.save_generation)
        };

        let mut fields = Fields::new();
        fields.insert(CONTENT_FIELD.to_string(), Value::String(content));
        if let Err(e) = self.store.set(&self.path, fields, SetMode::Merge).await {
            self.errors.report(Mutation::WriteMemo, self.path.as_str(), &e);
        }

        let state = self.state.clone();
        let linger = self.timings.saving_indicator;
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            let mut state = state.lock();
            if state.save_generation == generation {
                state.saving = false;
            }
        });
    }
}

pub struct MemoSyncBuffer {
    month: YearMonth,
    can_edit: bool,
    writer: MemoWriter,
    loaded: Arc<Notify>,
    subscription: Subscription,
}

impl MemoSyncBuffer {
    pub fn open(
        channel: &SyncChannel,
        calendar_id: &str,
        month: YearMonth,
        can_edit: bool,
        timings: MemoTimings,
        errors: WriteErrorSink,
    ) -> Self {
        let path = paths::monthly_memo(calendar_id, month);
        let state = Arc::new(Mutex::new(MemoState {
            loading: true,
            ..MemoState::default()
        }));

        let loaded = Arc::new(Notify::new());
        let inbound = state.clone();
        let on_loaded = loaded.clone();
        let subscription = channel.subscribe_document(path.clone(), move |doc| {
            let remote = doc
                .and_then(|doc| doc.str_field(CONTENT_FIELD).map(str::to_string))
                .unwrap_or_default();
            let first = inbound.lock().receive_remote(remote, can_edit);
            if first {
                on_loaded.notify_one();
            }
        });

        tracing::debug!("Opened memo buffer for {}", path);
        Self {
            month,
            can_edit,
            writer: MemoWriter {
                store: channel.store().clone(),
                path,
                timings,
                errors,
                state,
            },
            loaded,
            subscription,
        }
    }

    /// Resolves once the stored memo has been delivered.
    pub async fn wait_loaded(&self) {
        if self.is_loading() {
            self.loaded.notified().await;
        }
    }

    pub fn month(&self) -> YearMonth {
        self.month
    }

    pub fn path(&self) -> &DocumentPath {
        &self.writer.path
    }

    pub fn can_edit(&self) -> bool {
        self.can_edit
    }

    /// The visible editable content.
    pub fn content(&self) -> String {
        self.writer.state.lock().content.clone()
    }

    /// Latest value seen from the store, applied or not.
    pub fn remote_content(&self) -> String {
        self.writer.state.lock().remote_content.clone()
    }

    pub fn plain_text(&self) -> String {
        strip_html(&self.content())
    }

    pub fn is_loading(&self) -> bool {
        self.writer.state.lock().loading
    }

    pub fn is_saving(&self) -> bool {
        self.writer.state.lock().saving
    }

    pub fn is_focused(&self) -> bool {
        self.writer.state.lock().focused
    }

    pub fn has_pending_save(&self) -> bool {
        self.writer.state.lock().pending_save.is_some()
    }

    /// Editing only starts once the stored memo has arrived.
    pub fn focus(&self) {
        if !self.can_edit {
            return;
        }
        let mut state = self.writer.state.lock();
        if !state.loading {
            state.focused = true;
        }
    }

    pub fn blur(&self) {
        let mut state = self.writer.state.lock();
        state.focused = false;
        if state.pending_save.is_none()
            && let Some(remote) = state.deferred_remote.take()
        {
            state.content = remote;
        }
    }

    /// Replaces the editable content and (re)arms the debounce timer.
    pub fn edit(&self, content: impl Into<String>) {
        if !self.can_edit {
            tracing::debug!("Ignoring memo edit from viewer");
            return;
        }
        let mut state = self.writer.state.lock();
        if state.disposed {
            return;
        }
        if state.loading {
            tracing::debug!("Ignoring memo edit before first load");
            return;
        }
        state.content = content.into();
        self.arm_debounce(&mut state);
    }

    /// Applies a formatting command to a byte range of the content; counts as an edit.
    pub fn format(&self, command: FormatCommand, selection: Range<usize>) -> Result<(), MemoError> {
        if !self.can_edit {
            return Err(MemoError::ReadOnly);
        }
        let mut state = self.writer.state.lock();
        if state.disposed {
            return Ok(());
        }
        if state.loading {
            return Err(MemoError::Loading);
        }
        state.content = apply_format(&state.content, selection, command)?;
        self.arm_debounce(&mut state);
        Ok(())
    }

    /// Writes immediately if a debounced save is pending.
    pub async fn flush(&self) {
        let pending = self.writer.state.lock().pending_save.take();
        if let Some(timer) = pending {
            timer.abort();
            self.writer.save().await;
        }
    }

    /// Stops the subscription and cancels any pending save. Idempotent.
    pub fn dispose(&mut self) {
        self.subscription.dispose();
        let mut state = self.writer.state.lock();
        state.disposed = true;
        if let Some(timer) = state.pending_save.take() {
            timer.abort();
            tracing::debug!("Cancelled pending memo save for {}", self.writer.path);
        }
    }

    fn arm_debounce(&self, state: &mut MemoState) {
        if let Some(previous) = state.pending_save.take() {
            previous.abort();
        }
        let writer = self.writer.clone();
        state.pending_save = Some(tokio::spawn(async move {
            tokio::time::sleep(writer.timings.debounce).await;
            writer.save().await;
        }));
    }
}

impl Drop for MemoSyncBuffer {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        ChangeNotice, DocumentStore, MemoryStore, MockDocumentStore, StoreError,
    };
    use crate::test_support::settle;
    use serde_json::json;
    use tokio::sync::broadcast;
    use tokio::time::sleep;

    fn month() -> YearMonth {
        YearMonth::new(2025, 1).unwrap()
    }

    fn memo_path() -> DocumentPath {
        paths::monthly_memo("c1", month())
    }

    fn open(store: &Arc<MemoryStore>, can_edit: bool) -> MemoSyncBuffer {
        let shared: SharedStore = store.clone();
        MemoSyncBuffer::open(
            &SyncChannel::new(shared),
            "c1",
            month(),
            can_edit,
            MemoTimings::default(),
            WriteErrorSink::new(),
        )
    }

    fn writes_to_memo(changes: &mut broadcast::Receiver<ChangeNotice>) -> usize {
        let mut count = 0;
        while let Ok(notice) = changes.try_recv() {
            if notice.path == memo_path() {
                count += 1;
            }
        }
        count
    }

    async fn remote_write(store: &MemoryStore, content: &str) {
        store
            .set(
                &memo_path(),
                json!({ "content": content }).as_object().cloned().unwrap(),
                SetMode::Merge,
            )
            .await
            .unwrap();
    }

    async fn stored_content(store: &MemoryStore) -> Option<String> {
        store
            .get(&memo_path())
            .await
            .unwrap()
            .and_then(|doc| doc.str_field(CONTENT_FIELD).map(str::to_string))
    }

    #[test]
    fn focused_editor_defers_remote() {
        assert_eq!(resolve_remote_update(true, true), RemoteResolution::Defer);
        assert_eq!(resolve_remote_update(false, true), RemoteResolution::Apply);
        assert_eq!(resolve_remote_update(true, false), RemoteResolution::Apply);
    }

    #[tokio::test(start_paused = true)]
    async fn loads_existing_content() {
        let store = Arc::new(MemoryStore::new());
        remote_write(&store, "<b>Rent</b> due").await;

        let memo = open(&store, true);
        assert!(memo.is_loading());
        settle().await;

        assert!(!memo.is_loading());
        assert_eq!(memo.content(), "<b>Rent</b> due");
        assert!(memo.plain_text().contains("Rent"));
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_coalesces_into_one_write() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;
        let mut changes = store.changes();

        memo.focus();
        for (i, text) in ["a", "ab", "abc", "abcd"].iter().enumerate() {
            if i > 0 {
                sleep(Duration::from_millis(400)).await;
            }
            memo.edit(*text);
        }
        sleep(Duration::from_millis(1400)).await;
        assert_eq!(writes_to_memo(&mut changes), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(writes_to_memo(&mut changes), 1);
        assert_eq!(stored_content(&store).await.as_deref(), Some("abcd"));
    }

    #[tokio::test(start_paused = true)]
    async fn edits_further_apart_than_debounce_write_separately() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;
        let mut changes = store.changes();

        memo.edit("first");
        sleep(Duration::from_millis(1600)).await;
        memo.edit("second");
        sleep(Duration::from_millis(1600)).await;

        assert_eq!(writes_to_memo(&mut changes), 2);
        assert_eq!(stored_content(&store).await.as_deref(), Some("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_update_is_suppressed_while_focused() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;

        memo.focus();
        memo.edit("typing…");
        remote_write(&store, "from elsewhere").await;
        settle().await;

        assert_eq!(memo.content(), "typing…");
        assert_eq!(memo.remote_content(), "from elsewhere");
    }

    #[tokio::test(start_paused = true)]
    async fn remote_update_applies_when_unfocused() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;

        remote_write(&store, "from elsewhere").await;
        settle().await;

        assert_eq!(memo.content(), "from elsewhere");
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_remote_applies_on_idle_blur() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;

        memo.focus();
        remote_write(&store, "remote").await;
        settle().await;
        assert_eq!(memo.content(), "");

        memo.blur();

        assert_eq!(memo.content(), "remote");
    }

    #[tokio::test(start_paused = true)]
    async fn blur_with_pending_save_keeps_local_content() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;

        memo.focus();
        memo.edit("local");
        remote_write(&store, "remote").await;
        settle().await;
        memo.blur();
        assert_eq!(memo.content(), "local");

        sleep(Duration::from_millis(1600)).await;

        assert_eq!(stored_content(&store).await.as_deref(), Some("local"));
        assert_eq!(memo.content(), "local");
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_buffer_is_read_only() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, false);
        settle().await;
        let mut changes = store.changes();

        memo.focus();
        memo.edit("sneaky");
        let formatted = memo.format(FormatCommand::Bold, 0..0);
        sleep(Duration::from_millis(2000)).await;

        assert_eq!(formatted, Err(MemoError::ReadOnly));
        assert!(!memo.is_focused());
        assert!(!memo.has_pending_save());
        assert_eq!(writes_to_memo(&mut changes), 0);
        assert_eq!(memo.content(), "");

        remote_write(&store, "owner wrote").await;
        settle().await;
        assert_eq!(memo.content(), "owner wrote");
    }

    #[tokio::test(start_paused = true)]
    async fn formatting_counts_as_an_edit() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;

        memo.edit("pack bags");
        memo.format(FormatCommand::Bold, 0..4).unwrap();
        sleep(Duration::from_millis(1600)).await;

        assert_eq!(stored_content(&store).await.as_deref(), Some("<b>pack</b> bags"));
    }

    #[tokio::test(start_paused = true)]
    async fn saving_indicator_lingers_after_write() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;

        memo.edit("x");
        sleep(Duration::from_millis(1510)).await;
        assert!(memo.is_saving());

        sleep(Duration::from_millis(300)).await;
        assert!(memo.is_saving());

        sleep(Duration::from_millis(300)).await;
        assert!(!memo.is_saving());
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_cancels_pending_save() {
        let store = Arc::new(MemoryStore::new());
        let mut memo = open(&store, true);
        settle().await;
        let mut changes = store.changes();

        memo.edit("never saved");
        memo.dispose();
        sleep(Duration::from_millis(2000)).await;

        assert_eq!(writes_to_memo(&mut changes), 0);
        assert_eq!(stored_content(&store).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_writes_immediately() {
        let store = Arc::new(MemoryStore::new());
        let memo = open(&store, true);
        settle().await;

        memo.edit("now");
        memo.flush().await;

        assert!(!memo.has_pending_save());
        assert_eq!(stored_content(&store).await.as_deref(), Some("now"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_reported_and_swallowed() {
        let (notifier, _) = broadcast::channel(16);
        let mut mock = MockDocumentStore::new();
        mock.expect_changes().returning(move || notifier.subscribe());
        mock.expect_get().returning(|_| Ok(None));
        mock.expect_set()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Unavailable("offline".to_string())));
        let errors = WriteErrorSink::new();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let recorder = failures.clone();
        errors.set_hook(Arc::new(move |failure: &crate::sync::WriteFailure| {
            recorder.lock().push(failure.mutation);
        }));
        let memo = MemoSyncBuffer::open(
            &SyncChannel::new(Arc::new(mock)),
            "c1",
            month(),
            true,
            MemoTimings::default(),
            errors,
        );
        settle().await;

        memo.edit("lost");
        sleep(Duration::from_millis(1600)).await;

        assert_eq!(*failures.lock(), vec![Mutation::WriteMemo]);
        assert_eq!(memo.content(), "lost");
    }

    #[tokio::test(start_paused = true)]
    async fn focus_before_first_load_does_not_hide_stored_memo() {
        let store = Arc::new(MemoryStore::new());
        remote_write(&store, "important existing memo").await;

        let memo = open(&store, true);
        memo.focus();
        settle().await;

        assert!(!memo.is_focused());
        assert_eq!(memo.content(), "important existing memo");

        memo.focus();
        memo.edit(memo.content() + "x");
        sleep(Duration::from_millis(1600)).await;

        assert_eq!(
            stored_content(&store).await.as_deref(),
            Some("important existing memox")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn edits_before_first_load_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        remote_write(&store, "important existing memo").await;
        let mut changes = store.changes();

        let memo = open(&store, true);
        memo.edit("new text");
        assert!(!memo.has_pending_save());
        assert_eq!(memo.format(FormatCommand::Bold, 0..3), Err(MemoError::Loading));

        settle().await;
        assert_eq!(memo.content(), "important existing memo");

        sleep(Duration::from_millis(1600)).await;
        assert_eq!(writes_to_memo(&mut changes), 0);
        assert_eq!(
            stored_content(&store).await.as_deref(),
            Some("important existing memo")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn wait_loaded_resolves_after_first_snapshot() {
        let store = Arc::new(MemoryStore::new());
        remote_write(&store, "draft").await;

        let memo = open(&store, true);
        memo.wait_loaded().await;

        assert!(!memo.is_loading());
        assert_eq!(memo.content(), "draft");
        // Already loaded: returns straight away.
        memo.wait_loaded().await;
    }

    #[test]
    fn disposed_state_ignores_remote_snapshots() {
        let mut state = MemoState {
            content: "local".to_string(),
            loading: true,
            disposed: true,
            ..MemoState::default()
        };

        assert!(!state.receive_remote("remote".to_string(), true));
        assert_eq!(state.content, "local");
        assert_eq!(state.remote_content, "");
        assert!(state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn save_after_dispose_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut memo = open(&store, true);
        settle().await;
        memo.edit("too late");
        let writer = memo.writer.clone();

        memo.dispose();
        writer.save().await;

        assert_eq!(stored_content(&store).await, None);
        assert!(!memo.is_saving());
    }
}
