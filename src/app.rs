use chrono::{NaiveDate, Weekday};
use serde_json::Value;
use std::ops::Range;
use thiserror::Error;

use crate::access::{AccessPolicy, Identity, Mutation, resolve_display_name};
use crate::calendar::{CalendarInfo, DEFAULT_LEGEND_COLOR, DateRangeUpdate, Event, Legend, YearMonth};
use crate::input::{
    ConfirmAction, ConfirmRequest, FormatCommand, SelectionIntent, SelectionMachine,
};
use crate::route::{RouteError, is_valid_calendar_id};
use crate::storage::config::{Config, ConfigError};
use crate::storage::{DocumentPath, Fields, SharedStore, StoreError, WriteBatch, paths};
use crate::sync::{
    EventStore, MemoError, MemoSyncBuffer, MemoTimings, SharedEventStore, Subscription,
    SyncChannel, WriteErrorHook, WriteErrorSink,
};
use crate::ui::month_view::{MonthLayout, calculate_layout};

/// Months shown side by side.
pub const VISIBLE_MONTHS: usize = 2;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),
    #[error(transparent)]
    InvalidCalendarId(#[from] RouteError),
    #[error("Malformed calendar document: {0}")]
    MalformedCalendar(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub visible_month: YearMonth,
    pub first_weekday: Weekday,
    pub timings: MemoTimings,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            visible_month: YearMonth::current(),
            first_weekday: Weekday::Sun,
            timings: MemoTimings::default(),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        Ok(Self {
            first_weekday: config.ui.first_weekday()?,
            timings: MemoTimings::from(&config.memo),
            ..Self::default()
        })
    }

    pub fn with_month(mut self, month: YearMonth) -> Self {
        self.visible_month = month;
        self
    }
}

/// State held by one viewer while a calendar is open.
pub struct CalendarSession {
    calendar_id: String,
    info: CalendarInfo,
    display_name: String,
    policy: AccessPolicy,
    channel: SyncChannel,
    events: SharedEventStore,
    selection: SelectionMachine,
    confirm: Option<ConfirmRequest>,
    options: SessionOptions,
    memo: Option<MemoSyncBuffer>,
    subscriptions: Vec<Subscription>,
    errors: WriteErrorSink,
}

impl CalendarSession {
    pub async fn open(
        store: SharedStore,
        calendar_id: &str,
        identity: &Identity,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        if !is_valid_calendar_id(calendar_id) {
            return Err(RouteError::InvalidCalendarId(calendar_id.to_string()).into());
        }
        let info: CalendarInfo = store
            .get(&paths::calendar(calendar_id))
            .await?
            .ok_or_else(|| SessionError::CalendarNotFound(calendar_id.to_string()))?
            .decode()?;
        let policy = AccessPolicy::evaluate(identity, &info.creator_uid);
        let display_name = resolve_display_name(store.as_ref(), calendar_id, identity).await;

        let channel = SyncChannel::new(store);
        let events = EventStore::shared();

        let legend_sink = events.clone();
        let legends = channel.subscribe(paths::legends(calendar_id), move |docs| {
            legend_sink.write().replace_legends(&docs);
        });
        let event_sink = events.clone();
        let event_docs = channel.subscribe(paths::events(calendar_id), move |docs| {
            event_sink.write().replace_events(&docs);
        });

        let errors = WriteErrorSink::new();
        let memo = MemoSyncBuffer::open(
            &channel,
            calendar_id,
            options.visible_month,
            policy.is_owner(),
            options.timings,
            errors.clone(),
        );

        tracing::info!(
            owner = policy.is_owner(),
            "Opened calendar {} ({}) as {}",
            calendar_id,
            info.name,
            identity.uid
        );

        Ok(Self {
            calendar_id: calendar_id.to_string(),
            info,
            display_name,
            policy,
            channel,
            events,
            selection: SelectionMachine::new(),
            confirm: None,
            options,
            memo: Some(memo),
            subscriptions: vec![legends, event_docs],
            errors,
        })
    }

    /// Reads legends and events straight from the store instead of waiting for
    /// the next subscription delivery.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let store = self.channel.store();
        let legends = store.list(&paths::legends(&self.calendar_id)).await?;
        let events = store.list(&paths::events(&self.calendar_id)).await?;

        let mut projection = self.events.write();
        projection.replace_legends(&legends);
        projection.replace_events(&events);
        Ok(())
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }

    pub fn info(&self) -> &CalendarInfo {
        &self.info
    }

    pub fn policy(&self) -> AccessPolicy {
        self.policy
    }

    pub fn is_owner(&self) -> bool {
        self.policy.is_owner()
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn event_store(&self) -> SharedEventStore {
        self.events.clone()
    }

    pub fn legends(&self) -> Vec<Legend> {
        self.events.read().legends().cloned().collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().events().to_vec()
    }

    pub fn occupancy(&self, day: NaiveDate) -> Vec<(Event, Legend)> {
        self.events.read().occupancy(day)
    }

    pub fn selection(&self) -> &SelectionMachine {
        &self.selection
    }

    pub fn pending_confirm(&self) -> Option<&ConfirmRequest> {
        self.confirm.as_ref()
    }

    pub fn visible_month(&self) -> YearMonth {
        self.options.visible_month
    }

    pub fn visible_months(&self) -> [YearMonth; VISIBLE_MONTHS] {
        let first = self.options.visible_month;
        [first, first.offset(1)]
    }

    pub fn month_layouts(&self, today: NaiveDate) -> Vec<MonthLayout> {
        let events = self.events.read();
        self.visible_months()
            .into_iter()
            .map(|month| {
                calculate_layout(month, self.options.first_weekday, &events, &self.selection, today)
            })
            .collect()
    }

    pub fn memo(&self) -> Option<&MemoSyncBuffer> {
        self.memo.as_ref()
    }

    pub fn on_write_error(&self, hook: WriteErrorHook) {
        self.errors.set_hook(hook);
    }

    /// Feeds a day-cell click to the gesture. A completed reposition is
    /// written before returning.
    pub async fn activate_day(&mut self, day: NaiveDate) -> Option<SelectionIntent> {
        let intent = self.selection.activate(day);
        if let Some(SelectionIntent::Reposition { event_id, start, end }) = &intent {
            self.reposition_event(event_id, *start, *end).await;
        }
        intent
    }

    /// Completes a pending range with `legend_id`, returning the new event id.
    pub async fn choose_legend(&mut self, legend_id: &str) -> Option<String> {
        match self.selection.choose_legend(legend_id)? {
            SelectionIntent::Create { start, end, legend_id } => {
                self.create_event(start, end, &legend_id).await
            }
            _ => None,
        }
    }

    pub fn cancel_selection(&mut self) {
        self.selection.cancel();
    }

    pub fn dismiss_legend_prompt(&mut self) {
        self.selection.dismiss_legend_prompt();
    }

    /// Arms the gesture to move `event_id`; the next two clicks pick its new dates.
    pub fn start_edit(&mut self, event_id: &str) -> bool {
        let Some(event) = self.events.read().event(event_id).cloned() else {
            tracing::warn!("Cannot edit unknown event {}", event_id);
            return false;
        };
        self.selection.start_edit(event);
        true
    }

    async fn create_event(&self, start: NaiveDate, end: NaiveDate, legend_id: &str) -> Option<String> {
        if !self.policy.permits(Mutation::CreateEvent) {
            return None;
        }
        if !self.events.read().has_legend(legend_id) {
            tracing::warn!("Refusing to create event with unknown legend {}", legend_id);
            return None;
        }

        let collection = paths::events(&self.calendar_id);
        let event = Event::new(start, end, legend_id, &self.display_name);
        let result = match event.to_fields() {
            Ok(fields) => self.channel.store().add(&collection, fields).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(id) => {
                tracing::info!("Created event {} ({} to {})", id, start, end);
                Some(id)
            }
            Err(e) => {
                self.errors.report(Mutation::CreateEvent, collection.as_str(), &e);
                None
            }
        }
    }

    async fn reposition_event(&self, event_id: &str, start: NaiveDate, end: NaiveDate) {
        if !self.policy.permits(Mutation::UpdateEvent) {
            return;
        }
        let update = DateRangeUpdate { start_date: start, end_date: end };
        match crate::storage::encode(&update) {
            Ok(fields) => self.update_event(event_id, fields).await,
            Err(e) => self.errors.report(Mutation::UpdateEvent, event_id, &e),
        }
    }

    pub async fn reassign_legend(&self, event_id: &str, legend_id: &str) {
        if !self.policy.permits(Mutation::UpdateEvent) {
            return;
        }
        if !self.events.read().has_legend(legend_id) {
            tracing::warn!("Refusing to reassign {} to unknown legend {}", event_id, legend_id);
            return;
        }
        let mut fields = Fields::new();
        fields.insert("legendId".to_string(), Value::String(legend_id.to_string()));
        self.update_event(event_id, fields).await;
    }

    pub async fn save_event_memo(&self, event_id: &str, memo: &str) {
        if !self.policy.permits(Mutation::UpdateEvent) {
            return;
        }
        let mut fields = Fields::new();
        fields.insert("memo".to_string(), Value::String(memo.to_string()));
        self.update_event(event_id, fields).await;
    }

    async fn update_event(&self, event_id: &str, fields: Fields) {
        let path = self.event_path(event_id);
        match self.channel.store().update(&path, fields).await {
            Ok(()) => tracing::debug!("Updated event {}", event_id),
            Err(e) => self.errors.report(Mutation::UpdateEvent, path.as_str(), &e),
        }
    }

    /// Adds a legend; blank names are ignored and a missing color falls back to grey.
    pub async fn add_legend(&self, name: &str, color: Option<&str>) -> Option<String> {
        if !self.policy.permits(Mutation::AddLegend) {
            return None;
        }
        let legend = Legend::new(name, color.unwrap_or(DEFAULT_LEGEND_COLOR));
        if legend.name.is_empty() {
            tracing::debug!("Ignoring legend with blank name");
            return None;
        }

        let collection = paths::legends(&self.calendar_id);
        let result = match legend.to_fields() {
            Ok(fields) => self.channel.store().add(&collection, fields).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(id) => {
                tracing::info!("Added legend {} ({})", legend.name, id);
                Some(id)
            }
            Err(e) => {
                self.errors.report(Mutation::AddLegend, collection.as_str(), &e);
                None
            }
        }
    }

    pub fn request_delete_event(&mut self, event_id: &str) -> bool {
        let store = self.events.read();
        let Some(event) = store.event(event_id) else {
            return false;
        };
        let legend = store.resolve_legend(&event.legend_id);
        self.confirm = Some(ConfirmRequest::delete_event(event_id, &legend.name));
        true
    }

    pub fn request_delete_legend(&mut self, legend_id: &str) -> bool {
        let store = self.events.read();
        let Some(legend) = store.legend(legend_id) else {
            return false;
        };
        let in_use = store.events_with_legend(legend_id).len();
        self.confirm = Some(ConfirmRequest::delete_legend(legend_id, &legend.name, in_use));
        true
    }

    pub fn dismiss_confirm(&mut self) {
        self.confirm = None;
    }

    /// Runs the pending destructive action, if any.
    pub async fn confirm(&mut self) {
        let Some(request) = self.confirm.take() else {
            return;
        };
        match request.action {
            ConfirmAction::DeleteEvent { event_id } => self.delete_event(&event_id).await,
            ConfirmAction::DeleteLegend { legend_id } => self.delete_legend(&legend_id).await,
        }
    }

    async fn delete_event(&self, event_id: &str) {
        if !self.policy.permits(Mutation::DeleteEvent) {
            return;
        }
        let path = self.event_path(event_id);
        match self.channel.store().delete(&path).await {
            Ok(()) => tracing::info!("Deleted event {}", event_id),
            Err(e) => self.errors.report(Mutation::DeleteEvent, path.as_str(), &e),
        }
    }

    /// Removes the legend and every event tagged with it in one batch.
    async fn delete_legend(&self, legend_id: &str) {
        if !self.policy.permits(Mutation::DeleteLegend) {
            return;
        }
        let store = self.channel.store();
        let legend_path = paths::legends(&self.calendar_id).doc(legend_id);
        let tagged = match store
            .query_eq(
                &paths::events(&self.calendar_id),
                "legendId",
                &Value::String(legend_id.to_string()),
            )
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                self.errors.report(Mutation::DeleteLegend, legend_path.as_str(), &e);
                return;
            }
        };

        let mut batch = WriteBatch::new();
        for doc in &tagged {
            batch.delete(self.event_path(&doc.id));
        }
        batch.delete(legend_path.clone());

        match store.commit(batch).await {
            Ok(()) => tracing::info!(
                "Deleted legend {} and {} event(s)",
                legend_id,
                tagged.len()
            ),
            Err(e) => self.errors.report(Mutation::DeleteLegend, legend_path.as_str(), &e),
        }
    }

    pub fn edit_memo(&self, content: &str) {
        if !self.policy.permits(Mutation::WriteMemo) {
            return;
        }
        if let Some(memo) = &self.memo {
            memo.edit(content);
        }
    }

    pub fn format_memo(&self, command: FormatCommand, selection: Range<usize>) -> Result<(), MemoError> {
        if !self.policy.permits(Mutation::FormatMemo) {
            return Err(MemoError::ReadOnly);
        }
        match &self.memo {
            Some(memo) => memo.format(command, selection),
            None => Ok(()),
        }
    }

    /// Shifts the visible months. The memo editor is torn down before the
    /// next month's editor is armed.
    pub fn change_month(&mut self, delta: i32) {
        if let Some(mut memo) = self.memo.take() {
            memo.dispose();
        }
        self.options.visible_month = self.options.visible_month.offset(delta);
        self.memo = Some(MemoSyncBuffer::open(
            &self.channel,
            &self.calendar_id,
            self.options.visible_month,
            self.policy.is_owner(),
            self.options.timings,
            self.errors.clone(),
        ));
        tracing::debug!("Showing {}", self.options.visible_month);
    }

    /// Writes any pending memo edit, then tears the session down.
    pub async fn shutdown(&mut self) {
        if let Some(memo) = &self.memo {
            memo.flush().await;
        }
        self.close();
    }

    /// Disposes every subscription and cancels any pending memo save. Idempotent.
    pub fn close(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.dispose();
        }
        self.subscriptions.clear();
        if let Some(mut memo) = self.memo.take() {
            memo.dispose();
            tracing::debug!("Closed calendar {}", self.calendar_id);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.subscriptions.is_empty() && self.memo.is_none()
    }

    fn event_path(&self, event_id: &str) -> DocumentPath {
        paths::events(&self.calendar_id).doc(event_id)
    }
}

impl Drop for CalendarSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::create_calendar;
    use crate::storage::{
        ChangeNotice, Document, DocumentStore, MemoryStore, MockDocumentStore, SetMode,
    };
    use crate::sync::WriteFailure;
    use crate::test_support::settle;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn january() -> SessionOptions {
        SessionOptions::default().with_month(YearMonth::new(2025, 1).unwrap())
    }

    fn owner() -> Identity {
        Identity::new("u1", "Kim")
    }

    fn viewer() -> Identity {
        Identity::new("u2", "Lee")
    }

    async fn seeded_store() -> (Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let calendar_id = create_calendar(store.as_ref(), "Family", &owner()).await.unwrap();
        store
            .set(
                &paths::legends(&calendar_id).doc("1"),
                json!({"name": "Important", "color": "#e67c73"}).as_object().cloned().unwrap(),
                SetMode::Replace,
            )
            .await
            .unwrap();
        (store, calendar_id)
    }

    async fn open_as(store: &Arc<MemoryStore>, calendar_id: &str, identity: &Identity) -> CalendarSession {
        let session = CalendarSession::open(store.clone(), calendar_id, identity, january())
            .await
            .unwrap();
        settle().await;
        session
    }

    async fn add_event(store: &MemoryStore, calendar_id: &str, id: &str, legend_id: &str) {
        store
            .set(
                &paths::events(calendar_id).doc(id),
                json!({
                    "startDate": "2025-01-02",
                    "endDate": "2025-01-03",
                    "legendId": legend_id,
                    "memo": "",
                    "createdBy": "Kim",
                })
                .as_object()
                .cloned()
                .unwrap(),
                SetMode::Replace,
            )
            .await
            .unwrap();
    }

    async fn snapshot(store: &MemoryStore, calendar_id: &str) -> (Vec<Document>, Vec<Document>) {
        (
            store.list(&paths::legends(calendar_id)).await.unwrap(),
            store.list(&paths::events(calendar_id)).await.unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn two_clicks_and_a_legend_create_one_event() {
        let (store, calendar_id) = seeded_store().await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        assert_eq!(session.activate_day(date(5)).await, None);
        let prompt = session.activate_day(date(10)).await;
        assert_eq!(prompt, Some(SelectionIntent::PromptLegend { start: date(5), end: date(10) }));
        let created = session.choose_legend("1").await;
        settle().await;

        let events = session.events();
        assert_eq!(events.len(), 1);
        assert_eq!(Some(events[0].id.clone()), created);
        assert_eq!(events[0].start_date, date(5));
        assert_eq!(events[0].end_date, date(10));
        assert_eq!(events[0].legend_id, "1");
        assert_eq!(events[0].created_by, "Kim");

        let occupants = session.occupancy(date(7));
        assert_eq!(occupants.len(), 1);
        assert_eq!(occupants[0].1.name, "Important");
        assert!(session.occupancy(date(1)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_legend_does_not_create() {
        let (store, calendar_id) = seeded_store().await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        session.activate_day(date(5)).await;
        session.activate_day(date(6)).await;
        assert_eq!(session.choose_legend("missing").await, None);

        assert!(snapshot(&store, &calendar_id).await.1.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn viewer_gestures_write_nothing() {
        let (store, calendar_id) = seeded_store().await;
        add_event(&store, &calendar_id, "e1", "1").await;
        let before = snapshot(&store, &calendar_id).await;
        let mut session = open_as(&store, &calendar_id, &viewer()).await;
        assert!(!session.is_owner());

        session.activate_day(date(5)).await;
        let prompt = session.activate_day(date(10)).await;
        assert!(matches!(prompt, Some(SelectionIntent::PromptLegend { .. })));
        assert_eq!(session.choose_legend("1").await, None);

        assert_eq!(session.add_legend("Sneaky", None).await, None);
        assert!(session.request_delete_event("e1"));
        session.confirm().await;
        assert!(session.request_delete_legend("1"));
        session.confirm().await;
        session.reassign_legend("e1", "1").await;
        session.save_event_memo("e1", "note").await;
        session.edit_memo("memo");
        assert_eq!(session.format_memo(FormatCommand::Bold, 0..0), Err(MemoError::ReadOnly));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(snapshot(&store, &calendar_id).await, before);
        assert!(
            store
                .get(&paths::monthly_memo(&calendar_id, YearMonth::new(2025, 1).unwrap()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn edit_mode_moves_the_event_without_creating() {
        let (store, calendar_id) = seeded_store().await;
        add_event(&store, &calendar_id, "e1", "1").await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        assert!(session.start_edit("e1"));
        session.activate_day(date(20)).await;
        let intent = session.activate_day(date(18)).await;
        settle().await;

        assert!(matches!(intent, Some(SelectionIntent::Reposition { .. })));
        let events = session.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "e1");
        assert_eq!((events[0].start_date, events[0].end_date), (date(18), date(20)));
        assert!(!session.selection().is_editing());
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_a_legend_cascades_to_its_events() {
        let (store, calendar_id) = seeded_store().await;
        store
            .set(
                &paths::legends(&calendar_id).doc("2"),
                json!({"name": "Travel", "color": "#33b679"}).as_object().cloned().unwrap(),
                SetMode::Replace,
            )
            .await
            .unwrap();
        add_event(&store, &calendar_id, "a", "1").await;
        add_event(&store, &calendar_id, "b", "1").await;
        add_event(&store, &calendar_id, "c", "2").await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        assert!(session.request_delete_legend("1"));
        assert!(session.pending_confirm().unwrap().message.contains("2 event(s)"));
        session.confirm().await;
        settle().await;

        let (legends, events) = snapshot(&store, &calendar_id).await;
        assert_eq!(legends.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["2"]);
        assert_eq!(events.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec!["c"]);
        assert!(session.pending_confirm().is_none());
        assert_eq!(session.legends().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dismissed_confirmation_deletes_nothing() {
        let (store, calendar_id) = seeded_store().await;
        add_event(&store, &calendar_id, "e1", "1").await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        assert!(session.request_delete_event("e1"));
        session.dismiss_confirm();
        session.confirm().await;

        assert_eq!(snapshot(&store, &calendar_id).await.1.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_event_delete_removes_it() {
        let (store, calendar_id) = seeded_store().await;
        add_event(&store, &calendar_id, "e1", "1").await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        session.request_delete_event("e1");
        session.confirm().await;
        settle().await;

        assert!(session.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn event_detail_updates_reach_the_store() {
        let (store, calendar_id) = seeded_store().await;
        let travel = {
            let session = open_as(&store, &calendar_id, &owner()).await;
            session.add_legend("  Travel ", None).await.unwrap()
        };
        add_event(&store, &calendar_id, "e1", "1").await;
        let session = open_as(&store, &calendar_id, &owner()).await;

        session.reassign_legend("e1", &travel).await;
        session.reassign_legend("e1", "missing").await;
        session.save_event_memo("e1", "bring passports").await;
        settle().await;

        let event = session.event_store().read().event("e1").cloned().unwrap();
        assert_eq!(event.legend_id, travel);
        assert_eq!(event.memo, "bring passports");
        let legend = session.event_store().read().legend(&travel).cloned().unwrap();
        assert_eq!(legend.name, "Travel");
        assert_eq!(legend.color, DEFAULT_LEGEND_COLOR);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_legend_name_is_ignored() {
        let (store, calendar_id) = seeded_store().await;
        let session = open_as(&store, &calendar_id, &owner()).await;

        assert_eq!(session.add_legend("   ", Some("#000")).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_reads_without_waiting() {
        let (store, calendar_id) = seeded_store().await;
        let session = CalendarSession::open(store.clone(), &calendar_id, &owner(), january())
            .await
            .unwrap();

        session.refresh().await.unwrap();

        assert_eq!(session.legends().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn nested_path_is_not_a_calendar_id() {
        let (store, calendar_id) = seeded_store().await;
        add_event(&store, &calendar_id, "e1", "1").await;
        let nested = format!("{}/events/e1", calendar_id);

        let result = CalendarSession::open(store.clone(), &nested, &owner(), january()).await;

        assert!(matches!(
            result,
            Err(SessionError::InvalidCalendarId(RouteError::InvalidCalendarId(id))) if id == nested
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_calendar_is_an_error() {
        let store: SharedStore = Arc::new(MemoryStore::new());

        let result = CalendarSession::open(store, "nope", &owner(), january()).await;

        assert!(matches!(result, Err(SessionError::CalendarNotFound(id)) if id == "nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn changing_month_rearms_the_memo() {
        let (store, calendar_id) = seeded_store().await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        session.edit_memo("january notes");
        session.change_month(1);
        tokio::time::sleep(Duration::from_secs(2)).await;

        let january = paths::monthly_memo(&calendar_id, YearMonth::new(2025, 1).unwrap());
        assert!(store.get(&january).await.unwrap().is_none());
        assert_eq!(session.visible_months()[0], YearMonth::new(2025, 2).unwrap());
        assert_eq!(session.visible_months()[1], YearMonth::new(2025, 3).unwrap());
        assert_eq!(session.memo().unwrap().month(), YearMonth::new(2025, 2).unwrap());

        session.edit_memo("february notes");
        tokio::time::sleep(Duration::from_secs(2)).await;

        let february = paths::monthly_memo(&calendar_id, YearMonth::new(2025, 2).unwrap());
        let doc = store.get(&february).await.unwrap().unwrap();
        assert_eq!(doc.str_field("content"), Some("february notes"));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_memo() {
        let (store, calendar_id) = seeded_store().await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        session.edit_memo("last words");
        session.shutdown().await;

        let path = paths::monthly_memo(&calendar_id, YearMonth::new(2025, 1).unwrap());
        let doc = store.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.str_field("content"), Some("last words"));
        assert!(session.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_all_live_updates() {
        let (store, calendar_id) = seeded_store().await;
        let mut session = open_as(&store, &calendar_id, &owner()).await;

        session.edit_memo("discarded");
        session.close();
        session.close();
        add_event(&store, &calendar_id, "late", "1").await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(session.is_closed());
        assert!(session.events().is_empty());
        let path = paths::monthly_memo(&calendar_id, YearMonth::new(2025, 1).unwrap());
        assert!(store.get(&path).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn month_layouts_cover_two_months() {
        let (store, calendar_id) = seeded_store().await;
        add_event(&store, &calendar_id, "e1", "1").await;
        let session = open_as(&store, &calendar_id, &owner()).await;

        let layouts = session.month_layouts(date(15));

        assert_eq!(layouts.len(), VISIBLE_MONTHS);
        assert_eq!(layouts[1].month, YearMonth::new(2025, 2).unwrap());
        let busy = layouts[0]
            .weeks
            .iter()
            .flat_map(|w| &w.days)
            .filter(|c| c.has_events())
            .count();
        assert_eq!(busy, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn display_name_comes_from_allowed_users() {
        let (store, calendar_id) = seeded_store().await;
        store
            .set(
                &paths::allowed_users(&calendar_id).doc("u1"),
                json!({"name": "Kim (Mom)", "role": "admin"}).as_object().cloned().unwrap(),
                SetMode::Merge,
            )
            .await
            .unwrap();

        let session = open_as(&store, &calendar_id, &owner()).await;

        assert_eq!(session.display_name(), "Kim (Mom)");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_reaches_the_hook() {
        let (notifier, _) = broadcast::channel::<ChangeNotice>(16);
        let mut mock = MockDocumentStore::new();
        mock.expect_changes().returning(move || notifier.subscribe());
        mock.expect_get().returning(|path| {
            if *path == paths::calendar("c1") {
                Ok(Some(Document::new(
                    "c1",
                    json!({"name": "Family", "creatorUid": "u1"}).as_object().cloned().unwrap(),
                )))
            } else {
                Ok(None)
            }
        });
        mock.expect_list().returning(|path| {
            if *path == paths::legends("c1") {
                Ok(vec![Document::new(
                    "1",
                    json!({"name": "Important", "color": "#e67c73"}).as_object().cloned().unwrap(),
                )])
            } else {
                Ok(Vec::new())
            }
        });
        mock.expect_add()
            .times(1)
            .returning(|_, _| Err(StoreError::Unavailable("offline".to_string())));
        let mut session = CalendarSession::open(Arc::new(mock), "c1", &owner(), january())
            .await
            .unwrap();
        settle().await;
        let failures = Arc::new(Mutex::new(Vec::new()));
        let recorder = failures.clone();
        session.on_write_error(Arc::new(move |failure: &WriteFailure| {
            recorder.lock().push(failure.clone());
        }));

        session.activate_day(date(5)).await;
        session.activate_day(date(6)).await;
        assert_eq!(session.choose_legend("1").await, None);

        let failures = failures.lock();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].mutation, Mutation::CreateEvent);
        assert!(failures[0].message.contains("offline"));
    }
}
