use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::calendar::{Event, Legend};
use crate::storage::Document;

pub type SharedEventStore = Arc<RwLock<EventStore>>;

/// In-memory projection of a calendar's legends and events, replaced
/// wholesale by each subscription snapshot.
#[derive(Debug, Clone, Default)]
pub struct EventStore {
    legends: BTreeMap<String, Legend>,
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedEventStore {
        Arc::new(RwLock::new(Self::new()))
    }

    pub fn replace_legends(&mut self, documents: &[Document]) {
        self.legends = documents
            .iter()
            .filter_map(|doc| match Legend::from_document(doc) {
                Ok(legend) => Some((legend.id.clone(), legend)),
                Err(e) => {
                    tracing::warn!("Skipping malformed legend {}: {}", doc.id, e);
                    None
                }
            })
            .collect();
    }

    /// Events whose dates cannot be read are left out of the projection.
    pub fn replace_events(&mut self, documents: &[Document]) {
        self.events = documents
            .iter()
            .filter_map(|doc| match Event::from_document(doc) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!("Skipping malformed event {}: {}", doc.id, e);
                    None
                }
            })
            .collect();
        self.events
            .sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id)));
    }

    pub fn legends(&self) -> impl Iterator<Item = &Legend> {
        self.legends.values()
    }

    pub fn legend(&self, legend_id: &str) -> Option<&Legend> {
        self.legends.get(legend_id)
    }

    pub fn has_legend(&self, legend_id: &str) -> bool {
        self.legends.contains_key(legend_id)
    }

    /// The event's legend, or the `?` placeholder for dangling references.
    pub fn resolve_legend(&self, legend_id: &str) -> Legend {
        self.legends
            .get(legend_id)
            .cloned()
            .unwrap_or_else(Legend::placeholder)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn events_with_legend(&self, legend_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|event| event.legend_id == legend_id)
            .collect()
    }

    /// Events covering `day`, ordered by start date, each with its legend.
    pub fn occupancy(&self, day: NaiveDate) -> Vec<(Event, Legend)> {
        self.events
            .iter()
            .filter(|event| event.covers(day))
            .map(|event| (event.clone(), self.resolve_legend(&event.legend_id)))
            .collect()
    }
}
