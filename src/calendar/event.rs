use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::day::deserialize_day;
use crate::storage::{Document, Fields, StoreError, encode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(skip)]
    pub id: String,
    #[serde(deserialize_with = "deserialize_day")]
    pub start_date: NaiveDate,
    #[serde(deserialize_with = "deserialize_day")]
    pub end_date: NaiveDate,
    pub legend_id: String,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, legend_id: &str, created_by: &str) -> Self {
        Self {
            id: String::new(),
            start_date,
            end_date,
            legend_id: legend_id.to_string(),
            memo: String::new(),
            created_by: created_by.to_string(),
            created_at: Some(Utc::now()),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        let mut event: Event = doc.decode()?;
        event.id = doc.id.clone();
        Ok(event)
    }

    pub fn to_fields(&self) -> Result<Fields, StoreError> {
        encode(self)
    }

    /// Inclusive on both ends.
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }

    pub fn duration_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

/// Date fields written when an event is repositioned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeUpdate {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
