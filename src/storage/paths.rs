//! Slash-separated document store paths and the calendar's store layout.
//!
//! Collections sit at odd segment counts (`calendars`, `calendars/c1/events`),
//! documents at even ones (`calendars/c1`, `calendars/c1/events/e1`).

use std::fmt;

use crate::calendar::YearMonth;
use crate::storage::document::StoreError;

pub const CALENDARS: &str = "calendars";
pub const LEGENDS: &str = "legends";
pub const EVENTS: &str = "events";
pub const MONTHLY_MEMOS: &str = "monthlyMemos";
pub const ALLOWED_USERS: &str = "allowedUsers";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath(String);

fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.iter().any(|part| part.trim().is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(parts)
}

impl CollectionPath {
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        if segments(path)?.len() % 2 == 1 {
            Ok(Self(path.to_string()))
        } else {
            Err(StoreError::InvalidPath(path.to_string()))
        }
    }

    pub fn root(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Document `id` inside this collection. Ids never contain `/`.
    pub fn doc(&self, id: &str) -> DocumentPath {
        DocumentPath(format!("{}/{}", self.0, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl DocumentPath {
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        if segments(path)?.len() % 2 == 0 {
            Ok(Self(path.to_string()))
        } else {
            Err(StoreError::InvalidPath(path.to_string()))
        }
    }

    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath(format!("{}/{}", self.0, name))
    }

    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }

    pub fn id(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, id)| id).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn calendars() -> CollectionPath {
    CollectionPath::root(CALENDARS)
}

pub fn calendar(calendar_id: &str) -> DocumentPath {
    calendars().doc(calendar_id)
}

pub fn legends(calendar_id: &str) -> CollectionPath {
    calendar(calendar_id).collection(LEGENDS)
}

pub fn events(calendar_id: &str) -> CollectionPath {
    calendar(calendar_id).collection(EVENTS)
}

pub fn allowed_users(calendar_id: &str) -> CollectionPath {
    calendar(calendar_id).collection(ALLOWED_USERS)
}

pub fn monthly_memo(calendar_id: &str, month: YearMonth) -> DocumentPath {
    calendar(calendar_id)
        .collection(MONTHLY_MEMOS)
        .doc(&month.memo_key())
}
