//! `/c/{calendarId}` addressing for calendars.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::access::Identity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Invalid calendar id: {0:?}")]
    InvalidCalendarId(String),
}

/// A calendar id names one document under `calendars`, so it may not be
/// blank or contain a path separator.
pub fn is_valid_calendar_id(id: &str) -> bool {
    !id.trim().is_empty() && !id.contains('/')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Calendar(String),
    /// Anything else lands on the identity's own calendar.
    Home,
}

impl Route {
    pub fn parse(path: &str) -> Self {
        static CALENDAR_RE: OnceLock<Regex> = OnceLock::new();
        let regex = CALENDAR_RE
            .get_or_init(|| Regex::new(r"^/c/([^/?#]+)/?(?:[?#].*)?$").expect("invalid route regex"));

        let Some(raw) = regex.captures(path.trim()).and_then(|caps| caps.get(1)) else {
            return Route::Home;
        };
        match urlencoding::decode(raw.as_str()) {
            Ok(id) if is_valid_calendar_id(&id) => Route::Calendar(id.into_owned()),
            Ok(id) => {
                tracing::warn!("Rejecting calendar id {:?} from {}", id, path);
                Route::Home
            }
            Err(e) => {
                tracing::warn!("Undecodable calendar id in {}: {}", path, e);
                Route::Home
            }
        }
    }

    pub fn calendar_id(&self, identity: &Identity) -> String {
        match self {
            Route::Calendar(id) => id.clone(),
            Route::Home => identity.uid.clone(),
        }
    }
}

pub fn calendar_path(calendar_id: &str) -> String {
    format!("/c/{}", urlencoding::encode(calendar_id))
}

/// Accepts either a route path or a bare calendar id.
pub fn resolve_calendar_id(target: Option<&str>, identity: &Identity) -> Result<String, RouteError> {
    match target.map(str::trim) {
        Some(path) if path.starts_with('/') => Ok(Route::parse(path).calendar_id(identity)),
        Some(id) if is_valid_calendar_id(id) => Ok(id.to_string()),
        Some(id) if !id.is_empty() => Err(RouteError::InvalidCalendarId(id.to_string())),
        _ => Ok(identity.uid.clone()),
    }
}
