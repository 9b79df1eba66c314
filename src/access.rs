//! Owner/viewer gate for every mutating entry point.
//!
//! Reads are never gated. Mutations short-circuit without side effects when
//! the identity is not the calendar owner; callers may still update local-only
//! UI state (selection highlight, dialog visibility) for visual feedback.

use crate::calendar::AllowedUser;
use crate::storage::{DocumentStore, paths};

/// The signed-in user as supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
    pub email: Option<String>,
}

impl Identity {
    pub fn new(uid: &str, display_name: &str) -> Self {
        Self {
            uid: uid.to_string(),
            display_name: display_name.to_string(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    AddLegend,
    DeleteLegend,
    WriteMemo,
    FormatMemo,
}

impl Mutation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateEvent => "create_event",
            Self::UpdateEvent => "update_event",
            Self::DeleteEvent => "delete_event",
            Self::AddLegend => "add_legend",
            Self::DeleteLegend => "delete_legend",
            Self::WriteMemo => "write_memo",
            Self::FormatMemo => "format_memo",
        }
    }
}

/// Pure ownership predicate: the identity owns the calendar it created.
pub fn is_owner(identity: &Identity, calendar_owner_id: &str) -> bool {
    !calendar_owner_id.is_empty() && identity.uid == calendar_owner_id
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessPolicy {
    is_owner: bool,
}

impl AccessPolicy {
    pub fn evaluate(identity: &Identity, calendar_owner_id: &str) -> Self {
        Self {
            is_owner: is_owner(identity, calendar_owner_id),
        }
    }

    pub fn owner() -> Self {
        Self { is_owner: true }
    }

    pub fn viewer() -> Self {
        Self { is_owner: false }
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Whether `mutation` may reach the store.
    pub fn permits(&self, mutation: Mutation) -> bool {
        if !self.is_owner {
            tracing::debug!(mutation = mutation.as_str(), "Mutation skipped for viewer");
        }
        self.is_owner
    }
}

/// Name used for `createdBy`: the calendar's allowed-user entry wins over the
/// identity's own display name.
pub async fn resolve_display_name(
    store: &dyn DocumentStore,
    calendar_id: &str,
    identity: &Identity,
) -> String {
    let path = paths::allowed_users(calendar_id).doc(&identity.uid);
    match store.get(&path).await {
        Ok(Some(doc)) => match doc.decode::<AllowedUser>() {
            Ok(user) if !user.name.trim().is_empty() => user.name,
            Ok(_) => identity.display_name.clone(),
            Err(e) => {
                tracing::warn!("Malformed allowed user {}: {}", path, e);
                identity.display_name.clone()
            }
        },
        Ok(None) => identity.display_name.clone(),
        Err(e) => {
            tracing::warn!("Failed to look up allowed user {}: {}", path, e);
            identity.display_name.clone()
        }
    }
}
