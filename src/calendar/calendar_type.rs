use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::access::Identity;
use crate::storage::{DocumentStore, SetMode, StoreError, WriteBatch, encode, paths};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarInfo {
    pub name: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub creator_uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedUser {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Member
}

impl CalendarInfo {
    pub fn new(name: &str, creator: &Identity) -> Self {
        Self {
            name: name.trim().to_string(),
            created_by: creator.display_name.clone(),
            creator_uid: creator.uid.clone(),
            created_at: Some(Utc::now()),
        }
    }
}

impl AllowedUser {
    pub fn admin(identity: &Identity) -> Self {
        Self {
            name: identity.display_name.clone(),
            email: identity.email.clone().unwrap_or_default(),
            uid: identity.uid.clone(),
            role: Role::Admin,
        }
    }
}

/// Creates a calendar under a fresh id with `creator` as its admin.
pub async fn create_calendar(
    store: &dyn DocumentStore,
    name: &str,
    creator: &Identity,
) -> Result<String, StoreError> {
    let calendar_id = uuid::Uuid::new_v4().simple().to_string();
    write_calendar(store, &calendar_id, name, creator).await?;
    tracing::info!("Created calendar {}", calendar_id);
    Ok(calendar_id)
}

/// Makes sure the identity's own calendar (`calendars/{uid}`) exists.
pub async fn provision_own_calendar(
    store: &dyn DocumentStore,
    name: &str,
    owner: &Identity,
) -> Result<String, StoreError> {
    let calendar_id = owner.uid.clone();
    if store.get(&paths::calendar(&calendar_id)).await?.is_none() {
        write_calendar(store, &calendar_id, name, owner).await?;
        tracing::info!("Provisioned own calendar for {}", owner.uid);
    }
    Ok(calendar_id)
}

async fn write_calendar(
    store: &dyn DocumentStore,
    calendar_id: &str,
    name: &str,
    creator: &Identity,
) -> Result<(), StoreError> {
    let mut batch = WriteBatch::new();
    batch
        .set(
            paths::calendar(calendar_id),
            encode(&CalendarInfo::new(name, creator))?,
            SetMode::Replace,
        )
        .set(
            paths::allowed_users(calendar_id).doc(&creator.uid),
            encode(&AllowedUser::admin(creator))?,
            SetMode::Replace,
        );
    store.commit(batch).await
}
