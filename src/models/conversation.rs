use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Owned by (organization, api key). Pruned once a key exceeds
/// `chat:max:conversations`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub api_key_id: Uuid,
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
