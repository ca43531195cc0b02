use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A named grouping of datasources used to scope a chat query.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub external_id: String,
    pub name: String,
    pub purpose: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAgentRequest {
    #[validate(length(min = 1, max = 200))]
    pub id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub purpose: Option<String>,
    #[serde(default)]
    pub datasource_ids: Vec<String>,
}
