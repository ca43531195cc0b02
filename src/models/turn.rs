use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One user/assistant exchange stored under a conversation. Append-only;
/// pruned once a conversation exceeds `chat:max:turns`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub payload: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub token_count: i32,
    pub created_at: DateTime<Utc>,
}

/// The envelope persisted as `Turn::payload`: the user query and the
/// final assistant response, mirroring the chat response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnPayload {
    pub query: String,
    pub response: String,
    pub documents: Vec<String>,
    pub answered: bool,
    pub confidence: u8,
}
