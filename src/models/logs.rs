use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-transaction USD cost accounting, appended at the end of every
/// retrieval/chat/indexing transaction. Append-only; retention-bounded.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CostLog {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub transaction_id: Uuid,
    pub component: String,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// Mutating-action audit trail (create/update/delete of scoped entities).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub transaction_id: Uuid,
    pub action: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The structured reasoning trace for a single retrieval or chat
/// transaction. `payload` is the Brotli-compressed, serialized reasoning
/// tree (sec 4.5, sec 9); `GET /v1/transactions/{id}` decompresses it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RagLog {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub transaction_id: Uuid,
    pub query: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}
