use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A typed edge from a *question* or *summary* chunk to the *chunk*-kind
/// record it was derived from. Weak reference: cascades on either side's
/// deletion, no in-memory pointer graph.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Relation {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub datasource_id: Uuid,
    pub source_chunk_id: Uuid,
    pub target_chunk_id: Uuid,
    pub created_at: DateTime<Utc>,
}
