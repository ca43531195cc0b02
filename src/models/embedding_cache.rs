use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "embedding_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingKind {
    Document,
    Query,
}

/// A persisted embedding result, unique per (model, kind, content hash).
/// Append-only: concurrent inserts with the same key are resolved by
/// upsert-or-ignore, never by locking.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EmbeddingCacheEntry {
    pub id: Uuid,
    pub model: String,
    pub kind: EmbeddingKind,
    pub content_hash: String,
    #[sqlx(try_from = "Vec<f32>")]
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}
