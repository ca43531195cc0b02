use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "chunk_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Chunk,
    Summary,
    Question,
}

/// A bounded text span derived from a document: the unit of retrieval.
///
/// `embedding` is a fixed-width dense vector whose dimension is constant
/// per embedding model. `lexical` is a generated `tsvector` column
/// maintained by Postgres, not populated in application code.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub datasource_id: Uuid,
    pub document_id: Uuid,
    pub kind: ChunkKind,
    pub content: String,
    pub char_size: i32,
    pub token_count: i32,
    #[sqlx(try_from = "Vec<f32>")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// A chunk not yet persisted, produced by the indexing pipeline.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub kind: ChunkKind,
    pub content: String,
    pub embedding: Vec<f32>,
}

impl NewChunk {
    pub fn char_size(&self) -> i32 {
        self.content.chars().count() as i32
    }
}

/// A retrieved chunk carrying the scores accumulated along the pipeline
/// and the document/datasource external ids it resolves to.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: Uuid,
    pub document_id: String,
    pub datasource_id: String,
    pub kind: ChunkKind,
    pub text: String,
    pub token_count: i32,
    pub lexical_rank: Option<f32>,
    pub similarity: Option<f32>,
    pub rerank_score: Option<f32>,
    pub metadata: Option<serde_json::Value>,
}

pub(crate) fn embedding_vector(embedding: Vec<f32>) -> Vector {
    Vector::from(embedding)
}
