//! Hybrid Search Engine (HSE) — sec 4.2.
//!
//! Two read-only operations, always issued concurrently by the caller:
//! lexical full-text search and semantic cosine search over the chunk
//! store. Neither mutates state.

use pgvector::Vector;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Chunk, ChunkKind};

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk: Chunk,
    pub rank: f32,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub chunk: Chunk,
    pub similarity: f32,
}

#[derive(Clone)]
pub struct HybridSearchService {
    pool: PgPool,
}

impl HybridSearchService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `lexicalSearch(org, datasources, query, queryVec, limit, offset)`.
    /// Ranks by phrase-aware text match; similarity is carried for
    /// tie-breaking. Ordered by (rank desc, similarity desc).
    pub async fn lexical_search(
        &self,
        org: Uuid,
        datasources: &[Uuid],
        query: &str,
        query_vec: &[f32],
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<LexicalHit>> {
        if datasources.is_empty() {
            return Err(AppError::InvalidRequest("datasource set must not be empty".into()));
        }

        let rows = sqlx::query_as::<_, LexicalRow>(
            r#"
            SELECT
                c.*,
                ts_rank(c.lexical, plainto_tsquery('english', $3)) as rank,
                1 - (c.embedding <=> $4) as similarity
            FROM chunks c
            WHERE c.organization_id = $1
              AND c.datasource_id = ANY($2)
              AND c.lexical @@ plainto_tsquery('english', $3)
            ORDER BY rank DESC, similarity DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(org)
        .bind(datasources)
        .bind(query)
        .bind(Vector::from(query_vec.to_vec()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| LexicalHit {
                rank: r.rank,
                similarity: r.similarity,
                chunk: r.into_chunk(),
            })
            .collect())
    }

    /// `semanticSearch(org, datasources, queryVec, kindFilter?, limit,
    /// offset, cutoff)`. Filters by `1 - cosine_distance >= cutoff`,
    /// ordered by similarity descending.
    pub async fn semantic_search(
        &self,
        org: Uuid,
        datasources: &[Uuid],
        query_vec: &[f32],
        kind_filter: Option<ChunkKind>,
        limit: i64,
        offset: i64,
        cutoff: f32,
    ) -> AppResult<Vec<SemanticHit>> {
        if datasources.is_empty() {
            return Err(AppError::InvalidRequest("datasource set must not be empty".into()));
        }

        let rows = sqlx::query_as::<_, SemanticRow>(
            r#"
            SELECT c.*, 1 - (c.embedding <=> $3) as similarity
            FROM chunks c
            WHERE c.organization_id = $1
              AND c.datasource_id = ANY($2)
              AND ($5::chunk_kind IS NULL OR c.kind = $5)
              AND c.embedding IS NOT NULL
              AND 1 - (c.embedding <=> $3) >= $4
            ORDER BY similarity DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(org)
        .bind(datasources)
        .bind(Vector::from(query_vec.to_vec()))
        .bind(cutoff)
        .bind(kind_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| SemanticHit {
                similarity: r.similarity,
                chunk: r.into_chunk(),
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct LexicalRow {
    id: Uuid,
    organization_id: Uuid,
    datasource_id: Uuid,
    document_id: Uuid,
    kind: ChunkKind,
    content: String,
    char_size: i32,
    token_count: i32,
    #[sqlx(try_from = "Vec<f32>")]
    embedding: Option<Vec<f32>>,
    created_at: chrono::DateTime<chrono::Utc>,
    rank: f32,
    similarity: f32,
}

impl LexicalRow {
    fn into_chunk(self) -> Chunk {
        Chunk {
            id: self.id,
            organization_id: self.organization_id,
            datasource_id: self.datasource_id,
            document_id: self.document_id,
            kind: self.kind,
            content: self.content,
            char_size: self.char_size,
            token_count: self.token_count,
            embedding: self.embedding,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SemanticRow {
    id: Uuid,
    organization_id: Uuid,
    datasource_id: Uuid,
    document_id: Uuid,
    kind: ChunkKind,
    content: String,
    char_size: i32,
    token_count: i32,
    #[sqlx(try_from = "Vec<f32>")]
    embedding: Option<Vec<f32>>,
    created_at: chrono::DateTime<chrono::Utc>,
    similarity: f32,
}

impl SemanticRow {
    fn into_chunk(self) -> Chunk {
        Chunk {
            id: self.id,
            organization_id: self.organization_id,
            datasource_id: self.datasource_id,
            document_id: self.document_id,
            kind: self.kind,
            content: self.content,
            char_size: self.char_size,
            token_count: self.token_count,
            embedding: self.embedding,
            created_at: self.created_at,
        }
    }
}
