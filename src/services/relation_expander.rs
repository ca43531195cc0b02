//! Relation Expander (RE) — sec 4.3.
//!
//! Given a set of candidate chunks, resolves *question*/*summary* chunks
//! to the *chunk*-kind records they describe. Never writes; represented
//! with ids and explicit joins, not in-memory pointer graphs (sec 9).

use std::collections::HashSet;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Chunk, ChunkKind};

/// One (source, targets) edge recorded for reasoning-tree provenance.
#[derive(Debug, Clone)]
pub struct ExpansionEdge {
    pub source_chunk_id: Uuid,
    pub target_chunk_ids: Vec<Uuid>,
}

pub struct ExpansionResult {
    pub chunks: Vec<Chunk>,
    pub edges: Vec<ExpansionEdge>,
}

#[derive(Clone)]
pub struct RelationExpander {
    pool: PgPool,
}

impl RelationExpander {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Expands `candidates` in place: *chunk*-kind candidates pass
    /// through unchanged; *question* chunks resolve via `Relation` to
    /// their target chunk; *summary* chunks resolve to every chunk
    /// belonging to the same document. Deduplicated by chunk id,
    /// preserving first-occurrence order.
    pub async fn expand(&self, candidates: Vec<Chunk>) -> AppResult<ExpansionResult> {
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut result = Vec::with_capacity(candidates.len());
        let mut edges = Vec::new();

        for chunk in candidates {
            match chunk.kind {
                ChunkKind::Chunk => {
                    if seen.insert(chunk.id) {
                        result.push(chunk);
                    }
                }
                ChunkKind::Question => {
                    let targets = self.targets_for_question(chunk.id).await?;
                    let target_ids: Vec<Uuid> = targets.iter().map(|t| t.id).collect();
                    if !target_ids.is_empty() {
                        edges.push(ExpansionEdge {
                            source_chunk_id: chunk.id,
                            target_chunk_ids: target_ids,
                        });
                    }
                    for target in targets {
                        if seen.insert(target.id) {
                            result.push(target);
                        }
                    }
                }
                ChunkKind::Summary => {
                    let siblings = self.chunks_for_document(chunk.document_id).await?;
                    let sibling_ids: Vec<Uuid> = siblings.iter().map(|c| c.id).collect();
                    if !sibling_ids.is_empty() {
                        edges.push(ExpansionEdge {
                            source_chunk_id: chunk.id,
                            target_chunk_ids: sibling_ids,
                        });
                    }
                    for sibling in siblings {
                        if seen.insert(sibling.id) {
                            result.push(sibling);
                        }
                    }
                }
            }
        }

        Ok(ExpansionResult { chunks: result, edges })
    }

    async fn targets_for_question(&self, source_chunk_id: Uuid) -> AppResult<Vec<Chunk>> {
        let chunks = sqlx::query_as::<_, Chunk>(
            r#"
            SELECT c.* FROM chunk_relations r
            JOIN chunks c ON c.id = r.target_chunk_id
            WHERE r.source_chunk_id = $1 AND c.kind = 'chunk'
            "#,
        )
        .bind(source_chunk_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    async fn chunks_for_document(&self, document_id: Uuid) -> AppResult<Vec<Chunk>> {
        let chunks = sqlx::query_as::<_, Chunk>(
            "SELECT * FROM chunks WHERE document_id = $1 AND kind = 'chunk'",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_chunk(id: Uuid, document_id: Uuid, kind: ChunkKind) -> Chunk {
        Chunk {
            id,
            organization_id: Uuid::new_v4(),
            datasource_id: Uuid::new_v4(),
            document_id,
            kind,
            content: "text".to_string(),
            char_size: 4,
            token_count: 1,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn pass_through_chunk_dedup_preserves_first_occurrence() {
        let id = Uuid::new_v4();
        let document_id = Uuid::new_v4();
        let first = make_chunk(id, document_id, ChunkKind::Chunk);
        let duplicate = make_chunk(id, document_id, ChunkKind::Chunk);

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for chunk in [first, duplicate] {
            if seen.insert(chunk.id) {
                result.push(chunk);
            }
        }
        assert_eq!(result.len(), 1);
    }
}
