//! Indexing Pipeline (IP) — sec 4.6. Converts a document to markdown,
//! (re)chunks it, and regenerates its summary and question-bank chunks.
//! Runs on the dedicated worker pool consuming the job queue.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Chunk, ChunkKind, Document, DocumentStatus, EmbeddingKind, KnowledgeDepth, NewChunk};
use crate::services::embedding_cache_service::EmbeddingCacheService;
use crate::services::indexing::chunking::{chunk_markdown, ChunkingConfig};
use crate::services::indexing::convert::to_markdown;
use crate::services::llm_client::LlmClient;
use crate::services::tokenizer::count_tokens;

const SUMMARY_MIN_WORDS: usize = 200;
const SUMMARY_MAX_WORDS: u32 = 200;
const QUESTIONS_PER_CHUNK: u32 = 3;
const QUESTION_BATCH_SIZE: usize = 10;

#[derive(Clone)]
pub struct IndexingPipeline {
    pool: PgPool,
    http: reqwest::Client,
    embedding: EmbeddingCacheService,
    llm: LlmClient,
}

impl IndexingPipeline {
    pub fn new(pool: PgPool, embedding: EmbeddingCacheService, llm: LlmClient) -> Self {
        Self {
            pool,
            http: reqwest::Client::new(),
            embedding,
            llm,
        }
    }

    /// Runs every step of sec 4.6 for one document. On any step-2/3/5
    /// failure the document transitions to `failed` and the error
    /// propagates so the job queue can retry; summary/question failures
    /// are swallowed per sec 4.6's failure semantics.
    pub async fn index_document(&self, document_id: Uuid) -> AppResult<f64> {
        let document = self.load_document(document_id).await?;
        self.transition(document_id, DocumentStatus::Indexing).await?;

        match self.run_steps(&document).await {
            Ok(cost) => {
                self.transition(document_id, DocumentStatus::Indexed).await?;
                Ok(cost)
            }
            Err(err) => {
                self.transition(document_id, DocumentStatus::Failed).await?;
                Err(err)
            }
        }
    }

    async fn run_steps(&self, document: &Document) -> AppResult<f64> {
        let mut cost_usd = 0.0;

        let markdown = to_markdown(document.doc_type, &document.content, &self.http)
            .await
            .map_err(|e| AppError::IndexingFailed(e.to_string()))?;

        self.delete_prior_chunks(document.id).await?;

        let depth = self.datasource_depth(document.datasource_id).await?;
        let word_count = markdown.split_whitespace().count();
        let do_enrich = depth != KnowledgeDepth::Shallow;

        let summary_context = if do_enrich && word_count >= SUMMARY_MIN_WORDS {
            match self.generate_and_store_summary(document, &markdown).await {
                Ok((context, summary_cost)) => {
                    cost_usd += summary_cost;
                    Some(context)
                }
                Err(err) => {
                    tracing::warn!(document_id = %document.id, error = %err, "summary generation skipped");
                    None
                }
            }
        } else {
            None
        };

        let persisted_chunks = self
            .chunk_and_embed(document, &markdown, summary_context.as_deref(), &mut cost_usd)
            .await?;

        if do_enrich {
            cost_usd += self.generate_question_bank(document, &persisted_chunks).await;
        }

        Ok(cost_usd)
    }

    async fn load_document(&self, document_id: Uuid) -> AppResult<Document> {
        sqlx::query_as::<_, Document>("SELECT * FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("document '{document_id}'")))
    }

    async fn datasource_depth(&self, datasource_id: Uuid) -> AppResult<KnowledgeDepth> {
        let row: (KnowledgeDepth,) =
            sqlx::query_as("SELECT knowledge_depth FROM datasources WHERE id = $1")
                .bind(datasource_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }

    async fn transition(&self, document_id: Uuid, status: DocumentStatus) -> AppResult<()> {
        sqlx::query("UPDATE documents SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Deletes every prior chunk record (chunk/summary/question) for this
    /// document; relations cascade via the foreign key (sec 4.6 step 3).
    async fn delete_prior_chunks(&self, document_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn generate_and_store_summary(&self, document: &Document, markdown: &str) -> AppResult<(String, f64)> {
        let outcome = self.llm.generate_summary(markdown, SUMMARY_MAX_WORDS).await?;
        let embed = self
            .embedding
            .embed(&[outcome.summary.clone()], EmbeddingKind::Document)
            .await?;
        let vector = embed.vectors.into_iter().next().unwrap_or_default();

        self.insert_chunk(
            document,
            NewChunk {
                kind: ChunkKind::Summary,
                content: outcome.summary,
                embedding: vector,
            },
        )
        .await?;

        Ok((outcome.context, outcome.cost_usd + embed.cost_usd))
    }

    async fn chunk_and_embed(
        &self,
        document: &Document,
        markdown: &str,
        context: Option<&str>,
        cost_usd: &mut f64,
    ) -> AppResult<Vec<Chunk>> {
        let chunks = chunk_markdown(markdown, &ChunkingConfig::default());
        if chunks.is_empty() {
            return Err(AppError::IndexingFailed("no chunks produced from document".into()));
        }

        let embedding_inputs: Vec<String> = chunks
            .iter()
            .map(|c| match context {
                Some(ctx) => format!("{ctx}\n\n{}", c.content_for_embedding()),
                None => c.content_for_embedding(),
            })
            .collect();

        let embed = self.embedding.embed(&embedding_inputs, EmbeddingKind::Document).await?;
        *cost_usd += embed.cost_usd;

        let mut persisted = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.into_iter().zip(embed.vectors.into_iter()) {
            let persisted_chunk = self
                .insert_chunk(
                    document,
                    NewChunk {
                        kind: ChunkKind::Chunk,
                        content: chunk.body,
                        embedding: vector,
                    },
                )
                .await?;
            persisted.push(persisted_chunk);
        }
        Ok(persisted)
    }

    async fn generate_question_bank(&self, document: &Document, chunks: &[Chunk]) -> f64 {
        let mut total_cost = 0.0;
        for batch in chunks.chunks(QUESTION_BATCH_SIZE) {
            let results = futures_util::future::join_all(
                batch.iter().map(|chunk| self.questions_for_chunk(document, chunk)),
            )
            .await;
            for result in results {
                match result {
                    Ok(cost) => total_cost += cost,
                    Err(err) => {
                        tracing::warn!(error = %err, "question bank generation skipped for chunk");
                    }
                }
            }
        }
        total_cost
    }

    async fn questions_for_chunk(&self, document: &Document, chunk: &Chunk) -> AppResult<f64> {
        let outcome = self.llm.generate_questions(&chunk.content, QUESTIONS_PER_CHUNK).await?;
        if outcome.questions.is_empty() {
            return Ok(outcome.cost_usd);
        }

        let embed = self.embedding.embed(&outcome.questions, EmbeddingKind::Query).await?;
        let cost = outcome.cost_usd + embed.cost_usd;

        for (question, vector) in outcome.questions.into_iter().zip(embed.vectors.into_iter()) {
            let question_chunk = self
                .insert_chunk(
                    document,
                    NewChunk {
                        kind: ChunkKind::Question,
                        content: question,
                        embedding: vector,
                    },
                )
                .await?;
            self.insert_relation(document, question_chunk.id, chunk.id).await?;
        }
        Ok(cost)
    }

    async fn insert_chunk(&self, document: &Document, new_chunk: NewChunk) -> AppResult<Chunk> {
        let char_size = new_chunk.char_size();
        let token_count = count_tokens(&new_chunk.content) as i32;
        let chunk = sqlx::query_as::<_, Chunk>(
            r#"
            INSERT INTO chunks
                (id, organization_id, datasource_id, document_id, kind, content, char_size, token_count, embedding, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, $8, now())
            RETURNING *
            "#,
        )
        .bind(document.organization_id)
        .bind(document.datasource_id)
        .bind(document.id)
        .bind(new_chunk.kind)
        .bind(&new_chunk.content)
        .bind(char_size)
        .bind(token_count)
        .bind(pgvector::Vector::from(new_chunk.embedding))
        .fetch_one(&self.pool)
        .await?;
        Ok(chunk)
    }

    async fn insert_relation(&self, document: &Document, source_chunk_id: Uuid, target_chunk_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO chunk_relations (id, organization_id, datasource_id, source_chunk_id, target_chunk_id, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, now())
            "#,
        )
        .bind(document.organization_id)
        .bind(document.datasource_id)
        .bind(source_chunk_id)
        .bind(target_chunk_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
