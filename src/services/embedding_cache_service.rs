//! Embedding Cache & Provider (EP) — sec 4.1.
//!
//! Thin, cached adapter to an external embedding model. Deduplicates by
//! content hash; persists results in a (model, kind, hash)-unique table
//! and layers a short-TTL registry cache in front of it.

use std::time::Duration;

use pgvector::Vector;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::models::EmbeddingKind;
use crate::services::tokenizer::count_tokens;

const BATCH_SIZE: usize = 96;
const MAX_ATTEMPTS: u32 = 10;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const REGISTRY_TTL_SECS: u64 = 600;

#[derive(Clone)]
pub struct EmbeddingProviderConfig {
    pub provider_url: String,
    pub api_key: String,
    pub model: String,
    /// USD per input token, looked up from `Config::pricing_for(model)`.
    pub price_usd_per_token: f64,
}

#[derive(Clone)]
pub struct EmbeddingCacheService {
    pool: PgPool,
    redis: redis::aio::ConnectionManager,
    http: reqwest::Client,
    config: EmbeddingProviderConfig,
}

pub struct EmbedOutcome {
    pub vectors: Vec<Vec<f32>>,
    pub cost_usd: f64,
}

impl EmbeddingCacheService {
    pub fn new(
        pool: PgPool,
        redis: redis::aio::ConnectionManager,
        config: EmbeddingProviderConfig,
    ) -> Self {
        Self {
            pool,
            redis,
            http: reqwest::Client::new(),
            config,
        }
    }

    /// `embed(texts, kind) → (vectors[], costUSD)`. Empty input returns
    /// empty vectors and zero cost; output order matches input order.
    pub async fn embed(&self, texts: &[String], kind: EmbeddingKind) -> AppResult<EmbedOutcome> {
        if texts.is_empty() {
            return Ok(EmbedOutcome { vectors: Vec::new(), cost_usd: 0.0 });
        }

        let hashes: Vec<String> = texts.iter().map(|t| hash_text(t)).collect();
        let mut resolved: Vec<Option<Vec<f32>>> = vec![None; texts.len()];

        self.fill_from_registry(kind, &hashes, &mut resolved).await;
        self.fill_from_db_cache(kind, &hashes, &mut resolved).await?;

        let miss_indices: Vec<usize> = resolved
            .iter()
            .enumerate()
            .filter_map(|(i, v)| if v.is_none() { Some(i) } else { None })
            .collect();

        let mut cost_usd = 0.0;
        for batch in miss_indices.chunks(BATCH_SIZE) {
            let batch_texts: Vec<String> = batch.iter().map(|&i| texts[i].clone()).collect();
            let embeddings = self.call_provider_with_retry(&batch_texts).await?;

            for (&idx, embedding) in batch.iter().zip(embeddings.into_iter()) {
                self.persist(kind, &hashes[idx], &embedding).await?;
                self.write_registry(kind, &hashes[idx], &embedding).await;
                resolved[idx] = Some(embedding);
            }
            let batch_tokens: u32 = batch_texts.iter().map(|t| count_tokens(t)).sum();
            cost_usd += batch_tokens as f64 * self.config.price_usd_per_token;
        }

        let vectors = resolved
            .into_iter()
            .map(|v| v.unwrap_or_default())
            .collect();

        Ok(EmbedOutcome { vectors, cost_usd })
    }

    async fn fill_from_registry(
        &self,
        kind: EmbeddingKind,
        hashes: &[String],
        resolved: &mut [Option<Vec<f32>>],
    ) {
        let mut conn = self.redis.clone();
        for (i, hash) in hashes.iter().enumerate() {
            let key = registry_key(kind, hash);
            if let Ok(Some(raw)) = conn.get::<_, Option<String>>(&key).await {
                if let Ok(vec) = serde_json::from_str::<Vec<f32>>(&raw) {
                    resolved[i] = Some(vec);
                }
            }
        }
    }

    async fn write_registry(&self, kind: EmbeddingKind, hash: &str, embedding: &[f32]) {
        let mut conn = self.redis.clone();
        let key = registry_key(kind, hash);
        if let Ok(raw) = serde_json::to_string(embedding) {
            let _: Result<(), _> = conn.set_ex(&key, raw, REGISTRY_TTL_SECS).await;
        }
    }

    async fn fill_from_db_cache(
        &self,
        kind: EmbeddingKind,
        hashes: &[String],
        resolved: &mut [Option<Vec<f32>>],
    ) -> AppResult<()> {
        let missing: Vec<String> = hashes
            .iter()
            .zip(resolved.iter())
            .filter_map(|(h, v)| if v.is_none() { Some(h.clone()) } else { None })
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let rows = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT content_hash, embedding FROM embedding_cache
            WHERE model = $1 AND kind = $2 AND content_hash = ANY($3)
            "#,
        )
        .bind(&self.config.model)
        .bind(kind)
        .bind(&missing)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            if let Some(pos) = hashes.iter().position(|h| h == &row.content_hash) {
                resolved[pos] = Some(row.embedding);
            }
        }
        Ok(())
    }

    async fn persist(&self, kind: EmbeddingKind, hash: &str, embedding: &[f32]) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO embedding_cache (id, model, kind, content_hash, embedding, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, now())
            ON CONFLICT (model, kind, content_hash) DO NOTHING
            "#,
        )
        .bind(&self.config.model)
        .bind(kind)
        .bind(hash)
        .bind(Vector::from(embedding.to_vec()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Deletes cached embeddings older than the configured retention
    /// window (sec 5 daily retention cron).
    pub async fn clean_expired(&self, retention_days: u32) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM embedding_cache WHERE created_at < now() - ($1 || ' days')::interval",
        )
        .bind(retention_days.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn call_provider_with_retry(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut attempt = 0;
        let mut backoff = INITIAL_BACKOFF;
        loop {
            attempt += 1;
            match self.call_provider(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if attempt >= MAX_ATTEMPTS => {
                    return Err(AppError::LLMUnavailable(format!(
                        "embedding provider failed after {attempt} attempts: {err}"
                    )))
                }
                Err(_) => {
                    tokio::time::sleep(backoff).await;
                    backoff += INITIAL_BACKOFF;
                }
            }
        }
    }

    async fn call_provider(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let request = ProviderRequest {
            input: texts.to_vec(),
            model: self.config.model.clone(),
        };

        let response = self
            .http
            .post(&self.config.provider_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("embedding provider returned {}", response.status());
        }

        let body: ProviderResponse = response.json().await?;
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

fn hash_text(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn registry_key(kind: EmbeddingKind, hash: &str) -> String {
    format!("emb:registry:{kind:?}:{hash}")
}

#[derive(sqlx::FromRow)]
struct CacheRow {
    content_hash: String,
    #[sqlx(try_from = "Vec<f32>")]
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ProviderRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct ProviderResponse {
    data: Vec<ProviderEmbedding>,
}

#[derive(Deserialize)]
struct ProviderEmbedding {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_text_is_deterministic() {
        assert_eq!(hash_text("hello"), hash_text("hello"));
    }

    #[test]
    fn hash_text_differs_per_input() {
        assert_ne!(hash_text("hello"), hash_text("world"));
    }

    #[test]
    fn registry_key_distinguishes_kinds() {
        let doc_key = registry_key(EmbeddingKind::Document, "abc");
        let query_key = registry_key(EmbeddingKind::Query, "abc");
        assert_ne!(doc_key, query_key);
    }
}
