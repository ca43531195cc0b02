//! Reranker (RR) — sec 4.4.
//!
//! Calls an external cross-encoder rerank service and applies a cutoff
//! policy. Always sorts by score descending, stably; never returns
//! nothing when there were candidates to rank.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RerankPolicy;
use crate::error::{AppError, AppResult};
use crate::models::RetrievedChunk;

const MAX_ATTEMPTS: u32 = 5;
const BACKOFF_STEP: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct RerankerConfig {
    pub provider_url: String,
    pub api_key: Option<String>,
    /// Flat USD cost per document sent to the reranker, since its response
    /// carries a relevance score but no usage/cost figure of its own.
    pub price_usd_per_doc: f64,
}

#[derive(Clone)]
pub struct RerankerService {
    http: reqwest::Client,
    config: RerankerConfig,
}

pub struct RerankOutcome {
    pub chunks: Vec<RetrievedChunk>,
    pub cost_usd: f64,
}

impl RerankerService {
    pub fn new(config: RerankerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// `rerank(query, chunks, cutoff) → (ranked_chunks, costUSD)`.
    pub async fn rerank(
        &self,
        query: &str,
        mut chunks: Vec<RetrievedChunk>,
        policy: &RerankPolicy,
    ) -> AppResult<RerankOutcome> {
        if chunks.is_empty() {
            return Ok(RerankOutcome { chunks, cost_usd: 0.0 });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let scores = self.call_with_retry(query, &texts).await?;

        for (chunk, score) in chunks.iter_mut().zip(scores.iter()) {
            chunk.rerank_score = Some(*score);
        }

        chunks.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let filtered = apply_policy(&chunks, policy);
        let cost_usd = texts.len() as f64 * self.config.price_usd_per_doc;

        Ok(RerankOutcome {
            chunks: if filtered.is_empty() { chunks } else { filtered },
            cost_usd,
        })
    }

    async fn call_with_retry(&self, query: &str, texts: &[String]) -> AppResult<Vec<f32>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.call_provider(query, texts).await {
                Ok(scores) => return Ok(scores),
                Err(err) if attempt >= MAX_ATTEMPTS => {
                    return Err(AppError::RerankUnavailable(format!(
                        "rerank provider failed after {attempt} attempts: {err}"
                    )))
                }
                Err(_) => tokio::time::sleep(BACKOFF_STEP * attempt).await,
            }
        }
    }

    async fn call_provider(&self, query: &str, texts: &[String]) -> anyhow::Result<Vec<f32>> {
        let mut request = self.http.post(&self.config.provider_url).json(&RerankRequest {
            query: query.to_string(),
            documents: texts.to_vec(),
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("rerank provider returned {}", response.status());
        }

        let body: RerankResponse = response.json().await?;
        Ok(body.results.into_iter().map(|r| r.relevance_score).collect())
    }
}

/// Keep scores honoring the configured policy (sec 9, open question i —
/// both forms are implemented, neither is canonical):
/// - fixed cutoff: keep scores >= cutoff
/// - median-relative: keep scores >= threshold * median
fn apply_policy(chunks: &[RetrievedChunk], policy: &RerankPolicy) -> Vec<RetrievedChunk> {
    let mut kept: Vec<RetrievedChunk> = chunks.to_vec();

    if let Some(cutoff) = policy.cutoff {
        kept.retain(|c| c.rerank_score.unwrap_or(0.0) >= cutoff);
    }

    if let Some(threshold) = policy.threshold {
        let mut scores: Vec<f32> = chunks.iter().filter_map(|c| c.rerank_score).collect();
        if !scores.is_empty() {
            scores.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let median = scores[scores.len() / 2];
            kept.retain(|c| c.rerank_score.unwrap_or(0.0) >= threshold * median);
        }
    }

    kept
}

#[derive(Serialize)]
struct RerankRequest {
    query: String,
    documents: Vec<String>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    relevance_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chunk(score: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: uuid::Uuid::new_v4(),
            document_id: "d1".to_string(),
            datasource_id: "ds1".to_string(),
            kind: crate::models::ChunkKind::Chunk,
            text: "text".to_string(),
            token_count: 2,
            lexical_rank: None,
            similarity: None,
            rerank_score: Some(score),
            metadata: None,
        }
    }

    #[test]
    fn median_relative_policy_falls_back_to_all_when_empty() {
        let chunks = vec![make_chunk(0.1), make_chunk(0.05)];
        let policy = RerankPolicy {
            cutoff: None,
            threshold: Some(10.0),
        };
        let filtered = apply_policy(&chunks, &policy);
        assert!(filtered.is_empty(), "threshold too high should empty the set");
    }

    #[test]
    fn fixed_cutoff_keeps_high_scores() {
        let chunks = vec![make_chunk(0.9), make_chunk(0.1)];
        let policy = RerankPolicy {
            cutoff: Some(0.5),
            threshold: None,
        };
        let filtered = apply_policy(&chunks, &policy);
        assert_eq!(filtered.len(), 1);
    }
}
