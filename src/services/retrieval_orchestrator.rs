//! Retrieval Orchestrator (RO) — sec 4.5, the core's largest component.
//!
//! Composes EP + HSE + RE + RR, enforces token/character/chunk budgets,
//! deduplicates, and produces a ranked, trimmed result set with a
//! reasoning tree.

use std::collections::HashSet;

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{Config, RetrievalDefaults};
use crate::error::{AppError, AppResult};
use crate::models::{Budgets, Chunk, ChunkKind, EmbeddingKind, RetrievedChunk};
use crate::services::embedding_cache_service::EmbeddingCacheService;
use crate::services::hybrid_search_service::HybridSearchService;
use crate::services::llm_client::LlmClient;
use crate::services::reasoning_tree::{Measure, ReasoningTree};
use crate::services::relation_expander::RelationExpander;
use crate::services::reranker_service::RerankerService;
use crate::services::tokenizer::count_tokens;

const CANDIDATE_CAP: usize = 1000;
const LEXICAL_LIMIT: i64 = 200;
const SEMANTIC_LIMIT: i64 = 200;

pub struct RetrievalOutcome {
    pub chunks: Vec<RetrievedChunk>,
    pub cost_usd: f64,
    pub tree: ReasoningTree,
}

/// One resolved (document, datasource) pair, external ids only — the
/// unit `retrieveDocuments` returns (sec 4.5).
pub struct DocumentHit {
    pub document_id: String,
    pub datasource_id: String,
}

pub struct DocumentOutcome {
    pub documents: Vec<DocumentHit>,
    pub ids: Vec<String>,
    pub cost_usd: f64,
    pub tree: ReasoningTree,
}

pub struct QuestionOutcome {
    pub chunks: Vec<RetrievedChunk>,
    pub cost_usd: f64,
    pub tree: ReasoningTree,
}

#[derive(Clone)]
pub struct RetrievalOrchestrator {
    pool: PgPool,
    embedding: EmbeddingCacheService,
    hybrid: HybridSearchService,
    relations: RelationExpander,
    reranker: RerankerService,
    llm: LlmClient,
    config: Config,
}

impl RetrievalOrchestrator {
    pub fn new(
        pool: PgPool,
        embedding: EmbeddingCacheService,
        hybrid: HybridSearchService,
        relations: RelationExpander,
        reranker: RerankerService,
        llm: LlmClient,
        config: Config,
    ) -> Self {
        Self {
            pool,
            embedding,
            hybrid,
            relations,
            reranker,
            llm,
            config,
        }
    }

    /// `retrieveChunks(org, datasources, prompt, budgets, log) →
    /// (chunks[], costUSD)`.
    pub async fn retrieve_chunks(
        &self,
        org: Uuid,
        datasources: &[Uuid],
        prompt: &str,
        budgets: Budgets,
    ) -> AppResult<RetrievalOutcome> {
        if datasources.is_empty() {
            return Err(AppError::InvalidRequest("datasource set must not be empty".into()));
        }

        let mut cost_usd = 0.0;
        let mut stage_nodes = Vec::new();

        let cleaned_query = clean_prompt(prompt);

        // Step 2: query embedding, concurrently with optional HyDE.
        let hyde_measure = Measure::start(json!({"stage": "hyde"}));
        let (query_embed, hyde_embed) = tokio::join!(
            self.embedding.embed(&[cleaned_query.clone()], EmbeddingKind::Query),
            self.maybe_hyde(prompt),
        );
        let query_outcome = query_embed?;
        cost_usd += query_outcome.cost_usd;
        let query_vec = query_outcome
            .vectors
            .into_iter()
            .next()
            .unwrap_or_default();

        let hypo_vec = match hyde_embed {
            Ok(Some((hyde_cost, outcome))) => {
                cost_usd += hyde_cost + outcome.cost_usd;
                outcome.vectors.into_iter().next()
            }
            Ok(None) => None,
            Err(_) => None,
        };
        stage_nodes.push(hyde_measure.finish(vec![]));

        // Step 3: lexical and semantic search(es), concurrently.
        let search_measure = Measure::start(json!({"stage": "search"}));
        let lexical_fut = self.hybrid.lexical_search(
            org,
            datasources,
            &cleaned_query,
            &query_vec,
            LEXICAL_LIMIT,
            0,
        );
        let semantic_fut = self.hybrid.semantic_search(
            org,
            datasources,
            &query_vec,
            None,
            SEMANTIC_LIMIT,
            0,
            self.config.embeddings_cutoff,
        );
        let hypo_semantic_fut = async {
            match &hypo_vec {
                Some(vec) => self
                    .hybrid
                    .semantic_search(org, datasources, vec, None, SEMANTIC_LIMIT, 0, self.config.embeddings_cutoff)
                    .await
                    .map(Some),
                None => Ok(None),
            }
        };

        let (lexical, semantic, hypo_semantic) =
            tokio::try_join!(lexical_fut, semantic_fut, hypo_semantic_fut)?;

        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut ordered: Vec<Chunk> = Vec::new();
        let mut lexical_ranks = std::collections::HashMap::new();
        let mut similarities = std::collections::HashMap::new();

        for hit in lexical {
            lexical_ranks.insert(hit.chunk.id, hit.rank);
            similarities.insert(hit.chunk.id, hit.similarity);
            if seen.insert(hit.chunk.id) {
                ordered.push(hit.chunk);
            }
        }
        for hit in semantic.into_iter().chain(hypo_semantic.into_iter().flatten()) {
            similarities.entry(hit.chunk.id).or_insert(hit.similarity);
            if seen.insert(hit.chunk.id) {
                ordered.push(hit.chunk);
            }
        }
        let observed_ids: Vec<String> = ordered.iter().map(|c| c.id.to_string()).collect();
        stage_nodes.push(search_measure.finish(vec![ReasoningTree::leaf(
            json!({"stage": "candidates", "ids": observed_ids}),
        )]));

        // Step 4: relation expansion.
        let expand_measure = Measure::start(json!({"stage": "expand"}));
        let expansion = self.relations.expand(ordered).await?;
        let edge_json: Vec<_> = expansion
            .edges
            .iter()
            .map(|e| json!({"source": e.source_chunk_id, "targets": e.target_chunk_ids}))
            .collect();
        stage_nodes.push(expand_measure.finish(vec![ReasoningTree::leaf(json!({"edges": edge_json}))]));

        // Step 5: cap candidates before rerank.
        let mut candidates = expansion.chunks;
        candidates.truncate(CANDIDATE_CAP);

        let retrieved: Vec<RetrievedChunk> = self.resolve_metadata(candidates).await?;

        // Step 6: rerank.
        let rerank_measure = Measure::start(json!({"stage": "rerank"}));
        let rerank_outcome = self
            .reranker
            .rerank(prompt, retrieved, &self.config.rerank_policy)
            .await?;
        cost_usd += rerank_outcome.cost_usd;
        stage_nodes.push(rerank_measure.finish(vec![]));

        // Step 7: budget trim.
        let trim_measure = Measure::start(json!({"stage": "trim"}));
        let trimmed = budget_trim(rerank_outcome.chunks, budgets, &self.config.retrieval_defaults);
        stage_nodes.push(trim_measure.finish(vec![ReasoningTree::leaf(json!({
            "kept": trimmed.len(),
        }))]));

        let tree = ReasoningTree::with_children(json!({"stage": "retrieval"}), stage_nodes);

        Ok(RetrievalOutcome {
            chunks: trimmed,
            cost_usd,
            tree,
        })
    }

    /// `retrieveDocuments(org, datasources, prompt, maxDocuments, log) →
    /// (documents[], ids[], costUSD)`. Open question ii: the lexical-first
    /// short-circuit is preserved as default, toggled by
    /// `retrieval_defaults.semantic_always`.
    pub async fn retrieve_documents(
        &self,
        org: Uuid,
        datasources: &[Uuid],
        prompt: &str,
        max_documents: u32,
    ) -> AppResult<DocumentOutcome> {
        if datasources.is_empty() {
            return Err(AppError::InvalidRequest("datasource set must not be empty".into()));
        }
        let cleaned_query = clean_prompt(prompt);
        let mut cost_usd = 0.0;
        let mut doc_ids: Vec<(Uuid, Uuid)> = Vec::new();
        let mut seen = HashSet::new();
        let mut stage_nodes = Vec::new();

        let query_outcome = self
            .embedding
            .embed(&[cleaned_query.clone()], EmbeddingKind::Query)
            .await?;
        cost_usd += query_outcome.cost_usd;
        let query_vec = query_outcome.vectors.into_iter().next().unwrap_or_default();

        let lexical_measure = Measure::start(json!({"stage": "lexical"}));
        let lexical = self
            .hybrid
            .lexical_search(org, datasources, &cleaned_query, &query_vec, LEXICAL_LIMIT, 0)
            .await?;
        for hit in lexical {
            let key = (hit.chunk.datasource_id, hit.chunk.document_id);
            if seen.insert(key) {
                doc_ids.push(key);
            }
        }
        stage_nodes.push(lexical_measure.finish(vec![]));

        // Open question ii: lexical-first short-circuit — semantic search
        // only runs if under the maxDocuments cap, unless
        // `semantic_always` is configured.
        if self.config.retrieval_defaults.semantic_always || (doc_ids.len() as u32) < max_documents {
            let semantic_measure = Measure::start(json!({"stage": "semantic"}));
            let semantic = self
                .hybrid
                .semantic_search(org, datasources, &query_vec, None, SEMANTIC_LIMIT, 0, self.config.embeddings_cutoff)
                .await?;
            for hit in semantic {
                let key = (hit.chunk.datasource_id, hit.chunk.document_id);
                if seen.insert(key) {
                    doc_ids.push(key);
                }
            }
            stage_nodes.push(semantic_measure.finish(vec![]));
        }

        doc_ids.truncate(max_documents as usize);
        let documents = self.resolve_document_ids(doc_ids).await?;
        let ids: Vec<String> = documents.iter().map(|d| d.document_id.clone()).collect();

        let tree = ReasoningTree::with_children(json!({"stage": "retrieve_documents"}), stage_nodes);
        Ok(DocumentOutcome { documents, ids, cost_usd, tree })
    }

    /// `retrieveQuestions(org, datasources, prompt, maxChunks, log) →
    /// (chunks[], costUSD)`. Semantic search scoped to `kind = question`.
    pub async fn retrieve_questions(
        &self,
        org: Uuid,
        datasources: &[Uuid],
        prompt: &str,
        max_chunks: u32,
    ) -> AppResult<QuestionOutcome> {
        if datasources.is_empty() {
            return Err(AppError::InvalidRequest("datasource set must not be empty".into()));
        }
        let cleaned_query = clean_prompt(prompt);
        let query_outcome = self
            .embedding
            .embed(&[cleaned_query], EmbeddingKind::Query)
            .await?;
        let query_vec = query_outcome.vectors.into_iter().next().unwrap_or_default();

        let semantic_measure = Measure::start(json!({"stage": "semantic_questions"}));
        let hits = self
            .hybrid
            .semantic_search(
                org,
                datasources,
                &query_vec,
                Some(ChunkKind::Question),
                max_chunks as i64,
                0,
                self.config.embeddings_cutoff,
            )
            .await?;
        let observed_ids: Vec<String> = hits.iter().map(|h| h.chunk.id.to_string()).collect();
        let semantic_node = semantic_measure.finish(vec![ReasoningTree::leaf(json!({"ids": observed_ids}))]);

        let chunks: Vec<Chunk> = hits.into_iter().map(|h| h.chunk).collect();
        let retrieved = self.resolve_metadata(chunks).await?;
        let tree = ReasoningTree::with_children(json!({"stage": "retrieve_questions"}), vec![semantic_node]);
        Ok(QuestionOutcome { chunks: retrieved, cost_usd: query_outcome.cost_usd, tree })
    }

    /// Returns the HyDE completion's own cost alongside the embedding
    /// outcome for its synthesized passage, so `retrieve_chunks` can sum
    /// both into the request total (spec.md:108 invariant iii).
    async fn maybe_hyde(
        &self,
        prompt: &str,
    ) -> AppResult<Option<(f64, crate::services::embedding_cache_service::EmbedOutcome)>> {
        let hyde = match self.llm.generate_hyde(prompt).await {
            Ok(hyde) => hyde,
            Err(_) => return Ok(None),
        };
        let outcome = self
            .embedding
            .embed(&[hyde.text], EmbeddingKind::Document)
            .await?;
        Ok(Some((hyde.cost_usd, outcome)))
    }

    /// Resolves internal (datasource, document) id pairs to their
    /// external ids, dropping any pair that no longer resolves.
    async fn resolve_document_ids(&self, pairs: Vec<(Uuid, Uuid)>) -> AppResult<Vec<DocumentHit>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let document_ids: Vec<Uuid> = pairs.iter().map(|(_, doc_id)| *doc_id).collect();

        let rows = sqlx::query_as::<_, DocumentLookupRow>(
            r#"
            SELECT d.id as document_id, d.external_id as document_external_id,
                   ds.id as datasource_id, ds.external_id as datasource_external_id,
                   d.metadata
            FROM documents d
            JOIN datasources ds ON ds.id = d.datasource_id
            WHERE d.id = ANY($1)
            "#,
        )
        .bind(&document_ids)
        .fetch_all(&self.pool)
        .await?;

        let lookup: std::collections::HashMap<Uuid, DocumentLookupRow> =
            rows.into_iter().map(|r| (r.document_id, r)).collect();

        Ok(pairs
            .into_iter()
            .filter_map(|(_, document_id)| {
                let meta = lookup.get(&document_id)?;
                Some(DocumentHit {
                    document_id: meta.document_external_id.clone(),
                    datasource_id: meta.datasource_external_id.clone(),
                })
            })
            .collect())
    }

    /// Resolve (datasource, document) external ids for each chunk,
    /// dropping results whose document or datasource cannot be resolved.
    async fn resolve_metadata(&self, chunks: Vec<Chunk>) -> AppResult<Vec<RetrievedChunk>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let document_ids: Vec<Uuid> = chunks.iter().map(|c| c.document_id).collect();

        let rows = sqlx::query_as::<_, DocumentLookupRow>(
            r#"
            SELECT d.id as document_id, d.external_id as document_external_id,
                   ds.id as datasource_id, ds.external_id as datasource_external_id,
                   d.metadata
            FROM documents d
            JOIN datasources ds ON ds.id = d.datasource_id
            WHERE d.id = ANY($1)
            "#,
        )
        .bind(&document_ids)
        .fetch_all(&self.pool)
        .await?;

        let lookup: std::collections::HashMap<Uuid, DocumentLookupRow> =
            rows.into_iter().map(|r| (r.document_id, r)).collect();

        Ok(chunks
            .into_iter()
            .filter_map(|chunk| {
                let meta = lookup.get(&chunk.document_id)?;
                Some(RetrievedChunk {
                    chunk_id: chunk.id,
                    document_id: meta.document_external_id.clone(),
                    datasource_id: meta.datasource_external_id.clone(),
                    kind: chunk.kind,
                    text: chunk.content,
                    token_count: chunk.token_count,
                    lexical_rank: None,
                    similarity: None,
                    rerank_score: None,
                    metadata: meta.metadata.clone(),
                })
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct DocumentLookupRow {
    document_id: Uuid,
    document_external_id: String,
    #[allow(dead_code)]
    datasource_id: Uuid,
    datasource_external_id: String,
    metadata: Option<serde_json::Value>,
}

/// Strip emojis, hashtags, collapse whitespace, flatten markdown — a
/// pure function so the cleaning rules are independently testable.
pub fn clean_prompt(prompt: &str) -> String {
    let without_hashtags: String = prompt
        .split_whitespace()
        .filter(|w| !w.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ");

    let without_emoji: String = without_hashtags
        .chars()
        .filter(|c| !is_emoji(*c))
        .collect();

    let without_markdown = without_emoji
        .replace(['*', '_', '`', '#'], "")
        .replace(['[', ']', '(', ')'], "");

    without_markdown.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1FAFF | 0x2600..=0x27BF | 0x1F1E6..=0x1F1FF
    )
}

/// Budget-trim in rerank order: accumulate (tokens, chars, count), stop
/// at the first index where any configured budget is exceeded. Defaults
/// to `maxTokens = 8192` when no budget is given. The first item is
/// always kept even if it alone exceeds budget (sec 8's budget-safety
/// invariant).
pub fn budget_trim(
    chunks: Vec<RetrievedChunk>,
    budgets: Budgets,
    defaults: &RetrievalDefaults,
) -> Vec<RetrievedChunk> {
    let max_tokens = budgets.max_tokens.or(Some(defaults.max_tokens));
    let max_chars = budgets.max_chars.or(defaults.max_chars);
    let max_chunks = budgets.max_chunks.or(defaults.max_chunks);

    let mut kept = Vec::new();
    let mut tokens_acc: u64 = 0;
    let mut chars_acc: u64 = 0;

    for (i, chunk) in chunks.into_iter().enumerate() {
        let chunk_tokens = chunk.token_count.max(0) as u64;
        let chunk_chars = chunk.text.chars().count() as u64;

        let would_exceed_tokens = max_tokens.is_some_and(|m| tokens_acc + chunk_tokens > m as u64);
        let would_exceed_chars = max_chars.is_some_and(|m| chars_acc + chunk_chars > m as u64);
        let would_exceed_count = max_chunks.is_some_and(|m| i as u32 >= m);

        if i > 0 && (would_exceed_tokens || would_exceed_chars || would_exceed_count) {
            break;
        }

        tokens_acc += chunk_tokens;
        chars_acc += chunk_chars;
        kept.push(chunk);

        if i == 0 && (would_exceed_tokens || would_exceed_chars || would_exceed_count) {
            break;
        }
    }

    kept
}

/// Assign a token count to freshly-retrieved chunk text, used by callers
/// assembling `RetrievedChunk` outside the orchestrator's own resolve path.
pub fn estimate_tokens(text: &str) -> u32 {
    count_tokens(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkKind;

    fn make_chunk(tokens: i32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: Uuid::new_v4(),
            document_id: "d1".to_string(),
            datasource_id: "ds1".to_string(),
            kind: ChunkKind::Chunk,
            text: text.to_string(),
            token_count: tokens,
            lexical_rank: None,
            similarity: None,
            rerank_score: Some(1.0),
            metadata: None,
        }
    }

    #[test]
    fn clean_prompt_strips_hashtags_and_markdown() {
        let cleaned = clean_prompt("What is **machine learning**? #ai");
        assert!(!cleaned.contains('#'));
        assert!(!cleaned.contains('*'));
    }

    #[test]
    fn budget_trim_keeps_first_even_over_budget() {
        let chunks = vec![make_chunk(10_000, "huge")];
        let defaults = RetrievalDefaults::default();
        let trimmed = budget_trim(chunks, Budgets { max_tokens: Some(100), ..Default::default() }, &defaults);
        assert_eq!(trimmed.len(), 1, "sole candidate is kept even over budget");
    }

    #[test]
    fn budget_trim_stops_at_first_overflow() {
        let chunks = vec![make_chunk(100, "a"), make_chunk(100, "b"), make_chunk(100, "c")];
        let defaults = RetrievalDefaults::default();
        let trimmed = budget_trim(chunks, Budgets { max_tokens: Some(150), ..Default::default() }, &defaults);
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn budget_trim_is_prefix_of_input() {
        let chunks = vec![make_chunk(50, "a"), make_chunk(50, "b"), make_chunk(50, "c")];
        let defaults = RetrievalDefaults::default();
        let trimmed = budget_trim(chunks.clone(), Budgets { max_tokens: Some(120), ..Default::default() }, &defaults);
        assert_eq!(trimmed.len(), 2);
        assert_eq!(trimmed[0].text, chunks[0].text);
        assert_eq!(trimmed[1].text, chunks[1].text);
    }

    #[test]
    fn budget_trim_respects_max_chunks() {
        let chunks = vec![make_chunk(1, "a"), make_chunk(1, "b"), make_chunk(1, "c")];
        let defaults = RetrievalDefaults::default();
        let trimmed = budget_trim(chunks, Budgets { max_chunks: Some(2), ..Default::default() }, &defaults);
        assert_eq!(trimmed.len(), 2);
    }
}
