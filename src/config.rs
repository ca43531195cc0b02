use std::collections::HashMap;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;

/// Per-model USD pricing, in dollars per token (not per 1k/1M), matching
/// how `ChatOrchestrator` multiplies token counts directly.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelPricing {
    pub input_usd_per_token: f64,
    pub output_usd_per_token: f64,
}

/// Default retrieval budgets applied when a request omits them (sec 5/6).
#[derive(Clone, Debug, Deserialize)]
pub struct RetrievalDefaults {
    #[serde(default = "default_retrieval_max_tokens")]
    pub max_tokens: u32,
    pub max_chunks: Option<u32>,
    pub max_chars: Option<u32>,
    #[serde(default)]
    pub semantic_always: bool,
}

fn default_retrieval_max_tokens() -> u32 {
    8192
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            max_tokens: default_retrieval_max_tokens(),
            max_chunks: None,
            max_chars: None,
            semantic_always: false,
        }
    }
}

/// Token budgets for the chat orchestrator's prompt assembly (sec 4.7).
#[derive(Clone, Debug, Deserialize)]
pub struct ChatBudgets {
    #[serde(default = "default_instructions_max_tokens")]
    pub instructions_max_tokens: u32,
    #[serde(default = "default_history_max_tokens")]
    pub history_max_tokens: u32,
    #[serde(default = "default_turn_context_max_tokens")]
    pub turn_context_max_tokens: u32,
    #[serde(default = "default_max_conversations")]
    pub max_conversations: u32,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

fn default_instructions_max_tokens() -> u32 {
    2048
}
fn default_history_max_tokens() -> u32 {
    4096
}
fn default_turn_context_max_tokens() -> u32 {
    8192
}
fn default_max_conversations() -> u32 {
    1000
}
fn default_max_turns() -> u32 {
    200
}

impl Default for ChatBudgets {
    fn default() -> Self {
        Self {
            instructions_max_tokens: default_instructions_max_tokens(),
            history_max_tokens: default_history_max_tokens(),
            turn_context_max_tokens: default_turn_context_max_tokens(),
            max_conversations: default_max_conversations(),
            max_turns: default_max_turns(),
        }
    }
}

/// Rerank cutoff policy (open question 1: both forms are supported, neither
/// is canonical — see DESIGN.md).
#[derive(Clone, Debug, Deserialize)]
pub struct RerankPolicy {
    /// Minimum relevance score in [0,1] for a chunk to be retained.
    pub cutoff: Option<f32>,
    /// Drop chunks scoring below `threshold * median(scores)`.
    pub threshold: Option<f32>,
}

impl Default for RerankPolicy {
    fn default() -> Self {
        Self {
            cutoff: Some(0.2),
            threshold: Some(0.2),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub database_url: String,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    pub redis_url: String,

    /// Pepper mixed into every API key hash (`sha256(salt || pepper || token)`).
    pub api_key_pepper: SecretString,

    pub openai_api_key: Option<SecretString>,
    pub anthropic_api_key: Option<SecretString>,

    pub embedding_provider_url: Option<String>,
    pub embedding_model: String,
    #[serde(default = "default_embedding_cutoff")]
    pub embeddings_cutoff: f32,

    pub rerank_provider_url: Option<String>,
    pub rerank_api_key: Option<SecretString>,
    #[serde(default)]
    pub rerank_policy: RerankPolicy,
    /// Flat per-document USD cost charged by the rerank provider, since its
    /// response carries a relevance score but no usage/cost figure.
    #[serde(default)]
    pub rerank_price_usd_per_doc: f64,

    #[serde(default)]
    pub retrieval_defaults: RetrievalDefaults,

    #[serde(default)]
    pub chat_budgets: ChatBudgets,

    #[serde(default = "default_queue_workers")]
    pub queue_workers: u32,

    #[serde(default = "default_raglog_retention_days")]
    pub raglog_retention_days: u32,
    #[serde(default = "default_embeddings_retention_days")]
    pub embeddings_retention_days: u32,

    #[serde(default)]
    pub llm_pricing: HashMap<String, ModelPricing>,

    /// CORS allowed origins (comma-separated).
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: String,
}

fn default_cors_origins() -> String {
    "http://localhost:3000,http://127.0.0.1:3000".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_connections() -> u32 {
    10
}

fn default_embedding_cutoff() -> f32 {
    0.5
}

fn default_queue_workers() -> u32 {
    4
}

fn default_raglog_retention_days() -> u32 {
    90
}

fn default_embeddings_retention_days() -> u32 {
    365
}

impl Config {
    /// Load configuration from environment variables, plus an optional
    /// `LLM_PRICING_JSON` blob (model name -> per-token USD rates) since the
    /// `config` crate's flat env source can't express a nested map cleanly.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let mut cfg: Config = raw.try_deserialize()?;

        if let Ok(pricing_json) = std::env::var("LLM_PRICING_JSON") {
            cfg.llm_pricing = serde_json::from_str(&pricing_json)
                .context("LLM_PRICING_JSON must be a JSON object of model -> pricing")?;
        }

        Ok(cfg)
    }

    pub fn pricing_for(&self, model: &str) -> Option<&ModelPricing> {
        self.llm_pricing.get(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(pepper: &str) -> Config {
        Config {
            environment: "development".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            database_url: "postgres://localhost/test".to_string(),
            database_max_connections: 5,
            redis_url: "redis://localhost".to_string(),
            api_key_pepper: SecretString::from(pepper),
            openai_api_key: None,
            anthropic_api_key: None,
            embedding_provider_url: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embeddings_cutoff: 0.5,
            rerank_provider_url: None,
            rerank_api_key: None,
            rerank_policy: RerankPolicy::default(),
            rerank_price_usd_per_doc: 0.0,
            retrieval_defaults: RetrievalDefaults::default(),
            chat_budgets: ChatBudgets::default(),
            queue_workers: 4,
            raglog_retention_days: 90,
            embeddings_retention_days: 365,
            llm_pricing: HashMap::new(),
            cors_allowed_origins: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn default_retrieval_budgets_match_spec_defaults() {
        let defaults = RetrievalDefaults::default();
        assert_eq!(defaults.max_tokens, 8192);
        assert!(defaults.max_chunks.is_none());
        assert!(defaults.max_chars.is_none());
        assert!(!defaults.semantic_always);
    }

    #[test]
    fn rerank_policy_defaults_are_both_present() {
        let policy = RerankPolicy::default();
        assert!(policy.cutoff.is_some());
        assert!(policy.threshold.is_some());
    }

    #[test]
    fn pricing_lookup_is_case_sensitive_and_absent_by_default() {
        let config = make_config("pepper");
        assert!(config.pricing_for("claude-3-5-sonnet").is_none());
    }

    #[test]
    fn pricing_lookup_finds_inserted_model() {
        let mut config = make_config("pepper");
        config.llm_pricing.insert(
            "gpt-4o".to_string(),
            ModelPricing {
                input_usd_per_token: 0.000005,
                output_usd_per_token: 0.000015,
            },
        );
        let pricing = config.pricing_for("gpt-4o").expect("pricing present");
        assert!(pricing.output_usd_per_token > pricing.input_usd_per_token);
    }

    #[test]
    fn default_cors_origins_contains_localhost() {
        assert!(default_cors_origins().contains("localhost:3000"));
    }

    #[test]
    fn default_queue_workers_is_positive() {
        assert!(default_queue_workers() > 0);
    }
}
