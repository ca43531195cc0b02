use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::RetrievedChunk;

/// Budgets accepted on retrieval/chat requests. Unset fields fall back to
/// the configured `RetrievalDefaults` (maxTokens=8192, no chunk/char cap).
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Budgets {
    pub max_tokens: Option<u32>,
    pub max_chars: Option<u32>,
    pub max_chunks: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RetrieveChunksRequest {
    #[validate(length(min = 1))]
    pub query: String,
    #[validate(length(min = 1))]
    pub datasource_ids: Vec<String>,
    #[serde(flatten)]
    pub budgets: Budgets,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveChunksResponse {
    pub chunks: Vec<RetrievedChunk>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RetrieveDocumentsRequest {
    #[validate(length(min = 1))]
    pub query: String,
    #[validate(length(min = 1))]
    pub datasource_ids: Vec<String>,
    #[serde(default = "default_max_documents")]
    pub max_documents: u32,
}

fn default_max_documents() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDocumentSummary {
    pub document_id: String,
    pub datasource_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveDocumentsResponse {
    pub documents: Vec<RetrievedDocumentSummary>,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RetrieveQuestionsRequest {
    #[validate(length(min = 1))]
    pub query: String,
    #[validate(length(min = 1))]
    pub datasource_ids: Vec<String>,
    #[serde(default = "default_max_chunks")]
    pub max_chunks: u32,
}

fn default_max_chunks() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveQuestionsResponse {
    pub chunks: Vec<RetrievedChunk>,
}
