use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Budgets;

/// A caller-supplied snapshot of "what the user is currently looking at",
/// injected into the prompt when `getCurrentPage` is called and no
/// retrieval is needed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnContextItem {
    pub label: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1))]
    pub query: String,
    pub agent_id: Option<String>,
    #[serde(default)]
    pub datasource_ids: Vec<String>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub turn_context: Vec<TurnContextItem>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub grounded_response: bool,
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub budgets: Budgets,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub documents: Vec<String>,
    pub answered: bool,
    pub confidence: u8,
    pub conversation_id: String,
}

/// One streamed SSE token delta (sec 6).
#[derive(Debug, Clone, Serialize)]
pub struct ChatStreamChunk {
    pub chunk: String,
    pub finished: bool,
}

/// The classify stage's query-intent label (sec 4.7): escalates or
/// lowers the LLM quality tier used for `LLM_RUN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryClass {
    Question,
    Task,
    Other,
}

/// The strict JSON contract the LLM is instructed to emit (sec 4.7).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmAnswer {
    pub response: String,
    #[serde(default, alias = "citations")]
    pub documents: Vec<String>,
    #[serde(default)]
    pub answered: bool,
    #[serde(default)]
    pub confidence: u8,
}

/// A tool exposed to the LLM during `LLM_RUN` (sec 9's tagged variant).
#[derive(Debug, Clone)]
pub enum ToolKind {
    BuiltinRetrieve,
    BuiltinCurrentPage,
    Connector(uuid::Uuid),
}

/// `POST /v1/inference` (sec 6): a bare, ungrounded completion call with
/// no retrieval or tool dispatch — the direct LLM passthrough the outer
/// layer exposes alongside `chat` and `retrieve/*`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InferenceRequest {
    #[validate(length(min = 1))]
    pub prompt: String,
    pub system: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceResponse {
    pub message: String,
}
