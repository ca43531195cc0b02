//! Dual-provider LLM client — Anthropic primary, OpenAI fallback.
//!
//! Grounded on the hand-rolled Anthropic Messages client pattern (raw
//! reqwest, no SDK crate). Used by the retrieval orchestrator for HyDE
//! and query classification, and by the chat orchestrator for grounded,
//! streaming generation.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ModelPricing;
use crate::error::{AppError, AppResult};
use crate::models::QueryClass;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const HYDE_MAX_TOKENS: u32 = 256;
const CLASSIFY_MAX_TOKENS: u32 = 8;
const MAX_TOOL_ROUNDS: u32 = 4;

#[derive(Clone)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<SecretString>,
    pub openai_api_key: Option<SecretString>,
    pub default_model: String,
    pub escalated_model: String,
    pub economy_model: String,
    pub pricing: HashMap<String, ModelPricing>,
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
}

pub struct CompletionOutcome {
    pub text: String,
    pub cost_usd: f64,
}

/// A tool definition offered to the model in a `run_with_tools` round
/// (sec 4.7 BUILD_TOOLS): `searchKnowledgeBase`, `getCurrentPage`, or one
/// per bound connector.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One block of an Anthropic tool-use message. Requests carry `Text` and
/// `ToolResult` blocks; responses carry `Text` and `ToolUse` blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

/// Outcome of one non-streaming tool-use round (sec 9 "tool dispatch").
pub struct ToolRunOutcome {
    pub blocks: Vec<ContentBlock>,
    pub stop_reason: String,
    pub cost_usd: f64,
}

pub struct SummaryOutcome {
    pub summary: String,
    pub context: String,
    pub cost_usd: f64,
}

#[derive(Deserialize)]
struct SummaryJson {
    summary: String,
    context: String,
}

#[derive(Deserialize)]
struct QuestionsJson {
    questions: Vec<String>,
}

/// A synthesized hypothetical passage plus the generation cost that
/// produced it (sec 4.5 step 2b, spec.md:108 invariant iii).
pub struct HydeOutcome {
    pub text: String,
    pub cost_usd: f64,
}

/// Up to `max_questions` generated questions plus the generation cost
/// (sec 4.6 step 6, "record total cost").
pub struct QuestionsOutcome {
    pub questions: Vec<String>,
    pub cost_usd: f64,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    /// Model selected for the query's classified tier: task escalates,
    /// other lowers, question stays at the default tier (sec 4.7).
    pub fn model_for(&self, class: QueryClass) -> &str {
        match class {
            QueryClass::Task => &self.config.escalated_model,
            QueryClass::Other => &self.config.economy_model,
            QueryClass::Question => &self.config.default_model,
        }
    }

    /// Synthesizes a short hypothetical answer whose embedding becomes an
    /// additional semantic-search key (sec 4.5 step 2b). Failures here
    /// are recoverable by the caller — HyDE is an optimization, not a
    /// required stage.
    pub async fn generate_hyde(&self, prompt: &str) -> AppResult<HydeOutcome> {
        let request = CompletionRequest {
            system: "Write a short, plausible passage that could answer the question. \
                     Do not mention that it is hypothetical."
                .to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            model: self.config.economy_model.clone(),
            max_tokens: HYDE_MAX_TOKENS,
        };
        let outcome = self.complete(&request).await?;
        Ok(HydeOutcome { text: outcome.text, cost_usd: outcome.cost_usd })
    }

    /// Produces `{summary, context}` for a document's markdown (sec 4.6
    /// step 4). `context` is a short phrase later prefixed to each
    /// chunk's embedding input to bias the semantic space.
    pub async fn generate_summary(&self, markdown: &str, max_words: u32) -> AppResult<SummaryOutcome> {
        let request = CompletionRequest {
            system: format!(
                "Summarize the document in at most {max_words} words. \
                 Respond with strict JSON: {{\"summary\": \"...\", \"context\": \"a short phrase describing the document's topic\"}}."
            ),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: markdown.to_string(),
            }],
            model: self.config.default_model.clone(),
            max_tokens: max_words * 2 + 64,
        };
        let outcome = self.complete(&request).await?;
        let parsed: SummaryJson = serde_json::from_str(outcome.text.trim())
            .map_err(|e| AppError::LLMUnavailable(format!("malformed summary json: {e}")))?;
        Ok(SummaryOutcome {
            summary: parsed.summary,
            context: parsed.context,
            cost_usd: outcome.cost_usd,
        })
    }

    /// Up to `max_questions` questions answerable from `chunk_text` (sec
    /// 4.6 step 6).
    pub async fn generate_questions(&self, chunk_text: &str, max_questions: u32) -> AppResult<QuestionsOutcome> {
        let request = CompletionRequest {
            system: format!(
                "Write up to {max_questions} questions that are fully answerable from the \
                 given text alone. Respond with strict JSON: {{\"questions\": [\"...\"]}}."
            ),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: chunk_text.to_string(),
            }],
            model: self.config.economy_model.clone(),
            max_tokens: 256,
        };
        let outcome = self.complete(&request).await?;
        let parsed: QuestionsJson = serde_json::from_str(outcome.text.trim())
            .map_err(|e| AppError::LLMUnavailable(format!("malformed questions json: {e}")))?;
        Ok(QuestionsOutcome { questions: parsed.questions, cost_usd: outcome.cost_usd })
    }

    /// A short conversation title, generated once per conversation
    /// (sec 4.7 TITLE_IF_NEW). Callers swallow failures.
    pub async fn generate_title(&self, first_message: &str) -> AppResult<String> {
        let request = CompletionRequest {
            system: "Write a short, plain-text title (at most 8 words) summarizing this message. \
                     Respond with only the title, no quotes or punctuation at the end."
                .to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: first_message.to_string(),
            }],
            model: self.config.economy_model.clone(),
            max_tokens: 24,
        };
        let outcome = self.complete(&request).await?;
        Ok(outcome.text.trim().to_string())
    }

    /// Labels the query as {question, task, other} (sec 4.7 CLASSIFY).
    pub async fn classify(&self, prompt: &str) -> AppResult<QueryClass> {
        let request = CompletionRequest {
            system: "Classify the user's message as exactly one word: \
                     question, task, or other. Respond with only that word."
                .to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            model: self.config.economy_model.clone(),
            max_tokens: CLASSIFY_MAX_TOKENS,
        };
        let outcome = self.complete(&request).await?;
        Ok(parse_class(&outcome.text))
    }

    /// Non-streaming completion with provider fallback: Anthropic first,
    /// OpenAI if Anthropic is unavailable or unconfigured.
    pub async fn complete(&self, request: &CompletionRequest) -> AppResult<CompletionOutcome> {
        if self.config.anthropic_api_key.is_some() {
            match self.complete_anthropic(request).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if self.config.openai_api_key.is_some() => {
                    tracing::warn!(error = %err, "anthropic completion failed, falling back to openai");
                }
                Err(err) => return Err(AppError::LLMUnavailable(err.to_string())),
            }
        }
        if self.config.openai_api_key.is_some() {
            return self
                .complete_openai(request)
                .await
                .map_err(|e| AppError::LLMUnavailable(e.to_string()));
        }
        Err(AppError::Configuration("no LLM provider configured".into()))
    }

    /// Streams a completion, yielding text deltas as they arrive. The
    /// chat orchestrator extracts the `response` JSON field from these
    /// deltas with its own tolerant scanner.
    pub async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> AppResult<impl futures_util::Stream<Item = AppResult<String>>> {
        let Some(key) = &self.config.anthropic_api_key else {
            return Err(AppError::Configuration("anthropic api key not configured".into()));
        };
        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            stream: true,
            messages: request
                .messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
        };

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::LLMUnavailable(format!(
                "anthropic returned {}",
                response.status()
            )));
        }

        let byte_stream = response.bytes_stream();
        Ok(byte_stream.filter_map(|chunk| async move {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => return Some(Err(AppError::LLMUnavailable(e.to_string()))),
            };
            let text = String::from_utf8_lossy(&bytes);
            extract_sse_delta(&text)
        }))
    }

    async fn complete_anthropic(&self, request: &CompletionRequest) -> anyhow::Result<CompletionOutcome> {
        let key = self
            .config
            .anthropic_api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("anthropic api key not configured"))?;

        let body = AnthropicRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            stream: false,
            messages: request
                .messages
                .iter()
                .map(|m| AnthropicMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            tools: Vec::new(),
        };

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("anthropic returned {}", response.status());
        }

        let parsed: AnthropicResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .filter_map(|c| match c {
                AnthropicContent::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        let cost_usd = self.cost_for(&request.model, &parsed.usage);

        Ok(CompletionOutcome { text, cost_usd })
    }

    /// One non-streaming round-trip offering `tools` to the model (sec
    /// 4.7 LLM_RUN, phase 1). Anthropic-only — tool-use is not mirrored
    /// through the OpenAI fallback. The caller drives the bounded
    /// resolution loop: feed `messages` back in with the model's
    /// `ToolUse` blocks plus matching `ToolResult` blocks until
    /// `stop_reason` is no longer `"tool_use"` or `MAX_TOOL_ROUNDS` is
    /// reached.
    pub async fn run_with_tools(
        &self,
        system: &str,
        messages: &[BlockMessage],
        tools: &[ToolSpec],
        model: &str,
        max_tokens: u32,
    ) -> AppResult<ToolRunOutcome> {
        let key = self
            .config
            .anthropic_api_key
            .as_ref()
            .ok_or_else(|| AppError::Configuration("anthropic api key not configured".into()))?;

        let body = AnthropicToolRequest {
            model: model.to_string(),
            max_tokens,
            system: system.to_string(),
            stream: false,
            messages: messages.to_vec(),
            tools: tools.to_vec(),
        };

        let response = self
            .http
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::LLMUnavailable(format!(
                "anthropic returned {}",
                response.status()
            )));
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMUnavailable(e.to_string()))?;
        let cost_usd = self.cost_for(model, &parsed.usage);
        let blocks = parsed
            .content
            .into_iter()
            .map(|c| match c {
                AnthropicContent::Text { text } => ContentBlock::Text { text },
                AnthropicContent::ToolUse { id, name, input } => ContentBlock::ToolUse { id, name, input },
            })
            .collect();

        Ok(ToolRunOutcome {
            blocks,
            stop_reason: parsed.stop_reason.unwrap_or_default(),
            cost_usd,
        })
    }

    fn cost_for(&self, model: &str, usage: &AnthropicUsage) -> f64 {
        let Some(pricing) = self.config.pricing.get(model) else {
            return 0.0;
        };
        usage.input_tokens as f64 * pricing.input_usd_per_token
            + usage.output_tokens as f64 * pricing.output_usd_per_token
    }

    async fn complete_openai(&self, request: &CompletionRequest) -> anyhow::Result<CompletionOutcome> {
        let key = self
            .config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("openai api key not configured"))?;

        let mut messages = vec![OpenAiMessage {
            role: "system".to_string(),
            content: request.system.clone(),
        }];
        messages.extend(request.messages.iter().map(|m| OpenAiMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        }));

        let body = OpenAiRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            messages,
        };

        let response = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(key.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("openai returned {}", response.status());
        }

        let parsed: OpenAiResponse = response.json().await?;
        let cost_usd = self
            .config
            .pricing
            .get(&request.model)
            .map(|pricing| {
                parsed.usage.prompt_tokens as f64 * pricing.input_usd_per_token
                    + parsed.usage.completion_tokens as f64 * pricing.output_usd_per_token
            })
            .unwrap_or(0.0);
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(CompletionOutcome { text, cost_usd })
    }
}

/// Bound on the caller-side tool-resolution loop (sec 4.7 LLM_RUN).
pub const MAX_TOOL_RESOLUTION_ROUNDS: u32 = MAX_TOOL_ROUNDS;

fn parse_class(text: &str) -> QueryClass {
    match text.trim().to_lowercase().as_str() {
        "task" => QueryClass::Task,
        "other" => QueryClass::Other,
        _ => QueryClass::Question,
    }
}

/// Extracts the text delta from one Anthropic SSE `content_block_delta`
/// line. Returns `None` for other event types (message_start, ping, ...).
fn extract_sse_delta(chunk: &str) -> Option<AppResult<String>> {
    for line in chunk.lines() {
        let Some(data) = line.strip_prefix("data: ") else { continue };
        if let Ok(event) = serde_json::from_str::<AnthropicStreamEvent>(data) {
            if let Some(delta) = event.delta {
                if let Some(text) = delta.text {
                    return Some(Ok(text));
                }
            }
        }
    }
    None
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    stream: bool,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
}

#[derive(Serialize)]
struct AnthropicToolRequest {
    model: String,
    max_tokens: u32,
    system: String,
    stream: bool,
    messages: Vec<BlockMessage>,
    tools: Vec<ToolSpec>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
}

#[derive(Deserialize)]
struct AnthropicStreamEvent {
    delta: Option<AnthropicStreamDelta>,
}

#[derive(Deserialize)]
struct AnthropicStreamDelta {
    text: Option<String>,
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<OpenAiMessage>,
}

#[derive(Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: OpenAiUsage,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_class_defaults_to_question() {
        assert_eq!(parse_class("garbled"), QueryClass::Question);
        assert_eq!(parse_class(" Task \n"), QueryClass::Task);
        assert_eq!(parse_class("OTHER"), QueryClass::Other);
    }

    #[test]
    fn extract_sse_delta_reads_content_block_delta() {
        let chunk = "event: content_block_delta\ndata: {\"delta\":{\"text\":\"hi\"}}\n\n";
        let result = extract_sse_delta(chunk);
        assert!(matches!(result, Some(Ok(text)) if text == "hi"));
    }

    #[test]
    fn extract_sse_delta_ignores_non_delta_events() {
        let chunk = "event: ping\ndata: {}\n\n";
        assert!(extract_sse_delta(chunk).is_none());
    }
}
