//! `POST /v1/inference` (sec 6) — a bare LLM completion with no
//! retrieval, grounding, or tool dispatch; the direct passthrough the
//! outer layer exposes alongside `chat` and `retrieve/*`.

use std::time::Instant;

use axum::{extract::State, routing::post, Json, Router};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Envelope, InferenceRequest, InferenceResponse, QueryClass, Scope};
use crate::routes::support::{envelope, validate};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::services::llm_client::{ChatMessage, CompletionRequest};
use crate::services::tokenizer::truncate_to_tokens;
use crate::AppState;

const INSTRUCTIONS_MAX_TOKENS: u32 = 512;
const MAX_TOKENS: u32 = 1024;
const DEFAULT_SYSTEM: &str = "You are a helpful assistant. Answer the prompt directly.";

pub fn routes() -> Router<AppState> {
    Router::new().route("/inference", post(inference))
}

async fn inference(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Json(payload): Json<InferenceRequest>,
) -> AppResult<Json<Envelope<InferenceResponse>>> {
    require_scope(&principal, Scope::Chat)?;
    validate(&payload)?;
    let started = Instant::now();

    let mut system = payload.system.clone().unwrap_or_else(|| DEFAULT_SYSTEM.to_string());
    if let Some(instructions) = &payload.instructions {
        system.push_str("\n\nAdditional instructions:\n");
        system.push_str(&truncate_to_tokens(instructions, INSTRUCTIONS_MAX_TOKENS));
    }

    let model = state.llm.model_for(QueryClass::Question).to_string();
    let request = CompletionRequest {
        system,
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: payload.prompt.clone(),
        }],
        model: model.clone(),
        max_tokens: MAX_TOKENS,
    };
    let outcome = state.llm.complete(&request).await?;

    let transaction_id = Uuid::new_v4();
    state
        .logs
        .record_cost(principal.organization_id, Some(principal.api_key_id), transaction_id, "inference", outcome.cost_usd)
        .await
        .ok();

    Ok(Json(envelope(
        InferenceResponse { message: outcome.text },
        started,
        Some(payload.prompt),
        Some(model),
        transaction_id,
        None,
    )))
}
