//! `POST /v1/chat` — sec 4.7, sec 6 streaming contract.

use std::convert::Infallible;
use std::time::Instant;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{extract::State, routing::post, Json, Router};
use futures_util::StreamExt;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{ChatRequest, ChatResponse, Scope};
use crate::routes::support::{envelope, validate};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::services::chat_orchestrator::ChatStreamEvent;
use crate::AppState;

const CONNECTOR_AUTH_HEADER: &str = "x-connector-auth";

pub fn routes() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

async fn chat(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    headers: axum::http::HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> AppResult<Response> {
    require_scope(&principal, Scope::Chat)?;
    validate(&payload)?;

    let connector_auth = headers
        .get(CONNECTOR_AUTH_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    if payload.stream {
        return chat_streaming(state, principal, payload, connector_auth).await;
    }

    let started = Instant::now();
    let query = payload.query.clone();
    let (response, tree, cost_usd) = state
        .chat
        .chat(principal.organization_id, principal.api_key_id, payload, connector_auth)
        .await?;

    let transaction_id = Uuid::new_v4();
    state
        .logs
        .record_transaction(
            principal.organization_id,
            Some(principal.api_key_id),
            transaction_id,
            "chat",
            &query,
            cost_usd,
            &tree,
        )
        .await
        .ok();

    let answered = response.answered;
    Ok(Json(envelope(response, started, Some(query), None, transaction_id, Some(answered))).into_response())
}

async fn chat_streaming(
    state: AppState,
    principal: ApiKeyPrincipal,
    payload: ChatRequest,
    connector_auth: Option<String>,
) -> AppResult<Response> {
    let query = payload.query.clone();
    let stream = state
        .chat
        .chat_stream(principal.organization_id, principal.api_key_id, payload, connector_auth)
        .await?;

    let sse_stream = stream.then(move |item| {
        let state = state.clone();
        let principal_org = principal.organization_id;
        let principal_key = principal.api_key_id;
        let query = query.clone();
        async move {
            match item {
                Ok(ChatStreamEvent::Delta(chunk)) => sse_event(&serde_json::json!({ "data": chunk })),
                Ok(ChatStreamEvent::Final { response, tree, cost_usd }) => {
                    let transaction_id = Uuid::new_v4();
                    state
                        .logs
                        .record_transaction(
                            principal_org,
                            Some(principal_key),
                            transaction_id,
                            "chat",
                            &query,
                            cost_usd,
                            &tree,
                        )
                        .await
                        .ok();
                    let final_envelope = final_envelope_json(&response, transaction_id, &query);
                    sse_event(&final_envelope)
                }
                Err(err) => sse_event(&serde_json::json!({
                    "data": { "error": err.to_string(), "finished": true }
                })),
            }
        }
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response())
}

fn final_envelope_json(response: &ChatResponse, transaction_id: Uuid, query: &str) -> serde_json::Value {
    serde_json::json!({
        "data": {
            "message": response.message,
            "documents": response.documents,
            "answered": response.answered,
            "confidence": response.confidence,
            "conversation_id": response.conversation_id,
            "finished": true,
        },
        "meta": {
            "query": query,
            "transaction_id": transaction_id,
            "answered": response.answered,
        },
    })
}

fn sse_event(value: &serde_json::Value) -> Result<Event, Infallible> {
    Ok(Event::default().data(value.to_string()))
}
