//! `GET /v1/transactions/{id}` (sec 6, sec 9) — RAG log inspection:
//! returns the decompressed reasoning tree recorded for a prior
//! retrieve/chat/inference transaction.

use std::time::Instant;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Envelope, Scope};
use crate::routes::support::{envelope, validate_uuid};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::services::reasoning_tree::ReasoningTree;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/transactions/{id}", get(get_transaction))
}

#[derive(Serialize)]
struct TransactionView {
    transaction_id: Uuid,
    reasoning_tree: ReasoningTree,
}

async fn get_transaction(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<TransactionView>>> {
    require_scope(&principal, Scope::Reports)?;
    let transaction_id = validate_uuid(&id)?;
    let started = Instant::now();

    let (query, reasoning_tree) = state
        .logs
        .get_transaction(principal.organization_id, transaction_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction '{id}'")))?;

    Ok(Json(envelope(
        TransactionView { transaction_id, reasoning_tree },
        started,
        Some(query),
        None,
        transaction_id,
        None,
    )))
}
