//! `POST /v1/retrieve/{chunks,documents,questions}` — sec 4.5, sec 6.

use std::time::Instant;

use axum::{extract::State, routing::post, Json, Router};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    RetrieveChunksRequest, RetrieveChunksResponse, RetrieveDocumentsRequest, RetrieveDocumentsResponse,
    RetrieveQuestionsRequest, RetrieveQuestionsResponse, RetrievedDocumentSummary, Scope,
};
use crate::routes::support::{envelope, validate};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/retrieve/chunks", post(retrieve_chunks))
        .route("/retrieve/documents", post(retrieve_documents))
        .route("/retrieve/questions", post(retrieve_questions))
}

async fn resolve_datasources(
    state: &AppState,
    org: Uuid,
    external_ids: &[String],
) -> AppResult<Vec<Uuid>> {
    let ids = state.datasources.resolve_ids(org, external_ids).await?;
    if ids.is_empty() {
        return Err(AppError::InvalidRequest("no known datasource ids in scope".into()));
    }
    Ok(ids)
}

async fn retrieve_chunks(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Json(payload): Json<RetrieveChunksRequest>,
) -> AppResult<Json<crate::models::Envelope<RetrieveChunksResponse>>> {
    require_scope(&principal, Scope::Retrieval)?;
    validate(&payload)?;
    let started = Instant::now();

    let datasources = resolve_datasources(&state, principal.organization_id, &payload.datasource_ids).await?;
    let outcome = state
        .retrieval
        .retrieve_chunks(principal.organization_id, &datasources, &payload.query, payload.budgets)
        .await?;

    let transaction_id = Uuid::new_v4();
    state
        .logs
        .record_transaction(
            principal.organization_id,
            Some(principal.api_key_id),
            transaction_id,
            "retrieve_chunks",
            &payload.query,
            outcome.cost_usd,
            &outcome.tree,
        )
        .await
        .ok();

    Ok(Json(envelope(
        RetrieveChunksResponse { chunks: outcome.chunks },
        started,
        Some(payload.query),
        None,
        transaction_id,
        None,
    )))
}

async fn retrieve_documents(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Json(payload): Json<RetrieveDocumentsRequest>,
) -> AppResult<Json<crate::models::Envelope<RetrieveDocumentsResponse>>> {
    require_scope(&principal, Scope::Retrieval)?;
    validate(&payload)?;
    let started = Instant::now();

    let datasources = resolve_datasources(&state, principal.organization_id, &payload.datasource_ids).await?;
    let outcome = state
        .retrieval
        .retrieve_documents(principal.organization_id, &datasources, &payload.query, payload.max_documents)
        .await?;

    let documents: Vec<RetrievedDocumentSummary> = outcome
        .documents
        .into_iter()
        .map(|d| RetrievedDocumentSummary {
            document_id: d.document_id,
            datasource_id: d.datasource_id,
        })
        .collect();

    let transaction_id = Uuid::new_v4();
    state
        .logs
        .record_transaction(
            principal.organization_id,
            Some(principal.api_key_id),
            transaction_id,
            "retrieve_documents",
            &payload.query,
            outcome.cost_usd,
            &outcome.tree,
        )
        .await
        .ok();

    Ok(Json(envelope(
        RetrieveDocumentsResponse { documents, ids: outcome.ids },
        started,
        Some(payload.query),
        None,
        transaction_id,
        None,
    )))
}

async fn retrieve_questions(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Json(payload): Json<RetrieveQuestionsRequest>,
) -> AppResult<Json<crate::models::Envelope<RetrieveQuestionsResponse>>> {
    require_scope(&principal, Scope::Retrieval)?;
    validate(&payload)?;
    let started = Instant::now();

    let datasources = resolve_datasources(&state, principal.organization_id, &payload.datasource_ids).await?;
    let outcome = state
        .retrieval
        .retrieve_questions(principal.organization_id, &datasources, &payload.query, payload.max_chunks)
        .await?;

    let transaction_id = Uuid::new_v4();
    state
        .logs
        .record_transaction(
            principal.organization_id,
            Some(principal.api_key_id),
            transaction_id,
            "retrieve_questions",
            &payload.query,
            outcome.cost_usd,
            &outcome.tree,
        )
        .await
        .ok();

    Ok(Json(envelope(
        RetrieveQuestionsResponse { chunks: outcome.chunks },
        started,
        Some(payload.query),
        None,
        transaction_id,
        None,
    )))
}
