//! CRUD for `documents`, nested under a datasource's external id.
//! Submission re-queues indexing on content-hash change (sec 9).

use std::time::Instant;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{CreateDocumentRequest, Document, Envelope, Scope};
use crate::routes::support::{envelope, validate};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::services::document_service::SubmitOutcome;
use crate::services::queue_service::JobPayload;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/datasources/{datasource_id}/documents", post(submit).get(list))
        .route(
            "/datasources/{datasource_id}/documents/{external_id}",
            get(get_one).delete(delete_one),
        )
}

async fn submit(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(datasource_id): Path<String>,
    Json(payload): Json<CreateDocumentRequest>,
) -> AppResult<Json<Envelope<Document>>> {
    require_scope(&principal, Scope::DataWrite)?;
    validate(&payload)?;
    let started = Instant::now();

    let datasource = state.datasources.get(principal.organization_id, &datasource_id).await?;
    let outcome = state.documents.submit(principal.organization_id, datasource.id, payload).await?;

    let document = match outcome {
        SubmitOutcome::Created(document) | SubmitOutcome::Requeued(document) => {
            state.queue.enqueue(JobPayload::Index { document_id: document.id }).await.ok();
            document
        }
        SubmitOutcome::Unchanged(document) => document,
    };

    Ok(Json(envelope(document, started, None, None, Uuid::new_v4(), None)))
}

async fn get_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path((datasource_id, external_id)): Path<(String, String)>,
) -> AppResult<Json<Envelope<Document>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let datasource = state.datasources.get(principal.organization_id, &datasource_id).await?;
    let document = state.documents.get(principal.organization_id, datasource.id, &external_id).await?;
    Ok(Json(envelope(document, started, None, None, Uuid::new_v4(), None)))
}

async fn list(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(datasource_id): Path<String>,
) -> AppResult<Json<Envelope<Vec<Document>>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let datasource = state.datasources.get(principal.organization_id, &datasource_id).await?;
    let documents = state.documents.list(principal.organization_id, datasource.id).await?;
    Ok(Json(envelope(documents, started, None, None, Uuid::new_v4(), None)))
}

async fn delete_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path((datasource_id, external_id)): Path<(String, String)>,
) -> AppResult<Json<Envelope<()>>> {
    require_scope(&principal, Scope::DataWrite)?;
    let started = Instant::now();
    let datasource = state.datasources.get(principal.organization_id, &datasource_id).await?;
    state.documents.delete(principal.organization_id, datasource.id, &external_id).await?;
    Ok(Json(envelope((), started, None, None, Uuid::new_v4(), None)))
}
