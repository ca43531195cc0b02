//! CRUD for `datasources` — create + get + list + delete (sec 5 "thin CRUD").

use std::time::Instant;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{CreateDatasourceRequest, Datasource, Envelope, Scope};
use crate::routes::support::{envelope, validate};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/datasources", post(create).get(list))
        .route("/datasources/{external_id}", get(get_one).delete(delete_one))
}

async fn create(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Json(payload): Json<CreateDatasourceRequest>,
) -> AppResult<Json<Envelope<Datasource>>> {
    require_scope(&principal, Scope::DataWrite)?;
    validate(&payload)?;
    let started = Instant::now();
    let datasource = state.datasources.create(principal.organization_id, payload).await?;
    Ok(Json(envelope(datasource, started, None, None, Uuid::new_v4(), None)))
}

async fn get_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(external_id): Path<String>,
) -> AppResult<Json<Envelope<Datasource>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let datasource = state.datasources.get(principal.organization_id, &external_id).await?;
    Ok(Json(envelope(datasource, started, None, None, Uuid::new_v4(), None)))
}

async fn list(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
) -> AppResult<Json<Envelope<Vec<Datasource>>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let datasources = state.datasources.list(principal.organization_id).await?;
    Ok(Json(envelope(datasources, started, None, None, Uuid::new_v4(), None)))
}

async fn delete_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(external_id): Path<String>,
) -> AppResult<Json<Envelope<()>>> {
    require_scope(&principal, Scope::DataWrite)?;
    let started = Instant::now();
    state.datasources.delete(principal.organization_id, &external_id).await?;
    Ok(Json(envelope((), started, None, None, Uuid::new_v4(), None)))
}
