//! CRUD for `connectors`, nested under a datasource's external id.

use std::time::Instant;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Connector, CreateConnectorRequest, Envelope, Scope};
use crate::routes::support::{envelope, validate};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/datasources/{datasource_id}/connectors", post(create).get(list))
        .route("/connectors/{connector_id}", get(get_one).delete(delete_one))
}

async fn create(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(datasource_id): Path<String>,
    Json(payload): Json<CreateConnectorRequest>,
) -> AppResult<Json<Envelope<Connector>>> {
    require_scope(&principal, Scope::DataWrite)?;
    validate(&payload)?;
    let started = Instant::now();
    let datasource = state.datasources.get(principal.organization_id, &datasource_id).await?;
    let connector = state.connectors.create(principal.organization_id, datasource.id, payload).await?;
    Ok(Json(envelope(connector, started, None, None, Uuid::new_v4(), None)))
}

async fn list(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(datasource_id): Path<String>,
) -> AppResult<Json<Envelope<Vec<Connector>>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let datasource = state.datasources.get(principal.organization_id, &datasource_id).await?;
    let connectors = state
        .connectors
        .list_for_datasources(principal.organization_id, &[datasource.id])
        .await?;
    Ok(Json(envelope(connectors, started, None, None, Uuid::new_v4(), None)))
}

async fn get_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(connector_id): Path<Uuid>,
) -> AppResult<Json<Envelope<Connector>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let connector = state.connectors.get(principal.organization_id, connector_id).await?;
    Ok(Json(envelope(connector, started, None, None, Uuid::new_v4(), None)))
}

async fn delete_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(connector_id): Path<Uuid>,
) -> AppResult<Json<Envelope<()>>> {
    require_scope(&principal, Scope::DataWrite)?;
    let started = Instant::now();
    state.connectors.delete(principal.organization_id, connector_id).await?;
    Ok(Json(envelope((), started, None, None, Uuid::new_v4(), None)))
}
