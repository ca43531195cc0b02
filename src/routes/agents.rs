//! CRUD for `agents` — a named grouping of datasources (sec 3).

use std::time::Instant;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Agent, CreateAgentRequest, Envelope, Scope};
use crate::routes::support::{envelope, validate};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/agents", post(create).get(list))
        .route("/agents/{external_id}", get(get_one).delete(delete_one))
}

async fn create(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Json(payload): Json<CreateAgentRequest>,
) -> AppResult<Json<Envelope<Agent>>> {
    require_scope(&principal, Scope::DataWrite)?;
    validate(&payload)?;
    let started = Instant::now();

    let datasource_ids = state
        .datasources
        .resolve_ids(principal.organization_id, &payload.datasource_ids)
        .await?;
    let agent = state.agents.create(principal.organization_id, payload, datasource_ids).await?;
    Ok(Json(envelope(agent, started, None, None, Uuid::new_v4(), None)))
}

async fn get_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(external_id): Path<String>,
) -> AppResult<Json<Envelope<Agent>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let agent = state.agents.get(principal.organization_id, &external_id).await?;
    Ok(Json(envelope(agent, started, None, None, Uuid::new_v4(), None)))
}

async fn list(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
) -> AppResult<Json<Envelope<Vec<Agent>>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let agents = state.agents.list(principal.organization_id).await?;
    Ok(Json(envelope(agents, started, None, None, Uuid::new_v4(), None)))
}

async fn delete_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(external_id): Path<String>,
) -> AppResult<Json<Envelope<()>>> {
    require_scope(&principal, Scope::DataWrite)?;
    let started = Instant::now();
    state.agents.delete(principal.organization_id, &external_id).await?;
    Ok(Json(envelope((), started, None, None, Uuid::new_v4(), None)))
}
