//! CRUD for `organizations` — create + get + list only (sec 5 "thin CRUD").

use std::time::Instant;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{CreateOrganizationRequest, Envelope, Organization, Scope};
use crate::routes::support::{envelope, validate};
use crate::services::auth_service::{require_scope, ApiKeyPrincipal};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/organizations", post(create).get(list))
        .route("/organizations/{external_id}", get(get_one))
}

async fn create(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Json(payload): Json<CreateOrganizationRequest>,
) -> AppResult<Json<Envelope<Organization>>> {
    require_scope(&principal, Scope::DataWrite)?;
    validate(&payload)?;
    let started = Instant::now();
    let organization = state.organizations.create(payload).await?;
    Ok(Json(envelope(organization, started, None, None, Uuid::new_v4(), None)))
}

async fn get_one(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
    Path(external_id): Path<String>,
) -> AppResult<Json<Envelope<Organization>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let organization = state.organizations.get(&external_id).await?;
    Ok(Json(envelope(organization, started, None, None, Uuid::new_v4(), None)))
}

async fn list(
    State(state): State<AppState>,
    principal: ApiKeyPrincipal,
) -> AppResult<Json<Envelope<Vec<Organization>>>> {
    require_scope(&principal, Scope::DataRead)?;
    let started = Instant::now();
    let organizations = state.organizations.list().await?;
    Ok(Json(envelope(organizations, started, None, None, Uuid::new_v4(), None)))
}
