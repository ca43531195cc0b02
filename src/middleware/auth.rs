use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde_json::json;

use crate::{services::auth_service::AuthService, AppState};

/// Authenticates the bearer token and inserts the resulting
/// `ApiKeyPrincipal` into request extensions. Per-route scope checks
/// (sec 1 "scope set") happen in handlers via `require_scope`, since the
/// required scope varies per endpoint; this middleware only establishes
/// identity.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "missing or invalid Authorization header" })),
        ));
    };

    let auth_service = AuthService::new(state.db.clone(), state.config.clone());
    match auth_service.authenticate(token).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Err(_) => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid or revoked api key" })),
        )),
    }
}

/// Same as `auth_middleware` but never rejects: absence or invalidity of
/// the token simply means no principal is inserted into extensions.
pub async fn optional_auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    if let Some(token) = token {
        let auth_service = AuthService::new(state.db.clone(), state.config.clone());
        if let Ok(principal) = auth_service.authenticate(&token).await {
            request.extensions_mut().insert(principal);
        }
    }

    next.run(request).await
}
