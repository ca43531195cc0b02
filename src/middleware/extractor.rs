use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::services::auth_service::{ApiKeyPrincipal, AuthService};
use crate::{error::AppError, AppState};

/// Extractor rejection type
#[derive(Debug)]
pub struct AuthError(pub String);

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": self.0 }))).into_response()
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        AuthError(err.to_string())
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Authenticates the bearer token into an `ApiKeyPrincipal` (sec 6
/// "bearer-authenticated"). Every scoped route extracts this directly
/// rather than going through a separate middleware layer.
impl<S> FromRequestParts<S> for ApiKeyPrincipal
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = bearer_token(parts).ok_or_else(|| AuthError("missing bearer token".to_string()))?;
        let auth_service = AuthService::new(state.db.clone(), state.config.clone());
        Ok(auth_service.authenticate(&token).await?)
    }
}

/// Same as `ApiKeyPrincipal`, but absent rather than rejecting when no
/// token is supplied or it doesn't validate.
#[derive(Debug, Clone)]
pub struct OptionalPrincipal(pub Option<ApiKeyPrincipal>);

impl<S> FromRequestParts<S> for OptionalPrincipal
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let principal = match bearer_token(parts) {
            Some(token) => {
                let auth_service = AuthService::new(state.db.clone(), state.config.clone());
                auth_service.authenticate(&token).await.ok()
            }
            None => None,
        };
        Ok(OptionalPrincipal(principal))
    }
}

/// Request metadata for audit logging
#[derive(Debug, Clone, Serialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get("x-real-ip")
                    .and_then(|h| h.to_str().ok())
                    .map(|s| s.to_string())
            });

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string());

        Ok(RequestMeta { ip_address, user_agent })
    }
}
