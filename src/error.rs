use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::reasoning_tree::ReasoningTree;

/// Application error kinds, matching the core's machine-readable error
/// taxonomy. Every variant maps to an HTTP status and never leaks an
/// internal message for 5xx classes.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("access denied")]
    Forbidden,

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("llm unavailable: {0}")]
    LLMUnavailable(String),

    #[error("rerank unavailable: {0}")]
    RerankUnavailable(String),

    #[error("connector failed: {0}")]
    ConnectorFailed(String),

    #[error("retrieval failed: {message}")]
    RetrievalFailed {
        message: String,
        tree: Option<Box<ReasoningTree>>,
    },

    #[error("indexing failed: {0}")]
    IndexingFailed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable error kind, returned alongside the human message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::NotFound(_) => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::RateLimited => "RateLimited",
            Self::Configuration(_) => "Configuration",
            Self::StoreUnavailable(_) => "StoreUnavailable",
            Self::LLMUnavailable(_) => "LLMUnavailable",
            Self::RerankUnavailable(_) => "RerankUnavailable",
            Self::ConnectorFailed(_) => "ConnectorFailed",
            Self::RetrievalFailed { .. } => "RetrievalFailed",
            Self::IndexingFailed(_) => "IndexingFailed",
            Self::Database(_) => "Internal",
            Self::Internal(_) => "Internal",
        }
    }

    pub fn retrieval_failed(message: impl Into<String>, tree: Option<ReasoningTree>) -> Self {
        Self::RetrievalFailed {
            message: message.into(),
            tree: tree.map(Box::new),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Conflict(msg) => {
                tracing::warn!("conflict: {msg}");
                (StatusCode::CONFLICT, "Conflict".to_string())
            }
            Self::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            Self::Configuration(msg) => {
                tracing::error!("configuration error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration error".to_string())
            }
            Self::StoreUnavailable(msg) => {
                tracing::error!("store unavailable: {msg}");
                (StatusCode::BAD_GATEWAY, "store unavailable".to_string())
            }
            Self::LLMUnavailable(msg) => {
                tracing::error!("llm unavailable: {msg}");
                (StatusCode::BAD_GATEWAY, "llm unavailable".to_string())
            }
            Self::RerankUnavailable(msg) => {
                tracing::error!("rerank unavailable: {msg}");
                (StatusCode::BAD_GATEWAY, "rerank unavailable".to_string())
            }
            Self::ConnectorFailed(msg) => {
                tracing::warn!("connector failed: {msg}");
                (StatusCode::BAD_GATEWAY, "connector failed".to_string())
            }
            Self::RetrievalFailed { message, .. } => {
                tracing::error!("retrieval failed: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, "retrieval failed".to_string())
            }
            Self::IndexingFailed(msg) => {
                tracing::error!("indexing failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "indexing failed".to_string())
            }
            Self::Database(e) => {
                tracing::error!("database error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "database error".to_string())
            }
            Self::Internal(e) => {
                tracing::error!("internal error: {e:?}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };

        let body = Json(json!({
            "message": message,
            "errors": [] as [String; 0],
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}

/// Convenient Result type alias
pub type AppResult<T> = std::result::Result<T, AppError>;
