mod agents;
mod chat;
mod connectors;
mod datasources;
mod documents;
mod health;
mod inference;
mod organizations;
mod retrieve;
pub mod support;
mod transactions;

use axum::Router;

use crate::AppState;

/// Unauthenticated health check, mounted outside the `/v1` prefix.
pub fn health_routes() -> Router<AppState> {
    health::routes()
}

/// Combine all authenticated `/v1` API routes (sec 6).
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(organizations::routes())
        .merge(agents::routes())
        .merge(datasources::routes())
        .merge(documents::routes())
        .merge(connectors::routes())
        .merge(retrieve::routes())
        .merge(chat::routes())
        .merge(inference::routes())
        .merge(transactions::routes())
}
