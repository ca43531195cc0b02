use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::AppState;

/// `GET /_/health` — reports reachability of both backing stores (sec 6).
pub fn routes() -> Router<AppState> {
    Router::new().route("/_/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let db_status = sqlx::query("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map(|_| "healthy")
        .unwrap_or("unhealthy");

    let mut redis_conn = state.redis.clone();
    let redis_status = redis::cmd("PING")
        .query_async::<String>(&mut redis_conn)
        .await
        .map(|_| "healthy")
        .unwrap_or("unhealthy");

    Json(json!({
        "status": if db_status == "healthy" && redis_status == "healthy" { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_status,
        "redis": redis_status,
    }))
}
