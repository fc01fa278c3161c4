//! Liveness/readiness surface (§6 `GET /health`): reports whether the
//! database and the Redis-backed lock/event backend are reachable.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tracing::warn;

use crate::AppState;

pub fn health_routes() -> Router<std::sync::Arc<AppState>> {
    Router::new().route("/", get(health_check))
}

async fn health_check(State(state): State<std::sync::Arc<AppState>>) -> impl IntoResponse {
    let db_ok = state
        .db
        .ping()
        .await
        .map_err(|e| warn!(error = %e, "database health check failed"))
        .is_ok();

    let redis_ok = match state.use_cases.locks.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "redis health check failed");
            false
        }
    };

    let healthy = db_ok && redis_ok;
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "database": db_ok,
            "redis": redis_ok,
        })),
    )
}
