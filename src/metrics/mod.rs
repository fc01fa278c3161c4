//! Prometheus text-exposition endpoint, gathering the counters registered by
//! the commands module's `lazy_static!` metrics alongside the default process
//! collectors.

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, TextEncoder};
use tracing::error;

use crate::commands::inventory::{deduct, release, reserve};

/// Registers every use-case counter with the default registry. Called once
/// during startup, before the first request or order event is handled.
pub fn register_all() {
    reserve::register_metrics();
    release::register_metrics();
    deduct::register_metrics();
}

pub fn metrics_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/", get(metrics_handler))
}

async fn metrics_handler() -> impl IntoResponse {
    let metric_families = prometheus::gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "failed to encode prometheus metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "prometheus output was not valid utf-8");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
