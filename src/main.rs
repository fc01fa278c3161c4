mod commands;
mod config;
mod db;
mod entities;
mod errors;
mod events;
mod handlers;
mod health;
mod lock;
mod metrics;
mod repositories;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use redis::Client;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::commands::inventory::UseCaseContext;
use crate::events::catalog_consumer::ProductEventConsumer;
use crate::events::consumer::OrderEventConsumer;
use crate::events::EventSender;
use crate::lock::LockService;
use crate::repositories::InventoryRepositories;

pub use crate::config::AppConfig;

/// Shared application state handed to every handler and use-case.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: AppConfig,
    pub use_cases: UseCaseContext,
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" })))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_config()?;
    config::init_tracing(&config.log_level, config.log_json);

    info!("inventory-core starting");

    let db = db::establish_connection(&config.database_url)
        .await
        .map_err(|e| {
            error!("failed to connect to database: {}", e);
            e
        })?;
    let db = Arc::new(db);

    let redis_client = Arc::new(Client::open(config.redis_url.clone())?);

    let lock_service = LockService::new(
        redis_client.clone(),
        Duration::from_millis(config.lock_ttl_ms),
    );

    let event_conn = redis_client.get_tokio_connection_manager().await?;
    let event_sender = Arc::new(EventSender::new(
        event_conn,
        config.inventory_stream_key(),
        config.event_payload_max_bytes,
    ));

    let repos = InventoryRepositories::new(db.clone());

    let retry = commands::RetryPolicy::new(
        config.retry_max_attempts,
        Duration::from_millis(config.retry_max_delay_ms),
    );
    let use_cases =
        UseCaseContext::new(repos, lock_service, event_sender).with_retry_policy(retry);

    metrics::register_all();

    let consumer_conn = redis_client.get_tokio_connection_manager().await?;
    let consumer_name = format!(
        "{}-{}",
        config.consumer_group,
        uuid::Uuid::new_v4()
    );
    let mut consumer = OrderEventConsumer::new(
        consumer_conn,
        use_cases.clone(),
        &config.event_stream_prefix,
        config.consumer_group.clone(),
        consumer_name,
    );

    tokio::spawn(async move {
        if let Err(e) = consumer.ensure_consumer_groups().await {
            error!(error = %e, "failed to set up order-event consumer groups");
            return;
        }
        consumer.run().await;
    });

    let catalog_conn = redis_client.get_tokio_connection_manager().await?;
    let catalog_consumer_name = format!(
        "{}-{}",
        config.catalog_consumer_group,
        uuid::Uuid::new_v4()
    );
    let mut catalog_consumer = ProductEventConsumer::new(
        catalog_conn,
        use_cases.clone(),
        &config.product_stream_prefix,
        config.catalog_consumer_group.clone(),
        catalog_consumer_name,
    );

    tokio::spawn(async move {
        if let Err(e) = catalog_consumer.ensure_consumer_groups().await {
            error!(error = %e, "failed to set up product-event consumer groups");
            return;
        }
        catalog_consumer.run().await;
    });

    let state = Arc::new(AppState {
        db,
        config: config.clone(),
        use_cases,
    });

    let middleware = ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let app = Router::new()
        .nest("/health", health::health_routes())
        .nest("/metrics", metrics::metrics_routes())
        .nest("/inventory", handlers::inventory::inventory_routes())
        .route("/", get(|| async { "inventory-core" }))
        .fallback(not_found)
        .layer(middleware)
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
