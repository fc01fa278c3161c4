pub mod commands;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod lock;
pub mod metrics;
pub mod repositories;

#[cfg(test)]
pub mod test_support;

use std::sync::Arc;

use crate::commands::inventory::UseCaseContext;
use crate::db::DbPool;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub use_cases: UseCaseContext,
}
