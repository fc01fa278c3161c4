//! Administrative REST surface over the inventory store (§6): ad-hoc CRUD and
//! reads, kept thin over the repository. Reserve/release/deduct are not
//! exposed here — they're driven exclusively by the order-event consumer.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::ApiError;
use crate::handlers::common::{created_response, success_response};
use crate::repositories::InventoryFilter;
use crate::AppState;

pub fn inventory_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_item).get(list_items))
        .route("/batch", get(batch_get_items))
        .route("/:sku", get(get_item))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateItemRequest {
    #[validate(length(min = 1))]
    pub sku: String,
    #[validate(range(min = 0))]
    pub initial_stock: i64,
    pub location: Option<String>,
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateItemRequest>,
) -> Result<axum::response::Response, ApiError> {
    req.validate()
        .map_err(|e| ApiError::ValidationError(e.to_string()))?;

    let item = state
        .use_cases
        .repos
        .inventory
        .create(&req.sku, req.initial_stock, req.location)
        .await?;

    Ok(created_response(item))
}

#[derive(Debug, Deserialize)]
pub struct ListItemsQuery {
    pub sku: Option<String>,
    pub location: Option<String>,
}

async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListItemsQuery>,
) -> Result<axum::response::Response, ApiError> {
    let items = state
        .use_cases
        .repos
        .inventory
        .list(InventoryFilter {
            sku: query.sku,
            location: query.location,
        })
        .await?;

    Ok(success_response(items))
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(sku): Path<String>,
) -> Result<axum::response::Response, ApiError> {
    let item = state
        .use_cases
        .repos
        .inventory
        .find_by_sku(&sku)
        .await?
        .ok_or_else(|| crate::errors::ServiceError::NotFound(sku.clone()))?;

    Ok(success_response(item))
}

#[derive(Debug, Deserialize)]
pub struct BatchGetQuery {
    pub skus: String,
}

/// A single entry of the `/batch` response. Unknown SKUs are returned with
/// every counter zeroed rather than omitted (§4.7).
#[derive(Debug, Serialize, Default)]
pub struct BatchItemView {
    pub stock: i64,
    pub reserved: i64,
    pub sold: i64,
    pub available: i64,
}

async fn batch_get_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BatchGetQuery>,
) -> Result<axum::response::Response, ApiError> {
    let mut items: HashMap<String, BatchItemView> = HashMap::new();
    for sku in query.skus.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let view = match state.use_cases.repos.inventory.find_by_sku(sku).await? {
            Some(item) => BatchItemView {
                stock: item.stock,
                reserved: item.reserved,
                sold: item.sold,
                available: item.available(),
            },
            None => BatchItemView::default(),
        };
        items.insert(sku.to_string(), view);
    }

    Ok(success_response(items))
}
