//! Product-catalog sync use-cases (§6 inbound `product.created`/`product.updated`).
//! Unlike reserve/release/deduct these aren't driven by the order lifecycle
//! and carry no dedup ledger entry: a duplicate `product.created` is just a
//! duplicate-sku create, and `product.updated` is naturally idempotent.

use chrono::Utc;
use tracing::instrument;

use super::{lock_key, UseCaseContext};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::repositories::InventoryFieldUpdate;

/// Creates an inventory row from a `product.created` event, with
/// `reserved = 0`. A duplicate delivery for a sku that already exists is
/// treated as benign, not propagated as an error (§6).
#[instrument(skip(ctx))]
pub async fn sync_created(
    ctx: &UseCaseContext,
    sku: &str,
    initial_stock: i64,
    location: Option<String>,
) -> Result<(), ServiceError> {
    match ctx.repos.inventory.create(sku, initial_stock, location).await {
        Ok(_) => Ok(()),
        Err(ServiceError::DuplicateSku(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Patches a row's `stock` from a `product.updated` event via the non-atomic
/// `updateFields` path, guarded by the per-sku lock so it can't race a
/// concurrent reserve/release/deduct. Emits `inventory.updated` on success.
#[instrument(skip(ctx))]
pub async fn sync_updated(ctx: &UseCaseContext, sku: &str, stock: i64) -> Result<(), ServiceError> {
    let key = lock_key(sku);
    let row = ctx
        .locks
        .with_lock(&key, || async {
            ctx.repos
                .inventory
                .update_fields(
                    sku,
                    InventoryFieldUpdate {
                        stock: Some(stock),
                        location: None,
                    },
                )
                .await
        })
        .await?;

    ctx.events
        .send(Event::Updated {
            sku: sku.to_string(),
            stock: row.stock,
            reserved: row.reserved,
            sold: row.sold,
            timestamp: Utc::now(),
        })
        .await
}
