use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use tracing::instrument;

use super::{lock_key, UseCaseContext};
use crate::commands::with_retry;
use crate::entities::inventory_reservation::ReservationStatus;
use crate::errors::ServiceError;
use crate::events::Event;
use crate::repositories::{BatchItem, BestEffortOutcome};

lazy_static! {
    static ref INVENTORY_RELEASES: IntCounter = IntCounter::new(
        "inventory_releases_total",
        "Total number of inventory releases"
    )
    .expect("metric can be created");
    static ref INVENTORY_RELEASE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_release_failures_total",
            "Total number of failed inventory releases"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref INVENTORY_RELEASE_QUANTITY: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_release_quantity_total",
            "Total quantity of inventory released"
        ),
        &["sku", "reason"]
    )
    .expect("metric can be created");
}

/// Registers this module's counters with the default Prometheus registry.
pub fn register_metrics() {
    let _ = prometheus::register(Box::new(INVENTORY_RELEASES.clone()));
    let _ = prometheus::register(Box::new(INVENTORY_RELEASE_FAILURES.clone()));
    let _ = prometheus::register(Box::new(INVENTORY_RELEASE_QUANTITY.clone()));
}

/// Releases `quantity` reserved units of `sku` for `order_id` (§4.4 single-item
/// Release). `reason` is an opaque string (`order_cancelled`, `payment_failed`,
/// ...) carried through to the emitted event and the quantity metric's label.
/// A release that would drive `reserved` below zero fails with
/// `InsufficientReserved` and emits no event.
#[instrument(skip(ctx))]
pub async fn release(
    ctx: &UseCaseContext,
    order_id: &str,
    sku: &str,
    quantity: i64,
    reason: &str,
) -> Result<(), ServiceError> {
    with_retry(&ctx.retry, "release", || release_once(ctx, order_id, sku, quantity, reason)).await
}

async fn release_once(
    ctx: &UseCaseContext,
    order_id: &str,
    sku: &str,
    quantity: i64,
    reason: &str,
) -> Result<(), ServiceError> {
    let key = lock_key(sku);
    let result = ctx
        .locks
        .with_lock(&key, || async {
            let row = ctx.repos.inventory.release(sku, quantity).await?;
            ctx.repos
                .reservations
                .close_reservation(order_id, sku, ReservationStatus::Released)
                .await?;
            Ok(row)
        })
        .await;

    match result {
        Ok(row) => {
            INVENTORY_RELEASES.inc();
            INVENTORY_RELEASE_QUANTITY
                .with_label_values(&[sku, reason])
                .inc_by(quantity as u64);
            ctx.events
                .send(Event::Released {
                    order_id: order_id.to_string(),
                    sku: sku.to_string(),
                    quantity,
                    reserved_stock: row.reserved,
                    available_stock: row.available(),
                    reason: reason.to_string(),
                    timestamp: Utc::now(),
                })
                .await?;
            Ok(())
        }
        Err(error) => {
            INVENTORY_RELEASE_FAILURES
                .with_label_values(&[error.code()])
                .inc();
            Err(error)
        }
    }
}

/// Best-effort release of every item for `order_id` (§4.4 batch Release):
/// each item is locked, released, and its event emitted independently, so one
/// SKU's failure never blocks the rest.
#[instrument(skip(ctx, items))]
pub async fn release_batch(
    ctx: &UseCaseContext,
    order_id: &str,
    items: Vec<BatchItem>,
    reason: &str,
) -> BestEffortOutcome {
    let mut outcome = BestEffortOutcome::default();

    for item in items {
        match release(ctx, order_id, &item.sku, item.quantity, reason).await {
            Ok(_) => outcome.succeeded.push(item),
            Err(error) => outcome.failed.push((item, error)),
        }
    }

    outcome
}
