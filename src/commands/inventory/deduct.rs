use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use tracing::instrument;

use super::{lock_key, UseCaseContext};
use crate::commands::with_retry;
use crate::entities::inventory_reservation::ReservationStatus;
use crate::errors::ServiceError;
use crate::events::{DeductedItem, Event, FailedItem};
use crate::repositories::BatchItem;

const LOW_STOCK_THRESHOLD: i64 = 10;

lazy_static! {
    static ref INVENTORY_DEDUCTIONS: IntCounter = IntCounter::new(
        "inventory_deductions_total",
        "Total number of inventory deductions"
    )
    .expect("metric can be created");
    static ref INVENTORY_DEDUCTION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_deduction_failures_total",
            "Total number of failed inventory deductions"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref INVENTORY_DEDUCTION_QUANTITY: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_deduction_quantity_total",
            "Total quantity deducted (sold)"
        ),
        &["sku"]
    )
    .expect("metric can be created");
    static ref INVENTORY_LOW_STOCK_EVENTS: IntCounter = IntCounter::new(
        "inventory_low_stock_events_total",
        "Total number of low-stock events emitted"
    )
    .expect("metric can be created");
    static ref INVENTORY_OUT_OF_STOCK_EVENTS: IntCounter = IntCounter::new(
        "inventory_out_of_stock_events_total",
        "Total number of out-of-stock events emitted"
    )
    .expect("metric can be created");
}

/// Registers this module's counters with the default Prometheus registry.
pub fn register_metrics() {
    let _ = prometheus::register(Box::new(INVENTORY_DEDUCTIONS.clone()));
    let _ = prometheus::register(Box::new(INVENTORY_DEDUCTION_FAILURES.clone()));
    let _ = prometheus::register(Box::new(INVENTORY_DEDUCTION_QUANTITY.clone()));
    let _ = prometheus::register(Box::new(INVENTORY_LOW_STOCK_EVENTS.clone()));
    let _ = prometheus::register(Box::new(INVENTORY_OUT_OF_STOCK_EVENTS.clone()));
}

/// Commits `quantity` reserved units of `sku` to a sale for `order_id`
/// (§4.4 single-item Deduct): requires both `stock >= q` and `reserved >= q`
/// at commit, emits `inventory.deducted`, and then `inventory.low_stock` or
/// `inventory.out_of_stock` depending on the resulting available stock.
#[instrument(skip(ctx))]
pub async fn deduct(
    ctx: &UseCaseContext,
    order_id: &str,
    sku: &str,
    quantity: i64,
) -> Result<(), ServiceError> {
    with_retry(&ctx.retry, "deduct", || deduct_once(ctx, order_id, sku, quantity)).await
}

async fn deduct_once(
    ctx: &UseCaseContext,
    order_id: &str,
    sku: &str,
    quantity: i64,
) -> Result<(), ServiceError> {
    let key = lock_key(sku);
    let result = ctx
        .locks
        .with_lock(&key, || async {
            let row = ctx.repos.inventory.deduct(sku, quantity).await?;
            ctx.repos
                .reservations
                .close_reservation(order_id, sku, ReservationStatus::Deducted)
                .await?;
            Ok(row)
        })
        .await;

    let row = match result {
        Ok(row) => row,
        Err(error) => {
            INVENTORY_DEDUCTION_FAILURES
                .with_label_values(&[error.code()])
                .inc();
            return Err(error);
        }
    };

    INVENTORY_DEDUCTIONS.inc();
    INVENTORY_DEDUCTION_QUANTITY
        .with_label_values(&[sku])
        .inc_by(quantity as u64);

    let available = row.available();
    ctx.events
        .send(Event::Deducted {
            order_id: order_id.to_string(),
            sku: sku.to_string(),
            quantity,
            remaining_stock: row.stock,
            reserved_stock: row.reserved,
            total_sold: row.sold,
            available_stock: available,
            timestamp: Utc::now(),
        })
        .await?;

    if (1..=LOW_STOCK_THRESHOLD).contains(&available) {
        INVENTORY_LOW_STOCK_EVENTS.inc();
        ctx.events
            .send(Event::LowStock {
                sku: sku.to_string(),
                available_stock: available,
                reserved_stock: row.reserved,
                threshold: LOW_STOCK_THRESHOLD,
                timestamp: Utc::now(),
            })
            .await?;
    } else if available == 0 {
        INVENTORY_OUT_OF_STOCK_EVENTS.inc();
        ctx.events
            .send(Event::OutOfStock {
                sku: sku.to_string(),
                reserved_stock: row.reserved,
                total_sold: row.sold,
                timestamp: Utc::now(),
            })
            .await?;
    }

    Ok(())
}

/// Best-effort deduction of every item for `order_id` (§4.4 batch Deduct).
/// On any partial failure, emits a single `inventory.partial_deduction`
/// summarising which SKUs committed and which didn't; the failing SKUs keep
/// `reserved > 0` and require operator attention (§9 "Error recovery on
/// partial deduct").
#[instrument(skip(ctx, items))]
pub async fn deduct_batch(ctx: &UseCaseContext, order_id: &str, items: Vec<BatchItem>) -> Result<(), ServiceError> {
    let mut deducted_items = Vec::new();
    let mut failed_items = Vec::new();

    for item in items {
        match deduct(ctx, order_id, &item.sku, item.quantity).await {
            Ok(_) => deducted_items.push(DeductedItem {
                sku: item.sku,
                quantity: item.quantity,
            }),
            Err(error) => failed_items.push(FailedItem {
                sku: item.sku,
                quantity: item.quantity,
                reason: error.to_string(),
            }),
        }
    }

    if !failed_items.is_empty() {
        ctx.events
            .send(Event::PartialDeduction {
                order_id: order_id.to_string(),
                deducted_items,
                failed_items,
                timestamp: Utc::now(),
            })
            .await?;
    }

    Ok(())
}
