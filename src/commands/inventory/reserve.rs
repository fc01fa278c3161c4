use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use tracing::{instrument, warn};

use super::{lock_key, UseCaseContext};
use crate::commands::with_retry;
use crate::errors::ServiceError;
use crate::events::Event;
use crate::repositories::BatchItem;

lazy_static! {
    static ref INVENTORY_RESERVATIONS: IntCounter = IntCounter::new(
        "inventory_reservations_total",
        "Total number of successful inventory reservations"
    )
    .expect("metric can be created");
    static ref INVENTORY_RESERVATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_reservation_failures_total",
            "Total number of failed inventory reservations"
        ),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref INVENTORY_RESERVATION_QUANTITY: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "inventory_reservation_quantity_total",
            "Total quantity reserved"
        ),
        &["sku"]
    )
    .expect("metric can be created");
}

/// Registers this module's counters with the default Prometheus registry.
/// Idempotent: a duplicate-registration error (e.g. if called twice in
/// tests) is swallowed.
pub fn register_metrics() {
    let _ = prometheus::register(Box::new(INVENTORY_RESERVATIONS.clone()));
    let _ = prometheus::register(Box::new(INVENTORY_RESERVATION_FAILURES.clone()));
    let _ = prometheus::register(Box::new(INVENTORY_RESERVATION_QUANTITY.clone()));
}

/// Reserves `quantity` units of `sku` for `order_id` (§4.4 single-item
/// Reserve): acquires the per-SKU lock, applies the atomic `reserved += q`
/// predicate, records a ledger row, and emits `inventory.reserved` on
/// success. Wrapped in the use-case retry policy so transient `LockBusy`
/// failures are retried without surfacing to the caller.
#[instrument(skip(ctx))]
pub async fn reserve(
    ctx: &UseCaseContext,
    order_id: &str,
    sku: &str,
    quantity: i64,
) -> Result<(), ServiceError> {
    with_retry(&ctx.retry, "reserve", || reserve_once(ctx, order_id, sku, quantity)).await
}

async fn reserve_once(
    ctx: &UseCaseContext,
    order_id: &str,
    sku: &str,
    quantity: i64,
) -> Result<(), ServiceError> {
    let key = lock_key(sku);
    let result = ctx
        .locks
        .with_lock(&key, || async {
            let row = ctx.repos.inventory.reserve(sku, quantity).await?;
            ctx.repos
                .reservations
                .record_reservation(order_id, sku, quantity)
                .await?;
            Ok(row)
        })
        .await;

    match result {
        Ok(row) => {
            INVENTORY_RESERVATIONS.inc();
            INVENTORY_RESERVATION_QUANTITY
                .with_label_values(&[sku])
                .inc_by(quantity as u64);
            ctx.events
                .send(Event::Reserved {
                    order_id: order_id.to_string(),
                    sku: sku.to_string(),
                    quantity,
                    reserved_stock: row.reserved,
                    available_stock: row.available(),
                    timestamp: Utc::now(),
                })
                .await?;
            Ok(())
        }
        Err(error) => {
            INVENTORY_RESERVATION_FAILURES
                .with_label_values(&[error.code()])
                .inc();
            Err(error)
        }
    }
}

/// Reserves every item in `items` for `order_id` as a single unit of work
/// (§4.4 batch Reserve). Acquires every SKU's lock up front; if any
/// acquisition fails, releases what was obtained and aborts without issuing
/// reservations. Within the held locks, reserves items sequentially; on the
/// first failure, releases every already-reserved item in reverse order
/// (saga compensation) and emits `inventory.reservation_rolled_back` for
/// each. The eagerly-published `inventory.reserved` events for compensated
/// items are deliberately not retracted — the rollback events are the
/// compensating observable record (§9 "Batch compensation").
#[instrument(skip(ctx, items))]
pub async fn reserve_batch(
    ctx: &UseCaseContext,
    order_id: &str,
    items: Vec<BatchItem>,
) -> Result<(), ServiceError> {
    let mut guards = Vec::with_capacity(items.len());
    for item in &items {
        let key = lock_key(&item.sku);
        match ctx.locks.acquire(&key).await? {
            Some(guard) => guards.push(guard),
            None => {
                for guard in guards.iter().rev() {
                    let _ = ctx.locks.release_guard(guard).await;
                }
                INVENTORY_RESERVATION_FAILURES
                    .with_label_values(&["lock_busy"])
                    .inc();
                return Err(ServiceError::LockBusy(key));
            }
        }
    }

    let result = reserve_items_locked(ctx, order_id, &items).await;

    for guard in guards.iter().rev() {
        if let Err(e) = ctx.locks.release_guard(guard).await {
            warn!(lock_key = %guard.key, error = %e, "failed to release batch reserve lock");
        }
    }

    result
}

async fn reserve_items_locked(
    ctx: &UseCaseContext,
    order_id: &str,
    items: &[BatchItem],
) -> Result<(), ServiceError> {
    let mut committed: Vec<BatchItem> = Vec::new();

    for item in items {
        match ctx.repos.inventory.reserve(&item.sku, item.quantity).await {
            Ok(row) => {
                ctx.repos
                    .reservations
                    .record_reservation(order_id, &item.sku, item.quantity)
                    .await?;
                INVENTORY_RESERVATIONS.inc();
                INVENTORY_RESERVATION_QUANTITY
                    .with_label_values(&[item.sku.as_str()])
                    .inc_by(item.quantity as u64);
                ctx.events
                    .send(Event::Reserved {
                        order_id: order_id.to_string(),
                        sku: item.sku.clone(),
                        quantity: item.quantity,
                        reserved_stock: row.reserved,
                        available_stock: row.available(),
                        timestamp: Utc::now(),
                    })
                    .await?;
                committed.push(item.clone());
            }
            Err(error) => {
                INVENTORY_RESERVATION_FAILURES
                    .with_label_values(&[error.code()])
                    .inc();

                for done in committed.into_iter().rev() {
                    match ctx.repos.inventory.release(&done.sku, done.quantity).await {
                        Ok(_) => {
                            let _ = ctx
                                .repos
                                .reservations
                                .close_reservation(
                                    order_id,
                                    &done.sku,
                                    crate::entities::inventory_reservation::ReservationStatus::Released,
                                )
                                .await;
                            let _ = ctx
                                .events
                                .send(Event::ReservationRolledBack {
                                    order_id: order_id.to_string(),
                                    sku: done.sku.clone(),
                                    quantity: done.quantity,
                                    timestamp: Utc::now(),
                                })
                                .await;
                        }
                        Err(compensation_err) => {
                            warn!(
                                order_id,
                                sku = %done.sku,
                                error = %compensation_err,
                                "batch reserve compensation failed"
                            );
                        }
                    }
                }

                return Err(error);
            }
        }
    }

    Ok(())
}
