//! End-to-end coverage of the order-lifecycle mapping (§4.5) through the
//! use-case layer directly: order-created reserves every line, order-shipped
//! deducts them, order-cancelled releases them, and a partially out-of-stock
//! order rolls back what it already reserved. Ignored by default because
//! `UseCaseContext` needs a reachable Redis for its lock service and event
//! sender; the consumer's wire-level parsing (stream replies, payload
//! aliases, topic classification) is covered without Redis by the unit tests
//! in `src/events/consumer.rs`.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::memory_db;
use inventory_core::commands::inventory::{deduct_batch, release_batch, reserve_batch, UseCaseContext};
use inventory_core::events::EventSender;
use inventory_core::lock::LockService;
use inventory_core::repositories::{BatchItem, InventoryRepositories};
use redis::Client;

async fn test_context(stream_key: &str) -> UseCaseContext {
    let db = memory_db().await;
    let redis_url =
        std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = Arc::new(Client::open(redis_url).expect("open redis client"));

    let locks = LockService::new(client.clone(), Duration::from_millis(5_000));
    let conn = client
        .get_tokio_connection_manager()
        .await
        .expect("connect redis");
    let events = Arc::new(EventSender::new(conn, stream_key.to_string(), 256 * 1024));

    let repos = InventoryRepositories::new(db);
    UseCaseContext::new(repos, locks, events)
}

fn items(pairs: &[(&str, i64)]) -> Vec<BatchItem> {
    pairs
        .iter()
        .map(|(sku, quantity)| BatchItem {
            sku: sku.to_string(),
            quantity: *quantity,
        })
        .collect()
}

#[tokio::test]
#[ignore = "requires a reachable redis instance"]
async fn order_created_then_shipped_reserves_then_deducts() {
    let ctx = test_context("test.order_created_then_shipped").await;
    ctx.repos.inventory.create("ORD-SKU-1", 10, None).await.unwrap();
    ctx.repos.inventory.create("ORD-SKU-2", 5, None).await.unwrap();

    reserve_batch(&ctx, "order-1", items(&[("ORD-SKU-1", 3), ("ORD-SKU-2", 2)]))
        .await
        .expect("reserve batch");

    let sku1 = ctx.repos.inventory.find_by_sku("ORD-SKU-1").await.unwrap().unwrap();
    assert_eq!(sku1.reserved, 3);

    deduct_batch(&ctx, "order-1", items(&[("ORD-SKU-1", 3), ("ORD-SKU-2", 2)]))
        .await
        .expect("deduct batch");

    let sku1 = ctx.repos.inventory.find_by_sku("ORD-SKU-1").await.unwrap().unwrap();
    assert_eq!(sku1.stock, 7);
    assert_eq!(sku1.reserved, 0);
    assert_eq!(sku1.sold, 3);

    let sku2 = ctx.repos.inventory.find_by_sku("ORD-SKU-2").await.unwrap().unwrap();
    assert_eq!(sku2.stock, 3);
    assert_eq!(sku2.sold, 2);

    assert!(ctx
        .repos
        .reservations
        .list_open_reservations("order-1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
#[ignore = "requires a reachable redis instance"]
async fn order_created_then_cancelled_releases_reservations() {
    let ctx = test_context("test.order_created_then_cancelled").await;
    ctx.repos.inventory.create("ORD-SKU-3", 10, None).await.unwrap();

    reserve_batch(&ctx, "order-2", items(&[("ORD-SKU-3", 4)]))
        .await
        .expect("reserve batch");

    let outcome = release_batch(
        &ctx,
        "order-2",
        items(&[("ORD-SKU-3", 4)]),
        "order_cancelled",
    )
    .await;
    assert!(outcome.all_succeeded());

    let sku3 = ctx.repos.inventory.find_by_sku("ORD-SKU-3").await.unwrap().unwrap();
    assert_eq!(sku3.reserved, 0);
    assert_eq!(sku3.available(), 10);
}

#[tokio::test]
#[ignore = "requires a reachable redis instance"]
async fn partially_unavailable_order_rolls_back_every_reservation() {
    let ctx = test_context("test.partial_rollback").await;
    ctx.repos.inventory.create("ORD-SKU-4", 5, None).await.unwrap();
    ctx.repos.inventory.create("ORD-SKU-5", 1, None).await.unwrap();

    let err = reserve_batch(&ctx, "order-3", items(&[("ORD-SKU-4", 5), ("ORD-SKU-5", 2)]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "insufficient_stock");

    let sku4 = ctx.repos.inventory.find_by_sku("ORD-SKU-4").await.unwrap().unwrap();
    assert_eq!(sku4.reserved, 0, "the first item's reservation must be compensated");

    assert!(ctx
        .repos
        .reservations
        .list_open_reservations("order-3")
        .await
        .unwrap()
        .is_empty());
}
