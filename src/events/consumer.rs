//! Order-event handler (§4.5): consumes the order lifecycle topics over Redis
//! Streams with a durable consumer group and translates each transition into
//! a Reserve/Release/Deduct use-case call, deduplicating via the processed-
//! event ledger before every invocation.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{RedisResult, Value as RedisValue};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

use crate::commands::inventory::{deduct, release, reserve, UseCaseContext};
use crate::errors::ServiceError;
use crate::events::redis_stream::{parse_autoclaim_reply, parse_streams_reply};
use crate::repositories::BatchItem;

const ORDER_TOPICS: &[&str] = &["created", "updated", "cancelled", "delivered", "shipped", "paid"];

/// Minimum time an entry must sit unacknowledged in the consumer group's PEL
/// before `XAUTOCLAIM` reclaims it. Bounds recovery latency after a crash
/// between a committed use-case and its `XACK` without fighting a replica
/// that's merely slow to finish the same entry.
const STALE_CLAIM_IDLE_MS: usize = 30_000;

#[derive(Debug, Deserialize)]
struct OrderItemPayload {
    sku: String,
    quantity: i64,
}

#[derive(Debug, Deserialize)]
struct OrderEventPayload {
    #[serde(alias = "_id")]
    order_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    items: Option<Vec<OrderItemPayload>>,
}

/// Subscribes to `{prefix}.created`, `{prefix}.updated`, `{prefix}.cancelled`,
/// `{prefix}.delivered`, `{prefix}.shipped`, `{prefix}.paid` and dispatches
/// each entry per the mapping table in §4.5.
pub struct OrderEventConsumer {
    conn: ConnectionManager,
    ctx: UseCaseContext,
    consumer_group: String,
    consumer_name: String,
    streams: Vec<String>,
}

impl OrderEventConsumer {
    pub fn new(
        conn: ConnectionManager,
        ctx: UseCaseContext,
        stream_prefix: &str,
        consumer_group: String,
        consumer_name: String,
    ) -> Self {
        let streams = ORDER_TOPICS
            .iter()
            .map(|topic| format!("{}.{}", stream_prefix, topic))
            .collect();

        Self {
            conn,
            ctx,
            consumer_group,
            consumer_name,
            streams,
        }
    }

    /// Creates the consumer group on every subscribed stream. Idempotent: a
    /// `BUSYGROUP` reply means the group already exists from a prior run.
    pub async fn ensure_consumer_groups(&mut self) -> Result<(), ServiceError> {
        for stream in self.streams.clone() {
            let result: RedisResult<String> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut self.conn)
                .await;

            if let Err(e) = result {
                if !e.to_string().contains("BUSYGROUP") {
                    return Err(ServiceError::EventError(format!(
                        "XGROUP CREATE failed for {stream}: {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Runs the read-dispatch-acknowledge loop until cancelled. A failed poll
    /// (connection error, etc.) is logged and retried after a short delay;
    /// per §7's propagation policy the handler never re-throws into the
    /// caller so a single bad poll cannot halt the consumer permanently.
    pub async fn run(mut self) {
        loop {
            if let Err(e) = self.claim_stale_entries().await {
                error!(error = %e, "stale PEL reclaim failed, continuing");
            }

            if let Err(e) = self.poll_once().await {
                error!(error = %e, "order event poll failed, backing off");
                sleep(Duration::from_millis(500)).await;
            }
        }
    }

    /// Reclaims entries idle for longer than [`STALE_CLAIM_IDLE_MS`] in this
    /// consumer group's PEL via `XAUTOCLAIM` and processes them exactly like
    /// a fresh delivery. Recovers entries left behind by a replica that
    /// crashed between committing a use-case and acknowledging it; without
    /// this, such an entry would sit in the PEL forever since `XREADGROUP
    /// ... >` only ever returns entries that have never been delivered.
    async fn claim_stale_entries(&mut self) -> Result<(), ServiceError> {
        for stream in self.streams.clone() {
            let reply: RedisValue = redis::cmd("XAUTOCLAIM")
                .arg(&stream)
                .arg(&self.consumer_group)
                .arg(&self.consumer_name)
                .arg(STALE_CLAIM_IDLE_MS)
                .arg("0-0")
                .arg("COUNT")
                .arg(10)
                .query_async(&mut self.conn)
                .await
                .map_err(|e| ServiceError::EventError(format!("XAUTOCLAIM failed for {stream}: {e}")))?;

            for (id, fields) in parse_autoclaim_reply(reply) {
                self.handle_entry(&stream, &id, fields).await;
                let _: RedisResult<i64> = redis::cmd("XACK")
                    .arg(&stream)
                    .arg(&self.consumer_group)
                    .arg(&id)
                    .query_async(&mut self.conn)
                    .await;
            }
        }
        Ok(())
    }

    async fn poll_once(&mut self) -> Result<(), ServiceError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.consumer_group)
            .arg(&self.consumer_name)
            .arg("COUNT")
            .arg(10)
            .arg("BLOCK")
            .arg(5000)
            .arg("STREAMS");
        for stream in &self.streams {
            cmd.arg(stream);
        }
        for _ in &self.streams {
            cmd.arg(">");
        }

        let reply: RedisValue = cmd
            .query_async(&mut self.conn)
            .await
            .map_err(|e| ServiceError::EventError(format!("XREADGROUP failed: {e}")))?;

        let Some(streams) = parse_streams_reply(reply) else {
            return Ok(());
        };

        for (stream, entries) in streams {
            for (id, fields) in entries {
                self.handle_entry(&stream, &id, fields).await;
                // Offset commit happens unconditionally once the use-case has
                // returned (successfully or not): a poison message must not
                // block the stream.
                let _: RedisResult<i64> = redis::cmd("XACK")
                    .arg(&stream)
                    .arg(&self.consumer_group)
                    .arg(&id)
                    .query_async(&mut self.conn)
                    .await;
            }
        }

        Ok(())
    }

    #[instrument(skip(self, fields))]
    async fn handle_entry(&self, stream: &str, id: &str, fields: Vec<(String, String)>) {
        let Some((_, raw)) = fields.into_iter().find(|(k, _)| k == "data") else {
            warn!(stream, id, "order event entry missing 'data' field, dropping");
            return;
        };

        let payload: OrderEventPayload = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(stream, id, error = %e, "malformed order event payload, dropping");
                return;
            }
        };

        let topic = stream.rsplit('.').next().unwrap_or(stream);
        let Some(kind) = classify(topic, payload.status.as_deref()) else {
            return;
        };

        // The insert is the check-and-set: it must run, and win or lose,
        // before the use-case is invoked, or two concurrent deliveries of the
        // same (order_id, kind) could both observe "not yet processed" and
        // both dispatch.
        match self
            .ctx
            .repos
            .processed_events
            .try_mark_processed(&payload.order_id, kind)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(order_id = %payload.order_id, kind, "duplicate order event, already processed");
                return;
            }
            Err(e) => {
                error!(order_id = %payload.order_id, kind, error = %e, "dedup claim failed, dropping event");
                return;
            }
        }

        let Some(items) = self.resolve_items(&payload, kind).await else {
            return;
        };

        let result = match kind {
            "reserve" => reserve::reserve_batch(&self.ctx, &payload.order_id, items).await,
            "release" => {
                let outcome =
                    release::release_batch(&self.ctx, &payload.order_id, items, "order_cancelled").await;
                if outcome.all_succeeded() {
                    Ok(())
                } else {
                    Err(ServiceError::StoreError(
                        "one or more release items failed in batch".into(),
                    ))
                }
            }
            "deduct" => deduct::deduct_batch(&self.ctx, &payload.order_id, items).await,
            _ => unreachable!("classify() only returns reserve/release/deduct"),
        };

        if let Err(e) = result {
            error!(order_id = %payload.order_id, kind, error = %e, "order event use-case failed");
        }
    }

    /// Resolves the item list for a dispatch: prefers the event's own
    /// `items` payload, and for release/deduct falls back to the reservation
    /// ledger when it's absent (§4.2, §9 "Order.cancelled without items").
    async fn resolve_items(&self, payload: &OrderEventPayload, kind: &str) -> Option<Vec<BatchItem>> {
        if let Some(items) = &payload.items {
            return Some(
                items
                    .iter()
                    .map(|i| BatchItem {
                        sku: i.sku.clone(),
                        quantity: i.quantity,
                    })
                    .collect(),
            );
        }

        if kind == "release" || kind == "deduct" {
            return match self
                .ctx
                .repos
                .reservations
                .list_open_reservations(&payload.order_id)
                .await
            {
                Ok(rows) if !rows.is_empty() => Some(
                    rows.into_iter()
                        .map(|(sku, quantity)| BatchItem { sku, quantity })
                        .collect(),
                ),
                Ok(_) => {
                    warn!(
                        order_id = %payload.order_id,
                        kind,
                        "no items payload and no open ledger reservations, dropping event"
                    );
                    None
                }
                Err(e) => {
                    error!(order_id = %payload.order_id, kind, error = %e, "reservation ledger lookup failed, dropping event");
                    None
                }
            };
        }

        warn!(order_id = %payload.order_id, kind, "order.created without items payload, dropping event");
        None
    }
}

/// Maps a topic name (+ status, for `order.updated`) to a use-case kind, or
/// `None` for the documented no-ops (§4.5 mapping table).
fn classify(topic: &str, status: Option<&str>) -> Option<&'static str> {
    match topic {
        "created" => Some("reserve"),
        "cancelled" => Some("release"),
        "delivered" => Some("deduct"),
        "shipped" | "paid" => None,
        "updated" => match status {
            Some("delivered") => Some("deduct"),
            Some("cancelled") => Some("release"),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_known_topics() {
        assert_eq!(classify("created", None), Some("reserve"));
        assert_eq!(classify("cancelled", None), Some("release"));
        assert_eq!(classify("delivered", None), Some("deduct"));
        assert_eq!(classify("shipped", None), None);
        assert_eq!(classify("paid", None), None);
    }

    #[test]
    fn classify_maps_updated_by_status() {
        assert_eq!(classify("updated", Some("delivered")), Some("deduct"));
        assert_eq!(classify("updated", Some("cancelled")), Some("release"));
        assert_eq!(classify("updated", Some("processing")), None);
        assert_eq!(classify("updated", None), None);
    }

    #[test]
    fn order_event_payload_accepts_underscore_id_alias() {
        let json = r#"{"_id":"O1","status":"created","items":[{"sku":"A","quantity":2}]}"#;
        let payload: OrderEventPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.order_id, "O1");
        assert_eq!(payload.items.unwrap()[0].sku, "A");
    }
}
