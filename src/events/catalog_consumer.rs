//! Product-catalog event handler (§6): consumes `product.created` and
//! `product.updated` over Redis Streams and syncs the inventory store.
//! No processed-event ledger here — the dedup table of §4.5 is scoped to the
//! order topic only, and both catalog use-cases are naturally idempotent.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::{RedisResult, Value as RedisValue};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{error, instrument, warn};

use crate::commands::inventory::{sync_created, sync_updated, UseCaseContext};
use crate::errors::ServiceError;
use crate::events::redis_stream::{parse_autoclaim_reply, parse_streams_reply};

const CATALOG_TOPICS: &[&str] = &["created", "updated"];
const STALE_CLAIM_IDLE_MS: usize = 30_000;

#[derive(Debug, Deserialize)]
struct ProductEventPayload {
    sku: String,
    #[serde(default)]
    initial_stock: Option<i64>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    stock: Option<i64>,
}

/// Subscribes to `{prefix}.created`/`{prefix}.updated` and dispatches to the
/// catalog-sync use-cases.
pub struct ProductEventConsumer {
    conn: ConnectionManager,
    ctx: UseCaseContext,
    consumer_group: String,
    consumer_name: String,
    streams: Vec<String>,
}

impl ProductEventConsumer {
    pub fn new(
        conn: ConnectionManager,
        ctx: UseCaseContext,
        stream_prefix: &str,
        consumer_group: String,
        consumer_name: String,
    ) -> Self {
        let streams = CATALOG_TOPICS
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

    pub async fn run(mut self) {
        loop {
            if let Err(e) = self.claim_stale_entries().await {
                error!(error = %e, "catalog stale PEL reclaim failed, continuing");
            }

            if let Err(e) = self.poll_once().await {
                error!(error = %e, "product event poll failed, backing off");
                sleep(Duration::from_millis(500)).await;
            }
        }
    }

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
            warn!(stream, id, "product event entry missing 'data' field, dropping");
            return;
        };

        let payload: ProductEventPayload = match serde_json::from_str(&raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(stream, id, error = %e, "malformed product event payload, dropping");
                return;
            }
        };

        let topic = stream.rsplit('.').next().unwrap_or(stream);
        let result = match topic {
            "created" => {
                sync_created(
                    &self.ctx,
                    &payload.sku,
                    payload.initial_stock.unwrap_or(0),
                    payload.location,
                )
                .await
            }
            "updated" => match payload.stock {
                Some(stock) => sync_updated(&self.ctx, &payload.sku, stock).await,
                None => {
                    warn!(sku = %payload.sku, "product.updated without a numeric stock field, dropping");
                    return;
                }
            },
            _ => return,
        };

        if let Err(e) = result {
            error!(sku = %payload.sku, topic, error = %e, "product event use-case failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_event_payload_parses_created_shape() {
        let json = r#"{"sku":"A","initial_stock":10,"location":"DC1"}"#;
        let payload: ProductEventPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.sku, "A");
        assert_eq!(payload.initial_stock, Some(10));
    }

    #[test]
    fn product_event_payload_parses_updated_shape() {
        let json = r#"{"sku":"A","stock":42}"#;
        let payload: ProductEventPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.stock, Some(42));
    }
}
