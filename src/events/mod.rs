//! Inventory-domain events and the Redis Streams bus that carries them (§4.6).
//!
//! Outbound events are appended to the `inventory.events` stream; the order
//! lifecycle topics consumed by [`consumer`] are a separate set of streams
//! produced by the external order service.

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::ServiceError;

pub mod catalog_consumer;
pub mod consumer;
pub mod redis_stream;

/// One item's outcome inside a best-effort batch deduct, for `inventory.partial_deduction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductedItem {
    pub sku: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedItem {
    pub sku: String,
    pub quantity: i64,
    pub reason: String,
}

/// Inventory-domain events published to the bus (§4.6). The `event` field name
/// matches the outbound topic naming in §4.5/§4.6 exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Reserved {
        order_id: String,
        sku: String,
        quantity: i64,
        reserved_stock: i64,
        available_stock: i64,
        timestamp: DateTime<Utc>,
    },
    Released {
        order_id: String,
        sku: String,
        quantity: i64,
        reserved_stock: i64,
        available_stock: i64,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    Deducted {
        order_id: String,
        sku: String,
        quantity: i64,
        remaining_stock: i64,
        reserved_stock: i64,
        total_sold: i64,
        available_stock: i64,
        timestamp: DateTime<Utc>,
    },
    LowStock {
        sku: String,
        available_stock: i64,
        reserved_stock: i64,
        threshold: i64,
        timestamp: DateTime<Utc>,
    },
    OutOfStock {
        sku: String,
        reserved_stock: i64,
        total_sold: i64,
        timestamp: DateTime<Utc>,
    },
    ReservationRolledBack {
        order_id: String,
        sku: String,
        quantity: i64,
        timestamp: DateTime<Utc>,
    },
    PartialDeduction {
        order_id: String,
        deducted_items: Vec<DeductedItem>,
        failed_items: Vec<FailedItem>,
        timestamp: DateTime<Utc>,
    },
    Updated {
        sku: String,
        stock: i64,
        reserved: i64,
        sold: i64,
        timestamp: DateTime<Utc>,
    },
}

/// Publishes [`Event`]s to the `inventory.events` Redis stream via `XADD`,
/// enforcing the 256 KiB serialised-payload cap at the call site (§4.6).
#[derive(Clone)]
pub struct EventSender {
    conn: ConnectionManager,
    stream_key: String,
    max_payload_bytes: usize,
}

impl EventSender {
    pub fn new(conn: ConnectionManager, stream_key: String, max_payload_bytes: usize) -> Self {
        Self {
            conn,
            stream_key,
            max_payload_bytes,
        }
    }

    #[instrument(skip(self, event))]
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        let payload = serde_json::to_vec(&event)
            .map_err(|e| ServiceError::EventError(format!("failed to serialise event: {e}")))?;

        if payload.len() > self.max_payload_bytes {
            return Err(ServiceError::ValidationError(format!(
                "event payload of {} bytes exceeds the {} byte cap",
                payload.len(),
                self.max_payload_bytes
            )));
        }

        let mut conn = self.conn.clone();
        redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("data")
            .arg(payload)
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| ServiceError::EventError(format!("XADD failed: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialises_with_discriminator_field() {
        let event = Event::Reserved {
            order_id: "O1".into(),
            sku: "A".into(),
            quantity: 3,
            reserved_stock: 3,
            available_stock: 97,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "reserved");
        assert_eq!(json["sku"], "A");
    }
}
