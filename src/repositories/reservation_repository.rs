use std::sync::Arc;

use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::instrument;

use crate::entities::inventory_reservation::{self, Entity as Reservations, ReservationStatus};
use crate::errors::ServiceError;

/// Light reservation ledger resolving the design-note open question in
/// favour of option (b): a row per `(orderId, sku)` written on reserve and
/// closed on release/deduct, so a cancel/deliver event whose payload omits
/// `items` can still be serviced by reading back what is still open for that
/// order.
#[derive(Clone)]
pub struct ReservationRepository {
    db: Arc<DatabaseConnection>,
}

impl ReservationRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn record_reservation(
        &self,
        order_id: &str,
        sku: &str,
        quantity: i64,
    ) -> Result<(), ServiceError> {
        let active = inventory_reservation::ActiveModel {
            order_id: ActiveValue::Set(order_id.to_string()),
            sku: ActiveValue::Set(sku.to_string()),
            quantity: ActiveValue::Set(quantity),
            status: ActiveValue::Set(ReservationStatus::Open.as_str().to_string()),
            ..Default::default()
        };
        Reservations::insert(active)
            .exec(self.db.as_ref())
            .await
            .map_err(ServiceError::from)?;
        Ok(())
    }

    /// Open `(sku, quantity)` pairs for an order, in the order they were recorded.
    #[instrument(skip(self))]
    pub async fn list_open_reservations(
        &self,
        order_id: &str,
    ) -> Result<Vec<(String, i64)>, ServiceError> {
        let rows = Reservations::find()
            .filter(inventory_reservation::Column::OrderId.eq(order_id))
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Open.as_str()))
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::from)?;

        Ok(rows.into_iter().map(|r| (r.sku, r.quantity)).collect())
    }

    /// Marks the open ledger row for `(order_id, sku)` as Released or Deducted.
    /// A missing row is not an error: the ledger is best-effort bookkeeping,
    /// not the source of truth for the counters.
    #[instrument(skip(self))]
    pub async fn close_reservation(
        &self,
        order_id: &str,
        sku: &str,
        outcome: ReservationStatus,
    ) -> Result<(), ServiceError> {
        let existing = Reservations::find()
            .filter(inventory_reservation::Column::OrderId.eq(order_id))
            .filter(inventory_reservation::Column::Sku.eq(sku))
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Open.as_str()))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::from)?;

        let Some(row) = existing else {
            return Ok(());
        };

        let mut active: inventory_reservation::ActiveModel = row.into();
        active.status = ActiveValue::Set(outcome.as_str().to_string());
        active.update(self.db.as_ref()).await.map_err(ServiceError::from)?;
        Ok(())
    }
}
