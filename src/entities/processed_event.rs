use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Deduplication record keyed by `(order_id, kind)`, checked-and-set atomically
/// before a use-case runs. Backs the idempotence requirement for an
/// at-least-once order-event transport: a duplicate (order_id, kind) delivery
/// is acknowledged and discarded without re-invoking reserve/release/deduct.
///
/// `(order_id, kind)` is the composite primary key, not a secondary unique
/// index: the insert that records a delivery as processed is the same insert
/// that enforces uniqueness, so two concurrent deliveries of the same pair
/// can never both win.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "processed_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub order_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub kind: String,

    pub processed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            active_model.processed_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
