use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single SKU row: on-hand `stock`, units claimed by open orders in
/// `reserved`, and cumulative delivered units in `sold`.
///
/// Invariants are enforced by the repository (`repositories::inventory_repository`),
/// never by this model alone: stock >= 0, reserved >= 0, reserved <= stock, sold >= 0.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    #[sea_orm(unique)]
    pub sku: String,

    pub stock: i64,
    pub reserved: i64,
    pub sold: i64,

    pub location: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn available(&self) -> i64 {
        self.stock - self.reserved
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            stock: sea_orm::ActiveValue::Set(0),
            reserved: sea_orm::ActiveValue::Set(0),
            sold: sea_orm::ActiveValue::Set(0),
            created_at: sea_orm::ActiveValue::Set(now),
            updated_at: sea_orm::ActiveValue::Set(now),
            ..ActiveModelTrait::default()
        }
    }
}
