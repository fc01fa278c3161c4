use std::sync::Arc;

use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Statement,
};
use tracing::instrument;

use crate::entities::inventory_items::{self, Entity as InventoryItems};
use crate::errors::{is_unique_violation, ServiceError};

/// Optional filter for `list`. `sku` and `location` are matched exactly.
#[derive(Debug, Clone, Default)]
pub struct InventoryFilter {
    pub sku: Option<String>,
    pub location: Option<String>,
}

/// Fields accepted by the non-atomic `updateFields` administrative patch.
#[derive(Debug, Clone, Default)]
pub struct InventoryFieldUpdate {
    pub stock: Option<i64>,
    pub location: Option<String>,
}

/// Thin façade over the inventory store. Owns every mutation to
/// `inventory_items`; every conditional update below is a single
/// predicate-guarded `UPDATE ... WHERE` executed without an intervening
/// writer on the same row, per §4.1. A zero-row update is ambiguous between
/// "row missing" and "predicate failed", so callers classify it with a
/// follow-up `find_by_sku` read rather than trusting the absence of a result.
#[derive(Clone)]
pub struct InventoryRepository {
    db: Arc<DatabaseConnection>,
}

impl InventoryRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn find_by_sku(&self, sku: &str) -> Result<Option<inventory_items::Model>, ServiceError> {
        InventoryItems::find()
            .filter(inventory_items::Column::Sku.eq(sku))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::from)
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: InventoryFilter,
    ) -> Result<Vec<inventory_items::Model>, ServiceError> {
        let mut query = InventoryItems::find();
        if let Some(sku) = filter.sku {
            query = query.filter(inventory_items::Column::Sku.eq(sku));
        }
        if let Some(location) = filter.location {
            query = query.filter(inventory_items::Column::Location.eq(location));
        }
        query.all(self.db.as_ref()).await.map_err(ServiceError::from)
    }

    #[instrument(skip(self))]
    pub async fn create(
        &self,
        sku: &str,
        initial_stock: i64,
        location: Option<String>,
    ) -> Result<inventory_items::Model, ServiceError> {
        if self.find_by_sku(sku).await?.is_some() {
            return Err(ServiceError::DuplicateSku(sku.to_string()));
        }

        let active = inventory_items::ActiveModel {
            sku: ActiveValue::Set(sku.to_string()),
            stock: ActiveValue::Set(initial_stock),
            reserved: ActiveValue::Set(0),
            sold: ActiveValue::Set(0),
            location: ActiveValue::Set(location),
            ..Default::default()
        };

        active.insert(self.db.as_ref()).await.map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::DuplicateSku(sku.to_string())
            } else {
                ServiceError::from(e)
            }
        })
    }

    /// Predicate: row exists AND (stock - reserved) >= q. Mutation: reserved += q.
    #[instrument(skip(self))]
    pub async fn reserve(&self, sku: &str, q: i64) -> Result<inventory_items::Model, ServiceError> {
        if q <= 0 {
            return Err(ServiceError::ValidationError("quantity must be > 0".into()));
        }

        let stmt = Query::update()
            .table(inventory_items::Entity)
            .value(
                inventory_items::Column::Reserved,
                Expr::col(inventory_items::Column::Reserved).add(q),
            )
            .value(inventory_items::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .and_where(inventory_items::Column::Sku.eq(sku))
            .and_where(
                Expr::col(inventory_items::Column::Stock)
                    .sub(Expr::col(inventory_items::Column::Reserved))
                    .gte(q),
            )
            .to_owned();

        let updated = self.exec_conditional_update(stmt).await?;
        if updated {
            return self.require_by_sku(sku).await;
        }

        match self.find_by_sku(sku).await? {
            None => Err(ServiceError::NotFound(sku.to_string())),
            Some(row) => Err(ServiceError::InsufficientStock(
                sku.to_string(),
                q,
                row.available(),
            )),
        }
    }

    /// Predicate: row exists AND reserved >= q. Mutation: reserved -= q.
    #[instrument(skip(self))]
    pub async fn release(&self, sku: &str, q: i64) -> Result<inventory_items::Model, ServiceError> {
        if q <= 0 {
            return Err(ServiceError::ValidationError("quantity must be > 0".into()));
        }

        let stmt = Query::update()
            .table(inventory_items::Entity)
            .value(
                inventory_items::Column::Reserved,
                Expr::col(inventory_items::Column::Reserved).sub(q),
            )
            .value(inventory_items::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .and_where(inventory_items::Column::Sku.eq(sku))
            .and_where(Expr::col(inventory_items::Column::Reserved).gte(q))
            .to_owned();

        let updated = self.exec_conditional_update(stmt).await?;
        if updated {
            return self.require_by_sku(sku).await;
        }

        match self.find_by_sku(sku).await? {
            None => Err(ServiceError::NotFound(sku.to_string())),
            Some(row) => Err(ServiceError::InsufficientReserved(
                sku.to_string(),
                q,
                row.reserved,
            )),
        }
    }

    /// Predicate: row exists AND stock >= q AND reserved >= q.
    /// Mutation: stock -= q; reserved -= q; sold += q.
    #[instrument(skip(self))]
    pub async fn deduct(&self, sku: &str, q: i64) -> Result<inventory_items::Model, ServiceError> {
        if q <= 0 {
            return Err(ServiceError::ValidationError("quantity must be > 0".into()));
        }

        let stmt = Query::update()
            .table(inventory_items::Entity)
            .value(
                inventory_items::Column::Stock,
                Expr::col(inventory_items::Column::Stock).sub(q),
            )
            .value(
                inventory_items::Column::Reserved,
                Expr::col(inventory_items::Column::Reserved).sub(q),
            )
            .value(
                inventory_items::Column::Sold,
                Expr::col(inventory_items::Column::Sold).add(q),
            )
            .value(inventory_items::Column::UpdatedAt, Expr::value(chrono::Utc::now()))
            .and_where(inventory_items::Column::Sku.eq(sku))
            .and_where(Expr::col(inventory_items::Column::Stock).gte(q))
            .and_where(Expr::col(inventory_items::Column::Reserved).gte(q))
            .to_owned();

        let updated = self.exec_conditional_update(stmt).await?;
        if updated {
            return self.require_by_sku(sku).await;
        }

        match self.find_by_sku(sku).await? {
            None => Err(ServiceError::NotFound(sku.to_string())),
            Some(row) if row.stock < q => Err(ServiceError::InsufficientStock(
                sku.to_string(),
                q,
                row.stock,
            )),
            Some(row) => Err(ServiceError::InsufficientReserved(
                sku.to_string(),
                q,
                row.reserved,
            )),
        }
    }

    /// Non-atomic administrative patch for inventory-catalog synchronization.
    /// Must not be used from the reserve/release/deduct paths. Rejects a
    /// `stock` change that would drive `stock < reserved`, resolving the
    /// design-note open question.
    #[instrument(skip(self))]
    pub async fn update_fields(
        &self,
        sku: &str,
        update: InventoryFieldUpdate,
    ) -> Result<inventory_items::Model, ServiceError> {
        let current = self
            .find_by_sku(sku)
            .await?
            .ok_or_else(|| ServiceError::NotFound(sku.to_string()))?;

        if let Some(new_stock) = update.stock {
            if new_stock < current.reserved {
                return Err(ServiceError::ValidationError(format!(
                    "updateFields on '{sku}' would set stock {new_stock} below reserved {}",
                    current.reserved
                )));
            }
        }

        let mut active: inventory_items::ActiveModel = current.into();
        if let Some(new_stock) = update.stock {
            active.stock = ActiveValue::Set(new_stock);
        }
        if let Some(location) = update.location {
            active.location = ActiveValue::Set(Some(location));
        }
        active.updated_at = ActiveValue::Set(chrono::Utc::now());

        active.update(self.db.as_ref()).await.map_err(ServiceError::from)
    }

    async fn require_by_sku(&self, sku: &str) -> Result<inventory_items::Model, ServiceError> {
        self.find_by_sku(sku)
            .await?
            .ok_or_else(|| ServiceError::NotFound(sku.to_string()))
    }

    /// Executes a predicate-guarded `UPDATE` and reports whether any row matched.
    async fn exec_conditional_update(
        &self,
        stmt: sea_orm::sea_query::UpdateStatement,
    ) -> Result<bool, ServiceError> {
        let builder = self.db.get_database_backend();
        let raw: Statement = builder.build(&stmt);
        let result = self.db.execute(raw).await.map_err(ServiceError::from)?;
        Ok(result.rows_affected() > 0)
    }
}
