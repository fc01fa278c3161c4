use std::sync::Arc;

use sea_orm::{ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::instrument;

use crate::entities::processed_event::{self, Entity as ProcessedEvents};
use crate::errors::{is_unique_violation, ServiceError};

/// Deduplication record keyed by `(order_id, kind)`, where `kind` is one of
/// `reserve`, `release`, `deduct`. `try_mark_processed` is the
/// checked-and-set primitive the event handler must call before running a
/// use-case; `is_processed` is a plain read for callers that only need a
/// lookup.
#[derive(Clone)]
pub struct ProcessedEventRepository {
    db: Arc<DatabaseConnection>,
}

impl ProcessedEventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn is_processed(&self, order_id: &str, kind: &str) -> Result<bool, ServiceError> {
        let existing = ProcessedEvents::find()
            .filter(processed_event::Column::OrderId.eq(order_id))
            .filter(processed_event::Column::Kind.eq(kind))
            .one(self.db.as_ref())
            .await
            .map_err(ServiceError::from)?;
        Ok(existing.is_some())
    }

    /// Atomically claims `(order_id, kind)` for processing: the insert
    /// itself is the check-and-set, guarded by the table's `(order_id, kind)`
    /// primary key. Returns `Ok(true)` when this call is the first to record
    /// the pair (the caller now owns dispatching the use-case) or `Ok(false)`
    /// when it was already recorded, by this worker or a concurrent one.
    #[instrument(skip(self))]
    pub async fn try_mark_processed(&self, order_id: &str, kind: &str) -> Result<bool, ServiceError> {
        let active = processed_event::ActiveModel {
            order_id: ActiveValue::Set(order_id.to_string()),
            kind: ActiveValue::Set(kind.to_string()),
            ..Default::default()
        };

        match ProcessedEvents::insert(active).exec(self.db.as_ref()).await {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(other) => Err(ServiceError::from(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    #[tokio::test]
    async fn first_claim_wins_second_is_duplicate() {
        let db = memory_db().await;
        let repo = ProcessedEventRepository::new(db);

        assert!(repo.try_mark_processed("O1", "reserve").await.unwrap());
        assert!(!repo.try_mark_processed("O1", "reserve").await.unwrap());
    }

    #[tokio::test]
    async fn distinct_kinds_claim_independently() {
        let db = memory_db().await;
        let repo = ProcessedEventRepository::new(db);

        assert!(repo.try_mark_processed("O1", "reserve").await.unwrap());
        assert!(repo.try_mark_processed("O1", "release").await.unwrap());
    }

    #[tokio::test]
    async fn is_processed_reflects_a_claimed_pair() {
        let db = memory_db().await;
        let repo = ProcessedEventRepository::new(db);

        assert!(!repo.is_processed("O1", "deduct").await.unwrap());
        repo.try_mark_processed("O1", "deduct").await.unwrap();
        assert!(repo.is_processed("O1", "deduct").await.unwrap());
    }
}
