use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::errors::ServiceError;

pub mod inventory_repository;
pub mod processed_event_repository;
pub mod reservation_repository;

pub use inventory_repository::{InventoryFieldUpdate, InventoryFilter, InventoryRepository};
pub use processed_event_repository::ProcessedEventRepository;
pub use reservation_repository::ReservationRepository;

/// Repository trait for common database operations.
pub trait Repository {
    fn get_db(&self) -> &DatabaseConnection;
}

/// One line item of a batch reserve/release/deduct call.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub sku: String,
    pub quantity: i64,
}

/// Outcome of a best-effort batch (release/deduct): processing continues
/// past individual failures.
#[derive(Debug, Default)]
pub struct BestEffortOutcome {
    pub succeeded: Vec<BatchItem>,
    pub failed: Vec<(BatchItem, ServiceError)>,
}

impl BestEffortOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Repository-level façade combining the inventory store, the reservation
/// ledger, and the processed-event dedup ledger. The batch reserve/release/
/// deduct sagas of §4.2 live in `commands::inventory`, which adds locking and
/// event emission on top of these primitives.
#[derive(Clone)]
pub struct InventoryRepositories {
    pub inventory: InventoryRepository,
    pub reservations: ReservationRepository,
    pub processed_events: ProcessedEventRepository,
}

impl InventoryRepositories {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            inventory: InventoryRepository::new(db.clone()),
            reservations: ReservationRepository::new(db.clone()),
            processed_events: ProcessedEventRepository::new(db),
        }
    }
}
