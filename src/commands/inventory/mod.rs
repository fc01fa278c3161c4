//! Use-case layer (§4.4): the Reserve, Release, and Deduct operations that sit
//! between the order-event handler / admin API and the repository layer,
//! adding per-SKU locking, event emission, and metrics on top of the
//! predicate-guarded store primitives.

pub mod catalog;
pub mod deduct;
pub mod release;
pub mod reserve;

use std::sync::Arc;

use crate::commands::RetryPolicy;
use crate::events::EventSender;
use crate::lock::LockService;
use crate::repositories::InventoryRepositories;

pub use catalog::{sync_created, sync_updated};
pub use deduct::{deduct, deduct_batch};
pub use release::{release, release_batch};
pub use reserve::{reserve, reserve_batch};

/// Dependencies shared by every inventory use-case.
#[derive(Clone)]
pub struct UseCaseContext {
    pub repos: InventoryRepositories,
    pub locks: LockService,
    pub events: Arc<EventSender>,
    pub retry: RetryPolicy,
}

impl UseCaseContext {
    pub fn new(repos: InventoryRepositories, locks: LockService, events: Arc<EventSender>) -> Self {
        Self {
            repos,
            locks,
            events,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Redis key a single SKU's lock lives under, matching `AppConfig::lock_key`'s convention.
pub fn lock_key(sku: &str) -> String {
    format!("inventory:lock:{}", sku)
}
