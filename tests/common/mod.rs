//! Shared harness for the integration tests in this directory: an in-memory
//! SQLite database seeded with the crate's own schema, mirroring the shape of
//! `inventory_core::test_support` but reachable from outside the crate.

use std::sync::Arc;

use inventory_core::entities::{inventory_items, inventory_reservation, processed_event};
use inventory_core::repositories::{InventoryRepositories, InventoryRepository};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

pub async fn memory_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");

    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    for stmt in [
        builder.build(&schema.create_table_from_entity(inventory_items::Entity)),
        builder.build(&schema.create_table_from_entity(inventory_reservation::Entity)),
        builder.build(&schema.create_table_from_entity(processed_event::Entity)),
    ] {
        db.execute(stmt).await.expect("create table");
    }

    Arc::new(db)
}

pub async fn seed_item(db: &Arc<DatabaseConnection>, sku: &str, stock: i64, location: Option<&str>) {
    let repo = InventoryRepository::new(db.clone());
    repo.create(sku, stock, location.map(String::from))
        .await
        .expect("seed item");
}

pub async fn repos(db: &Arc<DatabaseConnection>) -> InventoryRepositories {
    InventoryRepositories::new(db.clone())
}
