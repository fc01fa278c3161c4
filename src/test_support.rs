//! In-memory SQLite helpers shared by unit tests across modules, in the
//! shape of the host repository's `tests/common::TestApp` harness.
#![cfg(test)]

use std::sync::Arc;

use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

use crate::entities::{inventory_items, inventory_reservation, processed_event};

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

pub async fn seed_item(
    db: &Arc<DatabaseConnection>,
    sku: &str,
    stock: i64,
    location: Option<&str>,
) {
    use crate::repositories::InventoryRepository;

    let repo = InventoryRepository::new(db.clone());
    repo.create(sku, stock, location.map(String::from))
        .await
        .expect("seed item");
}
