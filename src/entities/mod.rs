pub mod inventory_items;
pub mod inventory_reservation;
pub mod processed_event;
