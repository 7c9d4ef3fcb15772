//! Persistence layer for geofence notifications.
//!
//! # Responsibility
//! - Define the store contract used by the geofence manager.
//! - Isolate SQLite query details from orchestration code.

pub mod notification_store;
