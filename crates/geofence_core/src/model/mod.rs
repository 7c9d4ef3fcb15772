//! Geofence domain model.
//!
//! # Responsibility
//! - Define the notification record accepted from the hybrid layer.
//! - Define the region/event shapes exchanged with the location service.
//!
//! # Invariants
//! - Every notification is keyed by one stable, non-empty identifier.

pub mod notification;
pub mod region;
