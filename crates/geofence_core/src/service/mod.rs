//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store and platform calls into plugin-level operations.
//! - Keep bridge/FFI layers decoupled from storage and OS details.

pub mod geofence_manager;
