//! FFI bridge for the geofence notification plugin.
//!
//! `api` is the surface scanned by `flutter_rust_bridge_codegen`; everything
//! else stays crate-private.

pub mod api;
mod events;
