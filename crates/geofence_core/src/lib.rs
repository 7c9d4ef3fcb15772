//! Core of the geofence notification plugin.
//!
//! Owns notification persistence, the platform region-monitoring contract
//! and the manager that keeps both in sync. Bridge crates depend on this
//! crate and never talk to SQLite or the OS service directly.

pub mod db;
pub mod logging;
pub mod model;
pub mod platform;
pub mod repo;
pub mod service;

pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::notification::{
    notification_identifier, GeofenceNotification, NotificationValidationError,
    TransitionTriggers,
};
pub use model::region::{CircularRegion, Coordinate, RegionEvent, RegionTransition};
pub use platform::{
    AuthorizationStatus, LocationError, LocationService, PlatformRequest, QueuedLocationService,
};
pub use repo::notification_store::{
    NotificationStore, SqliteNotificationStore, StoreError, StoreResult, UpsertOutcome,
};
pub use service::geofence_manager::{
    GeofenceManager, ManagerConfig, ManagerError, ManagerResult, RegionEventListener,
    SubscriptionId, DEFAULT_MAX_MONITORED_REGIONS,
};

/// Minimal health-check API for bridge smoke tests.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
