//! Contract with the platform region-monitoring service.
//!
//! # Responsibility
//! - Describe what the manager needs from the OS location service.
//! - Keep OS delegate plumbing outside the core crate.
//!
//! # Invariants
//! - Implementations never block: registration outcome beyond immediate
//!   rejection arrives through the manager's `handle_*` callbacks.

use crate::model::region::CircularRegion;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod queued;

pub use queued::{PlatformRequest, QueuedLocationService};

/// Location authorization as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedWhenInUse,
    AuthorizedAlways,
}

impl AuthorizationStatus {
    /// Returns whether region monitoring is refused outright.
    ///
    /// `NotDetermined` is not refused: the OS accepts registrations while
    /// the permission prompt is pending.
    pub fn is_refused(self) -> bool {
        matches!(self, Self::Denied | Self::Restricted)
    }

    pub fn is_authorized(self) -> bool {
        matches!(self, Self::AuthorizedWhenInUse | Self::AuthorizedAlways)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDetermined => "not_determined",
            Self::Restricted => "restricted",
            Self::Denied => "denied",
            Self::AuthorizedWhenInUse => "authorized_when_in_use",
            Self::AuthorizedAlways => "authorized_always",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_determined" | "notdetermined" => Some(Self::NotDetermined),
            "restricted" => Some(Self::Restricted),
            "denied" => Some(Self::Denied),
            "authorized_when_in_use" | "authorizedwheninuse" | "when_in_use" => {
                Some(Self::AuthorizedWhenInUse)
            }
            "authorized_always" | "authorizedalways" | "always" => Some(Self::AuthorizedAlways),
            _ => None,
        }
    }
}

/// Immediate rejection of a monitoring request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    /// Platform cap on simultaneously monitored regions was hit.
    LimitReached { limit: usize },
    PermissionDenied,
    Unavailable(String),
}

impl Display for LocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LimitReached { limit } => {
                write!(f, "platform region monitoring limit reached ({limit})")
            }
            Self::PermissionDenied => write!(f, "location permission not granted"),
            Self::Unavailable(reason) => write!(f, "region monitoring unavailable: {reason}"),
        }
    }
}

impl Error for LocationError {}

/// Platform location service consumed by `GeofenceManager`.
pub trait LocationService: Send + Sync {
    fn authorization_status(&self) -> AuthorizationStatus;

    /// Asks the platform for the permission required by region monitoring.
    /// The outcome is delivered later via `handle_authorization_changed`.
    fn request_authorization(&self);

    /// Starts (or restarts) monitoring `region`, replacing any registration
    /// with the same identifier.
    fn start_monitoring(&self, region: &CircularRegion) -> Result<(), LocationError>;

    /// Stops monitoring; a no-op for unknown identifiers.
    fn stop_monitoring(&self, identifier: &str);
}
