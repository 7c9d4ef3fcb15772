//! Monitored regions and crossing events.
//!
//! # Invariants
//! - `RegionTransition` serializes as `enter|exit` on every wire boundary.
//! - `RegionEvent::event_id` is unique per emitted event.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Circular region as registered with the platform location service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircularRegion {
    pub identifier: String,
    pub center: Coordinate,
    pub radius_m: f64,
    pub notify_on_entry: bool,
    pub notify_on_exit: bool,
}

/// Direction of a region boundary crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionTransition {
    Enter,
    Exit,
}

impl RegionTransition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
        }
    }

    /// Parses `enter|exit` (case-insensitive) or the numeric codes `1|2`
    /// used by the JS plugin API.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "enter" | "1" => Some(Self::Enter),
            "exit" | "2" => Some(Self::Exit),
            _ => None,
        }
    }
}

/// Event raised when a monitored notification's region is crossed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionEvent {
    pub event_id: Uuid,
    pub identifier: String,
    pub transition: RegionTransition,
    /// Unix epoch milliseconds at which the crossing was handled.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    /// Stored notification payload for the crossed region.
    pub notification: Value,
}

impl RegionEvent {
    pub fn new(identifier: impl Into<String>, transition: RegionTransition, notification: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            identifier: identifier.into(),
            transition,
            timestamp_ms: now_epoch_ms(),
            notification,
        }
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
