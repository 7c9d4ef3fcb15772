//! Geofence notification record and its typed view.
//!
//! # Responsibility
//! - Validate hybrid-layer notification JSON before it reaches storage.
//! - Derive the `CircularRegion` handed to the platform location service.
//!
//! # Invariants
//! - `identifier` is non-empty after trimming and is the only key the store
//!   relies on.
//! - `payload` is the caller's object, unchanged; unknown fields pass through.
//! - A validated notification always has a finite positive radius, an
//!   in-range center and at least one trigger flag set.

use crate::model::region::{CircularRegion, Coordinate, RegionTransition};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

const IDENTIFIER_KEYS: &[&str] = &["id", "identifier"];
const LATITUDE_KEYS: &[&str] = &["latitude", "lat"];
const LONGITUDE_KEYS: &[&str] = &["longitude", "lng", "lon"];
const RADIUS_KEY: &str = "radius";
const TRANSITION_TYPE_KEY: &str = "transitionType";
const NOTIFY_ON_ENTRY_KEY: &str = "notifyOnEntry";
const NOTIFY_ON_EXIT_KEY: &str = "notifyOnExit";

/// `transitionType` codes shared with the JS plugin API.
const TRANSITION_ENTER: i64 = 1;
const TRANSITION_EXIT: i64 = 2;
const TRANSITION_BOTH: i64 = 3;

/// Validation failures for notification payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationValidationError {
    NotAnObject,
    MissingIdentifier,
    MissingField(&'static str),
    InvalidCoordinate { latitude: f64, longitude: f64 },
    InvalidRadius(f64),
    InvalidTransitionType(String),
    InvalidFieldType { field: &'static str, expected: &'static str },
}

impl Display for NotificationValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "notification must be a JSON object"),
            Self::MissingIdentifier => write!(f, "notification `id` is missing or empty"),
            Self::MissingField(field) => write!(f, "notification field `{field}` is missing"),
            Self::InvalidCoordinate {
                latitude,
                longitude,
            } => write!(
                f,
                "coordinate ({latitude}, {longitude}) is outside the valid range"
            ),
            Self::InvalidRadius(radius) => {
                write!(f, "radius must be a positive number of metres, got {radius}")
            }
            Self::InvalidTransitionType(value) => {
                write!(f, "unsupported transition trigger: {value}")
            }
            Self::InvalidFieldType { field, expected } => {
                write!(f, "notification field `{field}` must be {expected}")
            }
        }
    }
}

impl Error for NotificationValidationError {}

/// Which crossings of a region should raise an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTriggers {
    pub on_enter: bool,
    pub on_exit: bool,
}

impl TransitionTriggers {
    pub const BOTH: Self = Self {
        on_enter: true,
        on_exit: true,
    };

    /// Returns whether `transition` is one of the requested triggers.
    pub fn matches(self, transition: RegionTransition) -> bool {
        match transition {
            RegionTransition::Enter => self.on_enter,
            RegionTransition::Exit => self.on_exit,
        }
    }
}

impl Default for TransitionTriggers {
    fn default() -> Self {
        Self::BOTH
    }
}

/// Typed view over one persisted notification payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceNotification {
    pub identifier: String,
    pub center: Coordinate,
    /// Radius in metres.
    pub radius_m: f64,
    pub triggers: TransitionTriggers,
    /// Original object, including fields this crate does not interpret.
    pub payload: Map<String, Value>,
}

impl GeofenceNotification {
    /// Parses and validates a notification payload.
    ///
    /// # Errors
    /// - `NotAnObject` for arrays, scalars and `null`.
    /// - `MissingIdentifier`/`MissingField` for absent required keys.
    /// - `InvalidCoordinate`, `InvalidRadius`, `InvalidTransitionType` for
    ///   out-of-range values.
    pub fn from_json(json: &Value) -> Result<Self, NotificationValidationError> {
        let object = json
            .as_object()
            .ok_or(NotificationValidationError::NotAnObject)?;

        let identifier = identifier_of(object)?;
        let latitude = number_field(object, LATITUDE_KEYS, "latitude")?;
        let longitude = number_field(object, LONGITUDE_KEYS, "longitude")?;
        let center = Coordinate {
            latitude,
            longitude,
        };
        if !center.is_valid() {
            return Err(NotificationValidationError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }

        let radius_m = number_field(object, &[RADIUS_KEY], RADIUS_KEY)?;
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(NotificationValidationError::InvalidRadius(radius_m));
        }

        let triggers = triggers_of(object)?;

        Ok(Self {
            identifier,
            center,
            radius_m,
            triggers,
            payload: object.clone(),
        })
    }

    /// Returns the region registered with the location service.
    pub fn region(&self) -> CircularRegion {
        CircularRegion {
            identifier: self.identifier.clone(),
            center: self.center,
            radius_m: self.radius_m,
            notify_on_entry: self.triggers.on_enter,
            notify_on_exit: self.triggers.on_exit,
        }
    }

    /// Returns the pass-through payload as a JSON value.
    pub fn to_json(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

/// Extracts the trimmed identifier of a notification payload.
///
/// Accepts `id` (JS plugin naming) and `identifier`.
pub fn notification_identifier(json: &Value) -> Option<String> {
    json.as_object()
        .and_then(|object| identifier_of(object).ok())
}

fn identifier_of(object: &Map<String, Value>) -> Result<String, NotificationValidationError> {
    IDENTIFIER_KEYS
        .iter()
        .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
        .and_then(|value| match value {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
        .filter(|identifier| !identifier.is_empty())
        .ok_or(NotificationValidationError::MissingIdentifier)
}

fn number_field(
    object: &Map<String, Value>,
    keys: &[&str],
    field: &'static str,
) -> Result<f64, NotificationValidationError> {
    let value = keys
        .iter()
        .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
        .ok_or(NotificationValidationError::MissingField(field))?;

    match value {
        Value::Number(number) => number
            .as_f64()
            .ok_or(NotificationValidationError::InvalidFieldType {
                field,
                expected: "a number",
            }),
        // The JS layer sometimes forwards form input as strings.
        Value::String(text) => {
            text.trim()
                .parse::<f64>()
                .map_err(|_| NotificationValidationError::InvalidFieldType {
                    field,
                    expected: "a number",
                })
        }
        _ => Err(NotificationValidationError::InvalidFieldType {
            field,
            expected: "a number",
        }),
    }
}

fn triggers_of(object: &Map<String, Value>) -> Result<TransitionTriggers, NotificationValidationError> {
    if let Some(raw) = object.get(TRANSITION_TYPE_KEY).filter(|value| !value.is_null()) {
        let triggers = match raw.as_i64() {
            Some(TRANSITION_ENTER) => TransitionTriggers {
                on_enter: true,
                on_exit: false,
            },
            Some(TRANSITION_EXIT) => TransitionTriggers {
                on_enter: false,
                on_exit: true,
            },
            Some(TRANSITION_BOTH) => TransitionTriggers::BOTH,
            _ => {
                return Err(NotificationValidationError::InvalidTransitionType(
                    raw.to_string(),
                ))
            }
        };
        return Ok(triggers);
    }

    let on_enter = bool_field(object, NOTIFY_ON_ENTRY_KEY)?;
    let on_exit = bool_field(object, NOTIFY_ON_EXIT_KEY)?;
    let triggers = match (on_enter, on_exit) {
        (None, None) => TransitionTriggers::BOTH,
        (enter, exit) => TransitionTriggers {
            on_enter: enter.unwrap_or(false),
            on_exit: exit.unwrap_or(false),
        },
    };
    if !triggers.on_enter && !triggers.on_exit {
        return Err(NotificationValidationError::InvalidTransitionType(
            "neither notifyOnEntry nor notifyOnExit is set".to_string(),
        ));
    }
    Ok(triggers)
}

fn bool_field(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<bool>, NotificationValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(flag)) => Ok(Some(*flag)),
        Some(_) => Err(NotificationValidationError::InvalidFieldType {
            field,
            expected: "a boolean",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{notification_identifier, GeofenceNotification, NotificationValidationError};
    use crate::model::region::RegionTransition;
    use serde_json::json;

    #[test]
    fn short_coordinate_keys_are_accepted() {
        let parsed =
            GeofenceNotification::from_json(&json!({"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100}))
                .expect("valid payload");
        assert_eq!(parsed.identifier, "geo1");
        assert_eq!(parsed.center.latitude, 1.0);
        assert_eq!(parsed.center.longitude, 2.0);
        assert_eq!(parsed.radius_m, 100.0);
        assert!(parsed.triggers.on_enter && parsed.triggers.on_exit);
    }

    #[test]
    fn transition_type_code_selects_triggers() {
        let parsed = GeofenceNotification::from_json(&json!({
            "id": "exit-only",
            "latitude": 50.0,
            "longitude": 8.0,
            "radius": 250,
            "transitionType": 2
        }))
        .expect("valid payload");
        assert!(!parsed.triggers.matches(RegionTransition::Enter));
        assert!(parsed.triggers.matches(RegionTransition::Exit));
    }

    #[test]
    fn rejects_unknown_transition_code() {
        let err = GeofenceNotification::from_json(&json!({
            "id": "bad", "lat": 0, "lng": 0, "radius": 10, "transitionType": 7
        }))
        .unwrap_err();
        assert!(matches!(err, NotificationValidationError::InvalidTransitionType(_)));
    }

    #[test]
    fn rejects_zero_radius_and_out_of_range_latitude() {
        let zero = GeofenceNotification::from_json(&json!({"id": "a", "lat": 0, "lng": 0, "radius": 0}))
            .unwrap_err();
        assert_eq!(zero, NotificationValidationError::InvalidRadius(0.0));

        let lat = GeofenceNotification::from_json(&json!({"id": "a", "lat": 91, "lng": 0, "radius": 5}))
            .unwrap_err();
        assert!(matches!(lat, NotificationValidationError::InvalidCoordinate { .. }));
    }

    #[test]
    fn identifier_is_trimmed_and_numeric_ids_are_stringified() {
        assert_eq!(
            notification_identifier(&json!({"id": "  home "})).as_deref(),
            Some("home")
        );
        assert_eq!(notification_identifier(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(notification_identifier(&json!({"id": "   "})), None);
        assert_eq!(notification_identifier(&json!(["id"])), None);
    }

    #[test]
    fn null_id_falls_back_to_identifier_key() {
        assert_eq!(
            notification_identifier(&json!({"id": null, "identifier": "work"})).as_deref(),
            Some("work")
        );
        let parsed = GeofenceNotification::from_json(
            &json!({"id": null, "identifier": "work", "lat": 1.0, "lng": 2.0, "radius": 50}),
        )
        .expect("identifier key is used");
        assert_eq!(parsed.identifier, "work");
    }
}
