//! Plugin bridge exposed to the hybrid-app layer via FRB.
//!
//! # Responsibility
//! - Translate plugin commands (`initialize`, `deviceReady`, `ping`,
//!   `addOrUpdate`, `getWatched`, `remove`, `removeAll`) into manager calls.
//! - Relay native host callbacks (crossings, failures, authorization) back
//!   into the manager, and crossing events out to the hybrid layer.
//!
//! # Invariants
//! - Exported functions never panic across the FFI boundary; every failure
//!   becomes a `PluginResponse` with a stable `error_code`.
//! - Each `GeofencePlugin` owns its own store, manager and event channel; no
//!   process-wide mutable state besides the logger.

use crate::events::EventChannel;
use geofence_core::db::{open_db, open_db_in_memory};
use geofence_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AuthorizationStatus, GeofenceManager, LocationError, ManagerConfig, ManagerError,
    QueuedLocationService, RegionEvent, RegionTransition, SqliteNotificationStore,
    SubscriptionId, UpsertOutcome,
};
use log::{error, info, warn};
use serde_json::{json, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const DB_FILE_NAME: &str = "geofence_notifications.sqlite3";
const DB_PATH_ENV: &str = "GEOFENCE_DB_PATH";
const NEXT_EVENT_TIMEOUT_MAX_MS: u32 = 60_000;

const CODE_INVALID_ACTION: &str = "invalid_action";
const CODE_INVALID_ARGUMENTS: &str = "invalid_arguments";
const CODE_INTERNAL: &str = "internal_error";

type Manager = GeofenceManager<SqliteNotificationStore, QueuedLocationService>;

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking; never throws.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - `level`: `trace|debug|info|warn|error`; `log_dir`: absolute directory.
/// - Idempotent for the same arguments; reconfiguration returns an error.
/// - Returns empty string on success and the error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Result envelope returned by every plugin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// JSON result payload on success, if the command produces one.
    pub data_json: Option<String>,
    /// Stable error classification on failure (`validation_error`, ...).
    pub error_code: Option<String>,
    /// Human-readable message for diagnostics/UI.
    pub message: String,
}

impl PluginResponse {
    fn success(message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            ok: true,
            data_json: data.map(|value| value.to_string()),
            error_code: None,
            message: message.into(),
        }
    }

    fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data_json: None,
            error_code: Some(code.to_string()),
            message: message.into(),
        }
    }

    fn from_manager_error(command: &str, err: &ManagerError) -> Self {
        warn!(
            "event=plugin_command module=ffi status=error command={command} error_code={}",
            err.code()
        );
        Self::failure(err.code(), format!("{command} failed: {err}"))
    }

    /// Error payload `{code, message}` for the scripting layer.
    ///
    /// Returns `None` for successful responses.
    #[flutter_rust_bridge::frb(sync)]
    pub fn error_json(&self) -> Option<String> {
        self.error_code.as_ref().map(|code| {
            json!({
                "code": code,
                "message": self.message,
            })
            .to_string()
        })
    }
}

/// One plugin instance: store, manager, host location adapter and event
/// channel, created by the host at plugin load and dropped at unload.
pub struct GeofencePlugin {
    manager: Arc<Manager>,
    location: Arc<QueuedLocationService>,
    events: Arc<EventChannel>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl GeofencePlugin {
    /// Opens the plugin over a database file.
    ///
    /// Path resolution: `db_path`, then `GEOFENCE_DB_PATH`, then the temp dir.
    /// `max_regions` overrides the default region cap.
    #[flutter_rust_bridge::frb(sync)]
    pub fn open(db_path: Option<String>, max_regions: Option<u32>) -> Result<Self, String> {
        let path = resolve_db_path(db_path);
        let conn = open_db(&path).map_err(|err| format!("geofence DB open failed: {err}"))?;
        Ok(Self::with_store(SqliteNotificationStore::new(conn), max_regions))
    }

    /// Opens the plugin over an in-memory database (nothing survives unload).
    #[flutter_rust_bridge::frb(sync)]
    pub fn open_in_memory(max_regions: Option<u32>) -> Result<Self, String> {
        let conn =
            open_db_in_memory().map_err(|err| format!("geofence DB open failed: {err}"))?;
        Ok(Self::with_store(SqliteNotificationStore::new(conn), max_regions))
    }

    fn with_store(store: SqliteNotificationStore, max_regions: Option<u32>) -> Self {
        let mut config = ManagerConfig::default();
        if let Some(limit) = max_regions.filter(|limit| *limit > 0) {
            config.max_monitored_regions = limit as usize;
        }
        let location = Arc::new(QueuedLocationService::new());
        let manager = Arc::new(GeofenceManager::new(store, Arc::clone(&location), config));
        Self {
            manager,
            location,
            events: Arc::new(EventChannel::new()),
            subscription: Mutex::new(None),
        }
    }

    /// Dispatches a command by its JS plugin action name.
    ///
    /// # FFI contract
    /// - `args_json` is the JSON argument array of the JS call (may be empty).
    /// - Unknown actions return `invalid_action`; never panics.
    #[flutter_rust_bridge::frb(sync)]
    pub fn execute(&self, action: String, args_json: String) -> PluginResponse {
        let outcome = catch_unwind(AssertUnwindSafe(|| match action.as_str() {
            "initialize" => self.initialize(args_json.clone()),
            "deviceReady" => self.device_ready(),
            "ping" => self.ping(),
            "addOrUpdate" => self.add_or_update(args_json.clone()),
            "getWatched" => self.get_watched(args_json.clone()),
            "remove" => self.remove(args_json.clone()),
            "removeAll" => self.remove_all(),
            other => PluginResponse::failure(
                CODE_INVALID_ACTION,
                format!("unknown plugin action `{other}`"),
            ),
        }));

        outcome.unwrap_or_else(|_| {
            error!("event=plugin_command module=ffi status=panic command={action}");
            PluginResponse::failure(CODE_INTERNAL, format!("{action} failed unexpectedly"))
        })
    }

    /// `initialize`: subscribes the event relay, requests location permission
    /// and re-registers stored geofences.
    ///
    /// Optional argument `{ "logLevel": "...", "logDir": "/abs/path" }`
    /// starts core logging first.
    #[flutter_rust_bridge::frb(sync)]
    pub fn initialize(&self, args_json: String) -> PluginResponse {
        let args = match parse_args(&args_json) {
            Ok(args) => args,
            Err(response) => return response,
        };
        if let Some(options) = args.first().and_then(Value::as_object) {
            if let Some(log_dir) = options.get("logDir").and_then(Value::as_str) {
                let level = options
                    .get("logLevel")
                    .and_then(Value::as_str)
                    .unwrap_or(geofence_core::default_log_level());
                if let Err(err) = init_logging_inner(level, log_dir) {
                    return PluginResponse::failure(
                        CODE_INVALID_ARGUMENTS,
                        format!("initialize failed: {err}"),
                    );
                }
            }
        }

        self.subscribe_events();
        self.manager.register_permissions();
        let max_regions = self.manager.config().max_monitored_regions;
        match self.manager.restore_monitoring() {
            Ok(restored) => {
                info!(
                    "event=plugin_initialize module=ffi status=ok restored={restored} max_regions={max_regions}"
                );
                PluginResponse::success(
                    "Plugin initialized.",
                    Some(json!({ "restored": restored, "maxRegions": max_regions })),
                )
            }
            Err(err) => PluginResponse::from_manager_error("initialize", &err),
        }
    }

    /// `deviceReady`: starts delivering region events to the hybrid layer.
    #[flutter_rust_bridge::frb(sync)]
    pub fn device_ready(&self) -> PluginResponse {
        let pending = self.events.open_gate();
        info!("event=plugin_device_ready module=ffi status=ok pending_events={pending}");
        PluginResponse::success("Device ready.", Some(json!({ "pendingEvents": pending })))
    }

    /// `ping`: liveness check.
    #[flutter_rust_bridge::frb(sync)]
    pub fn ping(&self) -> PluginResponse {
        PluginResponse::success("pong", Some(json!(ping_inner())))
    }

    /// `addOrUpdate`: args `[geofence, ...]` or `[[geofence, ...]]`.
    #[flutter_rust_bridge::frb(sync)]
    pub fn add_or_update(&self, args_json: String) -> PluginResponse {
        let args = match parse_args(&args_json) {
            Ok(args) => args,
            Err(response) => return response,
        };
        let payloads = list_args(args);
        if payloads.is_empty() || !payloads.iter().all(Value::is_object) {
            return PluginResponse::failure(
                CODE_INVALID_ARGUMENTS,
                "addOrUpdate expects geofence objects or one non-empty array of them",
            );
        }

        match self.manager.add_or_update_notifications(&payloads) {
            Ok(outcomes) => {
                let inserted = outcomes
                    .iter()
                    .filter(|outcome| **outcome == UpsertOutcome::Inserted)
                    .count();
                let updated = outcomes.len() - inserted;
                PluginResponse::success(
                    format!("{} geofence(s) saved.", outcomes.len()),
                    Some(json!({ "inserted": inserted, "updated": updated })),
                )
            }
            Err(err) => PluginResponse::from_manager_error("addOrUpdate", &err),
        }
    }

    /// `getWatched`: all geofences as a JSON array, or one geofence when the
    /// first argument is an identifier.
    #[flutter_rust_bridge::frb(sync)]
    pub fn get_watched(&self, args_json: String) -> PluginResponse {
        let args = match parse_args(&args_json) {
            Ok(args) => args,
            Err(response) => return response,
        };

        if let Some(identifier) = args.first().and_then(Value::as_str) {
            return match self.manager.watched_notification(identifier) {
                Ok(notification) => PluginResponse::success("Found 1 geofence.", Some(notification)),
                Err(err) => PluginResponse::from_manager_error("getWatched", &err),
            };
        }

        match self.manager.all_watched_notifications() {
            Ok(notifications) => PluginResponse::success(
                format!("Found {} geofence(s).", notifications.len()),
                Some(Value::Array(notifications)),
            ),
            Err(err) => PluginResponse::from_manager_error("getWatched", &err),
        }
    }

    /// `remove`: args `[id, ...]` or `[[id, ...]]`; unknown ids are ignored.
    #[flutter_rust_bridge::frb(sync)]
    pub fn remove(&self, args_json: String) -> PluginResponse {
        let args = match parse_args(&args_json) {
            Ok(args) => args,
            Err(response) => return response,
        };
        let Some(identifiers) = identifiers_arg(list_args(args)) else {
            return PluginResponse::failure(
                CODE_INVALID_ARGUMENTS,
                "remove expects identifiers or one non-empty array of them",
            );
        };

        let mut removed = 0;
        for identifier in &identifiers {
            match self.manager.remove_notification_for_identifier(identifier) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => return PluginResponse::from_manager_error("remove", &err),
            }
        }
        PluginResponse::success(
            format!("{removed} geofence(s) removed."),
            Some(json!({ "removed": removed })),
        )
    }

    /// `removeAll`: stops every region and clears storage.
    #[flutter_rust_bridge::frb(sync)]
    pub fn remove_all(&self) -> PluginResponse {
        match self.manager.remove_all_notifications() {
            Ok(removed) => PluginResponse::success(
                format!("{removed} geofence(s) removed."),
                Some(json!({ "removed": removed })),
            ),
            Err(err) => PluginResponse::from_manager_error("removeAll", &err),
        }
    }

    /// Waits up to `timeout_ms` for the next region event JSON
    /// `{eventId, identifier, transition, timestamp, notification}`.
    ///
    /// # FFI contract
    /// - Blocking; call from a host worker thread, not the UI thread.
    /// - Returns `None` on timeout, before `deviceReady`, or after shutdown.
    pub fn next_region_event(&self, timeout_ms: u32) -> Option<String> {
        let timeout = timeout_ms.min(NEXT_EVENT_TIMEOUT_MAX_MS);
        self.events.next(Duration::from_millis(u64::from(timeout)))
    }

    /// Takes every pending region event without waiting.
    #[flutter_rust_bridge::frb(sync)]
    pub fn drain_region_events(&self) -> Vec<String> {
        self.events.drain()
    }

    /// Native host: takes queued platform requests as a JSON array.
    #[flutter_rust_bridge::frb(sync)]
    pub fn take_platform_requests(&self) -> String {
        let requests = self.location.take_requests();
        serde_json::to_string(&requests).unwrap_or_else(|err| {
            error!("event=platform_requests module=ffi status=error error={err}");
            "[]".to_string()
        })
    }

    /// Native host: a monitored region was entered or exited.
    #[flutter_rust_bridge::frb(sync)]
    pub fn report_region_event(&self, identifier: String, transition: String) -> PluginResponse {
        let Some(transition) = RegionTransition::parse(&transition) else {
            return PluginResponse::failure(
                CODE_INVALID_ARGUMENTS,
                format!("unknown region transition `{transition}`"),
            );
        };
        let emitted = self
            .manager
            .handle_region_event(&identifier, transition)
            .is_some();
        PluginResponse::success(
            if emitted { "Event emitted." } else { "Event dropped." },
            Some(json!({ "emitted": emitted })),
        )
    }

    /// Native host: the OS refused or dropped a region registration.
    #[flutter_rust_bridge::frb(sync)]
    pub fn report_monitoring_failed(&self, identifier: String, reason: String) -> PluginResponse {
        self.location.mark_failed(&identifier);
        self.manager
            .handle_monitoring_failed(&identifier, &LocationError::Unavailable(reason));
        PluginResponse::success("Failure recorded.", None)
    }

    /// Native host: location authorization changed.
    #[flutter_rust_bridge::frb(sync)]
    pub fn report_authorization(&self, status: String) -> PluginResponse {
        let Some(status) = AuthorizationStatus::parse(&status) else {
            return PluginResponse::failure(
                CODE_INVALID_ARGUMENTS,
                format!("unknown authorization status `{status}`"),
            );
        };
        self.location.set_authorization_status(status);
        self.manager.handle_authorization_changed(status);
        PluginResponse::success(
            "Authorization updated.",
            Some(json!({ "authorization": status.as_str() })),
        )
    }

    /// Detaches the event relay and discards undelivered events.
    #[flutter_rust_bridge::frb(sync)]
    pub fn shutdown(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            self.manager.unsubscribe(subscription);
        }
        self.events.close();
        info!("event=plugin_shutdown module=ffi status=ok");
    }

    fn subscribe_events(&self) {
        let mut subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if subscription.is_some() {
            return;
        }

        let events = Arc::clone(&self.events);
        *subscription = Some(self.manager.subscribe(Arc::new(move |event: &RegionEvent| {
            match serde_json::to_string(event) {
                Ok(payload) => events.push(payload),
                Err(err) => error!(
                    "event=region_event_encode module=ffi status=error id={} error={err}",
                    event.identifier
                ),
            }
        })));
    }
}

impl Drop for GeofencePlugin {
    fn drop(&mut self) {
        self.events.close();
    }
}

fn parse_args(args_json: &str) -> Result<Vec<Value>, PluginResponse> {
    let trimmed = args_json.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(single) => Ok(vec![single]),
        Err(err) => Err(PluginResponse::failure(
            CODE_INVALID_ARGUMENTS,
            format!("arguments are not valid JSON: {err}"),
        )),
    }
}

/// Positional list arguments: either every argument is an item, or the only
/// argument is an array of items.
fn list_args(mut args: Vec<Value>) -> Vec<Value> {
    if let [Value::Array(_)] = args.as_slice() {
        if let Some(Value::Array(items)) = args.pop() {
            return items;
        }
    }
    args
}

fn identifiers_arg(items: Vec<Value>) -> Option<Vec<String>> {
    if items.is_empty() {
        return None;
    }
    items
        .into_iter()
        .map(|item| match item {
            Value::String(identifier) => Some(identifier),
            _ => None,
        })
        .collect()
}

fn resolve_db_path(db_path: Option<String>) -> PathBuf {
    let explicit = db_path
        .or_else(|| std::env::var(DB_PATH_ENV).ok())
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty());
    match explicit {
        Some(path) => PathBuf::from(path),
        None => std::env::temp_dir().join(DB_FILE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::{core_version, init_logging, ping, GeofencePlugin, PluginResponse};
    use serde_json::{json, Value};

    fn plugin() -> GeofencePlugin {
        let plugin = GeofencePlugin::open_in_memory(None).expect("open in-memory plugin");
        assert_ok(&plugin.initialize(String::new()));
        plugin
    }

    fn assert_ok(response: &PluginResponse) {
        assert!(response.ok, "{}", response.message);
    }

    fn data(response: &PluginResponse) -> Value {
        serde_json::from_str(response.data_json.as_deref().expect("data_json present"))
            .expect("data_json is JSON")
    }

    #[test]
    fn ping_and_version_are_available() {
        assert_eq!(ping(), "pong");
        assert!(!core_version().is_empty());
        let response = plugin().ping();
        assert_ok(&response);
        assert_eq!(data(&response), json!("pong"));
    }

    #[test]
    fn init_logging_rejects_invalid_arguments() {
        assert!(!init_logging("info".to_string(), String::new()).is_empty());
        assert!(!init_logging("verbose".to_string(), "tmp/logs".to_string()).is_empty());
    }

    #[test]
    fn added_geofence_is_returned_by_get_watched() {
        let plugin = plugin();
        let geofence = json!({"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100});
        assert_ok(&plugin.add_or_update(json!([geofence]).to_string()));

        let watched = plugin.get_watched("[]".to_string());
        assert_ok(&watched);
        assert_eq!(data(&watched), json!([geofence]));
    }

    #[test]
    fn re_adding_geofence_replaces_it() {
        let plugin = plugin();
        plugin.add_or_update(json!([{"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100}]).to_string());
        let response =
            plugin.add_or_update(json!([{"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 200}]).to_string());
        assert_ok(&response);
        assert_eq!(data(&response)["updated"], 1);

        let watched = data(&plugin.get_watched(String::new()));
        assert_eq!(watched.as_array().unwrap().len(), 1);
        assert_eq!(watched[0]["radius"], 200);
    }

    #[test]
    fn missing_radius_returns_validation_error_payload() {
        let plugin = plugin();
        let response = plugin.add_or_update(json!([{"id": "geo1", "lat": 1.0, "lng": 2.0}]).to_string());

        assert!(!response.ok);
        assert_eq!(response.error_code.as_deref(), Some("validation_error"));
        let error: Value = serde_json::from_str(&response.error_json().unwrap()).unwrap();
        assert_eq!(error["code"], "validation_error");
        assert!(error["message"].as_str().unwrap().contains("radius"));
        assert_eq!(data(&plugin.get_watched(String::new())), json!([]));
    }

    #[test]
    fn crossing_event_reaches_scripting_layer_once() {
        let plugin = plugin();
        plugin.device_ready();
        plugin.add_or_update(json!([{"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100}]).to_string());

        let response = plugin.report_region_event("geo1".to_string(), "enter".to_string());
        assert_ok(&response);
        assert_eq!(data(&response)["emitted"], true);

        let events = plugin.drain_region_events();
        assert_eq!(events.len(), 1);
        let event: Value = serde_json::from_str(&events[0]).unwrap();
        assert_eq!(event["identifier"], "geo1");
        assert_eq!(event["transition"], "enter");
        assert!(event["timestamp"].as_i64().is_some());
    }

    #[test]
    fn crossing_for_unknown_geofence_emits_nothing() {
        let plugin = plugin();
        plugin.device_ready();

        let response = plugin.report_region_event("ghost".to_string(), "exit".to_string());
        assert_ok(&response);
        assert_eq!(data(&response)["emitted"], false);
        assert!(plugin.drain_region_events().is_empty());
    }

    #[test]
    fn events_before_device_ready_are_delivered_after_it() {
        let plugin = plugin();
        plugin.add_or_update(json!({"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100}).to_string());
        plugin.report_region_event("geo1".to_string(), "1".to_string());

        assert!(plugin.drain_region_events().is_empty());
        assert_eq!(data(&plugin.device_ready())["pendingEvents"], 1);
        assert!(plugin.next_region_event(10).is_some());
    }

    #[test]
    fn execute_dispatches_by_action_name() {
        let plugin = GeofencePlugin::open_in_memory(None).unwrap();
        assert_ok(&plugin.execute("initialize".to_string(), "[]".to_string()));
        assert_ok(&plugin.execute(
            "addOrUpdate".to_string(),
            json!([[
                {"id": "a", "lat": 1.0, "lng": 2.0, "radius": 100},
                {"id": "b", "lat": 1.0, "lng": 2.0, "radius": 100}
            ]])
            .to_string(),
        ));

        let removed = plugin.execute("remove".to_string(), json!([["a", "missing"]]).to_string());
        assert_eq!(data(&removed)["removed"], 1);

        let one = plugin.execute("getWatched".to_string(), json!(["b"]).to_string());
        assert_eq!(data(&one)["id"], "b");
        let missing = plugin.execute("getWatched".to_string(), json!(["a"]).to_string());
        assert_eq!(missing.error_code.as_deref(), Some("not_found"));

        let cleared = plugin.execute("removeAll".to_string(), String::new());
        assert_eq!(data(&cleared)["removed"], 1);

        let unknown = plugin.execute("teleport".to_string(), String::new());
        assert_eq!(unknown.error_code.as_deref(), Some("invalid_action"));
    }

    #[test]
    fn malformed_arguments_return_invalid_arguments() {
        let plugin = plugin();
        for response in [
            plugin.add_or_update("{not json".to_string()),
            plugin.add_or_update("[42]".to_string()),
            plugin.remove("[{}]".to_string()),
            plugin.report_region_event("geo1".to_string(), "dwell".to_string()),
            plugin.report_authorization("maybe".to_string()),
        ] {
            assert!(!response.ok);
            assert_eq!(response.error_code.as_deref(), Some("invalid_arguments"));
        }
    }

    #[test]
    fn positional_arguments_are_all_applied() {
        let plugin = plugin();
        let response = plugin.add_or_update(
            json!([
                {"id": "a", "lat": 1.0, "lng": 2.0, "radius": 100},
                {"id": "b", "lat": 1.0, "lng": 2.0, "radius": 100}
            ])
            .to_string(),
        );
        assert_ok(&response);
        assert_eq!(data(&response)["inserted"], 2);
        assert_eq!(data(&plugin.get_watched(String::new())).as_array().unwrap().len(), 2);

        let removed = plugin.remove(json!(["a", "b"]).to_string());
        assert_eq!(data(&removed)["removed"], 2);
        assert_eq!(data(&plugin.get_watched(String::new())), json!([]));
    }

    #[test]
    fn mixed_or_empty_list_arguments_are_rejected_without_writes() {
        let plugin = plugin();
        for response in [
            plugin.add_or_update(
                json!([{"id": "a", "lat": 1.0, "lng": 2.0, "radius": 100}, "b"]).to_string(),
            ),
            plugin.add_or_update(json!([[{"id": "a", "lat": 1.0, "lng": 2.0, "radius": 100}], []]).to_string()),
            plugin.add_or_update("[]".to_string()),
            plugin.remove(json!(["a", 7]).to_string()),
            plugin.remove(json!([[]]).to_string()),
        ] {
            assert_eq!(response.error_code.as_deref(), Some("invalid_arguments"));
        }
        assert_eq!(data(&plugin.get_watched(String::new())), json!([]));
    }

    #[test]
    fn initialize_reports_region_cap_and_starts_logging_at_default_level() {
        let log_dir = std::env::temp_dir().join(format!("geofence-ffi-logs-{}", std::process::id()));
        let plugin = GeofencePlugin::open_in_memory(Some(3)).unwrap();

        let response =
            plugin.initialize(json!([{ "logDir": log_dir.to_str().unwrap() }]).to_string());
        assert_ok(&response);
        assert_eq!(data(&response)["maxRegions"], 3);
        assert_eq!(data(&response)["restored"], 0);
        let (level, dir) = geofence_core::logging_status().expect("logging is active");
        assert_eq!(level, geofence_core::default_log_level());
        assert_eq!(dir, log_dir);
    }

    #[test]
    fn host_receives_platform_requests() {
        let plugin = GeofencePlugin::open_in_memory(None).unwrap();
        plugin.initialize(String::new());
        plugin.add_or_update(json!([{"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100}]).to_string());
        plugin.remove(json!(["geo1"]).to_string());

        let requests: Value = serde_json::from_str(&plugin.take_platform_requests()).unwrap();
        let kinds = requests
            .as_array()
            .unwrap()
            .iter()
            .map(|request| request["type"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec!["request_authorization", "start_monitoring", "stop_monitoring"]
        );
        assert_eq!(plugin.take_platform_requests(), "[]");
    }

    #[test]
    fn denied_authorization_is_reported_as_permission_error() {
        let plugin = plugin();
        assert_ok(&plugin.report_authorization("denied".to_string()));

        let response = plugin.add_or_update(json!([{"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100}]).to_string());
        assert_eq!(response.error_code.as_deref(), Some("permission_denied"));
    }

    #[test]
    fn region_cap_is_reported_as_resource_exhausted() {
        let plugin = GeofencePlugin::open_in_memory(Some(1)).unwrap();
        plugin.initialize(String::new());
        assert_ok(&plugin.add_or_update(json!([{"id": "a", "lat": 1.0, "lng": 2.0, "radius": 100}]).to_string()));

        let response = plugin.add_or_update(json!([{"id": "b", "lat": 1.0, "lng": 2.0, "radius": 100}]).to_string());
        assert_eq!(response.error_code.as_deref(), Some("resource_exhausted"));
        assert_eq!(data(&plugin.get_watched(String::new())).as_array().unwrap().len(), 1);
    }

    #[test]
    fn geofences_survive_plugin_reload_and_are_restored() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("geofence.db").to_str().unwrap().to_string();

        {
            let plugin = GeofencePlugin::open(Some(db_path.clone()), None).unwrap();
            plugin.initialize(String::new());
            assert_ok(&plugin.add_or_update(json!([{"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100}]).to_string()));
        }

        let reloaded = GeofencePlugin::open(Some(db_path), None).unwrap();
        let init = reloaded.initialize(String::new());
        assert_eq!(data(&init)["restored"], 1);
        assert_eq!(data(&reloaded.get_watched(String::new()))[0]["id"], "geo1");
    }

    #[test]
    fn shutdown_stops_event_delivery() {
        let plugin = plugin();
        plugin.device_ready();
        plugin.add_or_update(json!([{"id": "geo1", "lat": 1.0, "lng": 2.0, "radius": 100}]).to_string());
        plugin.shutdown();

        plugin.report_region_event("geo1".to_string(), "enter".to_string());
        assert!(plugin.drain_region_events().is_empty());
        assert_eq!(plugin.next_region_event(5), None);
    }
}
