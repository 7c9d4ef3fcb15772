//! Geofence manager: keeps the notification store and platform region
//! monitoring in sync, and turns region crossings into events.
//!
//! # Responsibility
//! - Validate notification payloads before they are persisted.
//! - Register/unregister regions with the platform location service.
//! - Fan out crossing events to subscribed listeners.
//!
//! # Invariants
//! - The store and the registered-region set are guarded by one mutex, held
//!   for a single operation and never across platform or listener calls.
//! - The store is the source of truth: a crossing for an identifier that is
//!   not stored is dropped and its registration cleaned up.
//! - A rejected registration leaves the store and every earlier registration
//!   as they were before the call.

use crate::model::notification::{GeofenceNotification, NotificationValidationError};
use crate::model::region::{RegionEvent, RegionTransition};
use crate::platform::{AuthorizationStatus, LocationError, LocationService};
use crate::repo::notification_store::{NotificationStore, StoreError, UpsertOutcome};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Region cap applied when the host does not configure one; matches the
/// per-app limit of the most restrictive mobile OS.
pub const DEFAULT_MAX_MONITORED_REGIONS: usize = 20;

pub type ManagerResult<T> = Result<T, ManagerError>;

/// Errors reported by manager operations.
#[derive(Debug)]
pub enum ManagerError {
    Validation(NotificationValidationError),
    NotFound(String),
    PermissionDenied,
    ResourceExhausted { limit: usize },
    Persistence(StoreError),
    Platform(String),
}

impl ManagerError {
    /// Stable machine-readable classification forwarded to the hybrid layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::Persistence(_) => "persistence_error",
            Self::Platform(_) => "platform_error",
        }
    }

    /// Whether retrying after user action (grant permission, free a slot)
    /// can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::ResourceExhausted { .. })
    }
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "invalid geofence: {err}"),
            Self::NotFound(identifier) => write!(f, "geofence not found: {identifier}"),
            Self::PermissionDenied => write!(f, "location permission not granted"),
            Self::ResourceExhausted { limit } => write!(
                f,
                "cannot monitor more than {limit} regions; remove a geofence first"
            ),
            Self::Persistence(err) => write!(f, "geofence storage failed: {err}"),
            Self::Platform(message) => write!(f, "location service error: {message}"),
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NotificationValidationError> for ManagerError {
    fn from(value: NotificationValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for ManagerError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value)
    }
}

impl From<LocationError> for ManagerError {
    fn from(value: LocationError) -> Self {
        match value {
            LocationError::LimitReached { limit } => Self::ResourceExhausted { limit },
            LocationError::PermissionDenied => Self::PermissionDenied,
            LocationError::Unavailable(reason) => Self::Platform(reason),
        }
    }
}

/// Manager tuning supplied by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerConfig {
    pub max_monitored_regions: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_monitored_regions: DEFAULT_MAX_MONITORED_REGIONS,
        }
    }
}

/// Receiver of region-crossing events.
pub trait RegionEventListener: Send + Sync {
    fn on_region_event(&self, event: &RegionEvent);
}

impl<F> RegionEventListener for F
where
    F: Fn(&RegionEvent) + Send + Sync,
{
    fn on_region_event(&self, event: &RegionEvent) {
        self(event)
    }
}

/// Handle returned by `GeofenceManager::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct ManagerState<S> {
    store: S,
    registered: BTreeSet<String>,
}

/// Coordinates the notification store with platform region monitoring.
pub struct GeofenceManager<S, L>
where
    S: NotificationStore + Send,
    L: LocationService + ?Sized,
{
    state: Mutex<ManagerState<S>>,
    location: Arc<L>,
    config: ManagerConfig,
    listeners: Mutex<Vec<(SubscriptionId, Arc<dyn RegionEventListener>)>>,
    next_subscription: AtomicU64,
}

impl<S, L> GeofenceManager<S, L>
where
    S: NotificationStore + Send,
    L: LocationService + ?Sized,
{
    /// Creates a manager with nothing registered yet.
    ///
    /// Stored notifications are not re-registered until `restore_monitoring`.
    pub fn new(store: S, location: Arc<L>, config: ManagerConfig) -> Self {
        Self {
            state: Mutex::new(ManagerState {
                store,
                registered: BTreeSet::new(),
            }),
            location,
            config,
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> ManagerConfig {
        self.config
    }

    /// Requests the location permission needed for background monitoring.
    ///
    /// The answer arrives through `handle_authorization_changed`.
    pub fn register_permissions(&self) {
        let status = self.location.authorization_status();
        if status == AuthorizationStatus::AuthorizedAlways {
            debug!("event=permission_request module=manager status=skipped reason=already_authorized");
            return;
        }
        info!(
            "event=permission_request module=manager status=requested current={}",
            status.as_str()
        );
        self.location.request_authorization();
    }

    /// Validates, persists and registers one notification.
    ///
    /// # Errors
    /// - `Validation` when the payload lacks an id, center or radius; nothing
    ///   is written.
    /// - `PermissionDenied` when location access is refused.
    /// - `ResourceExhausted` when the region cap is reached; existing
    ///   registrations are untouched.
    /// - `Persistence` when the store write fails.
    pub fn add_or_update_notification(&self, json: &Value) -> ManagerResult<UpsertOutcome> {
        let notification = GeofenceNotification::from_json(json).map_err(|err| {
            warn!("event=geofence_upsert module=manager status=rejected error_code=validation_error error={err}");
            ManagerError::Validation(err)
        })?;
        self.upsert_validated(&notification)
    }

    /// Applies a batch of notifications in order.
    ///
    /// The whole batch is validated before anything is written. Application
    /// stops at the first failure; earlier items stay registered.
    pub fn add_or_update_notifications(&self, payloads: &[Value]) -> ManagerResult<Vec<UpsertOutcome>> {
        let notifications = payloads
            .iter()
            .map(GeofenceNotification::from_json)
            .collect::<Result<Vec<_>, _>>()?;

        notifications
            .iter()
            .map(|notification| self.upsert_validated(notification))
            .collect()
    }

    /// Returns every stored notification payload.
    pub fn all_watched_notifications(&self) -> ManagerResult<Vec<Value>> {
        Ok(self.lock().store.all_notifications()?)
    }

    /// Returns one stored notification payload.
    pub fn watched_notification(&self, identifier: &str) -> ManagerResult<Value> {
        self.lock()
            .store
            .notification_for_identifier(identifier)?
            .ok_or_else(|| ManagerError::NotFound(identifier.trim().to_string()))
    }

    pub fn is_monitoring(&self, identifier: &str) -> bool {
        self.lock().registered.contains(identifier.trim())
    }

    pub fn monitored_count(&self) -> usize {
        self.lock().registered.len()
    }

    /// Removes one notification and stops monitoring its region.
    ///
    /// Unknown identifiers are not an error; returns whether a record existed.
    pub fn remove_notification_for_identifier(&self, identifier: &str) -> ManagerResult<bool> {
        let identifier = identifier.trim();
        let (removed, was_registered) = {
            let mut state = self.lock();
            let removed = state.store.remove_notification_for_identifier(identifier)?;
            (removed, state.registered.remove(identifier))
        };

        if was_registered {
            self.location.stop_monitoring(identifier);
        }
        info!(
            "event=geofence_remove module=manager status=ok id={identifier} removed={removed} unregistered={was_registered}"
        );
        Ok(removed)
    }

    /// Stops monitoring every region and clears the store.
    pub fn remove_all_notifications(&self) -> ManagerResult<usize> {
        let (removed, registered) = {
            let mut state = self.lock();
            let removed = state.store.remove_all_notifications()?;
            (removed, std::mem::take(&mut state.registered))
        };

        for identifier in &registered {
            self.location.stop_monitoring(identifier);
        }
        info!(
            "event=geofence_remove_all module=manager status=ok removed={removed} unregistered={}",
            registered.len()
        );
        Ok(removed)
    }

    /// Registers every stored notification that is not monitored yet.
    ///
    /// Called at startup and when permission is granted. Invalid stored rows
    /// and rows beyond the region cap are skipped with a warning.
    pub fn restore_monitoring(&self) -> ManagerResult<usize> {
        if self.location.authorization_status().is_refused() {
            warn!("event=geofence_restore module=manager status=skipped reason=permission_denied");
            return Ok(0);
        }

        let candidates = {
            let mut state = self.lock();
            let stored = state.store.all_notifications()?;
            let mut candidates = Vec::new();
            for payload in &stored {
                let notification = match GeofenceNotification::from_json(payload) {
                    Ok(notification) => notification,
                    Err(err) => {
                        warn!("event=geofence_restore module=manager status=skipped reason=invalid_record error={err}");
                        continue;
                    }
                };
                if state.registered.contains(&notification.identifier) {
                    continue;
                }
                if state.registered.len() >= self.config.max_monitored_regions {
                    warn!(
                        "event=geofence_restore module=manager status=skipped reason=region_limit id={}",
                        notification.identifier
                    );
                    continue;
                }
                state.registered.insert(notification.identifier.clone());
                candidates.push(notification);
            }
            candidates
        };

        let mut restored = 0;
        for notification in &candidates {
            match self.location.start_monitoring(&notification.region()) {
                Ok(()) => restored += 1,
                Err(err) => {
                    warn!(
                        "event=geofence_restore module=manager status=error id={} error={err}",
                        notification.identifier
                    );
                    self.lock().registered.remove(&notification.identifier);
                }
            }
        }

        info!("event=geofence_restore module=manager status=ok restored={restored}");
        Ok(restored)
    }

    /// Platform callback for a region boundary crossing.
    ///
    /// Returns the emitted event, or `None` when the crossing was dropped
    /// (unknown identifier, trigger not requested, or storage failure).
    pub fn handle_region_event(
        &self,
        identifier: &str,
        transition: RegionTransition,
    ) -> Option<RegionEvent> {
        let identifier = identifier.trim();
        let lookup = {
            let mut state = self.lock();
            let lookup = state.store.notification_for_identifier(identifier);
            if let Ok(None) = lookup {
                state.registered.remove(identifier);
            }
            lookup
        };

        let payload = match lookup {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                info!(
                    "event=region_crossing module=manager status=dropped reason=stale_registration id={identifier}"
                );
                self.location.stop_monitoring(identifier);
                self.reassert_if_readded(identifier);
                return None;
            }
            Err(err) => {
                error!(
                    "event=region_crossing module=manager status=error id={identifier} error_code=persistence_error error={err}"
                );
                return None;
            }
        };

        let triggers = GeofenceNotification::from_json(&payload)
            .map(|notification| notification.triggers)
            .unwrap_or_default();
        if !triggers.matches(transition) {
            debug!(
                "event=region_crossing module=manager status=ignored id={identifier} transition={}",
                transition.as_str()
            );
            return None;
        }

        let event = RegionEvent::new(identifier, transition, payload);
        info!(
            "event=region_crossing module=manager status=ok id={identifier} transition={}",
            transition.as_str()
        );
        self.dispatch(&event);
        Some(event)
    }

    /// Platform callback for a registration the OS rejected asynchronously.
    ///
    /// The notification stays stored; it is retried by `restore_monitoring`.
    pub fn handle_monitoring_failed(&self, identifier: &str, reason: &LocationError) {
        let identifier = identifier.trim();
        let was_registered = self.lock().registered.remove(identifier);
        warn!(
            "event=monitoring_failed module=manager status=error id={identifier} was_registered={was_registered} error={reason}"
        );
    }

    /// Platform callback for authorization changes.
    pub fn handle_authorization_changed(&self, status: AuthorizationStatus) {
        if status.is_refused() {
            let dropped = std::mem::take(&mut self.lock().registered);
            warn!(
                "event=authorization_changed module=manager status={} unregistered={}",
                status.as_str(),
                dropped.len()
            );
            return;
        }

        info!(
            "event=authorization_changed module=manager status={}",
            status.as_str()
        );
        if status.is_authorized() {
            if let Err(err) = self.restore_monitoring() {
                error!("event=geofence_restore module=manager status=error error={err}");
            }
        }
    }

    /// Adds a listener for crossing events.
    pub fn subscribe(&self, listener: Arc<dyn RegionEventListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners_lock().push((id, listener));
        id
    }

    /// Removes a listener; returns `false` for unknown handles.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners_lock();
        let before = listeners.len();
        listeners.retain(|(subscription, _)| *subscription != id);
        listeners.len() != before
    }

    fn upsert_validated(&self, notification: &GeofenceNotification) -> ManagerResult<UpsertOutcome> {
        let identifier = notification.identifier.as_str();
        if self.location.authorization_status().is_refused() {
            warn!("event=geofence_upsert module=manager status=rejected id={identifier} error_code=permission_denied");
            return Err(ManagerError::PermissionDenied);
        }

        let (outcome, previous, was_registered) = {
            let mut state = self.lock();
            let was_registered = state.registered.contains(identifier);
            if !was_registered && state.registered.len() >= self.config.max_monitored_regions {
                warn!("event=geofence_upsert module=manager status=rejected id={identifier} error_code=resource_exhausted");
                return Err(ManagerError::ResourceExhausted {
                    limit: self.config.max_monitored_regions,
                });
            }
            let previous = state.store.notification_for_identifier(identifier)?;
            let outcome = state
                .store
                .add_or_update_notification(&notification.to_json())?;
            state.registered.insert(identifier.to_string());
            (outcome, previous, was_registered)
        };

        if let Err(err) = self.location.start_monitoring(&notification.region()) {
            warn!("event=geofence_upsert module=manager status=rolled_back id={identifier} error={err}");
            self.roll_back(identifier, previous, was_registered);
            return Err(err.into());
        }

        info!("event=geofence_upsert module=manager status=ok id={identifier} outcome={outcome:?}");
        Ok(outcome)
    }

    /// Re-issues a registration when the identifier was stored again while a
    /// stale-region stop was in flight, so the stop never outlives the record.
    fn reassert_if_readded(&self, identifier: &str) {
        let readded = {
            let state = self.lock();
            if !state.registered.contains(identifier) {
                return;
            }
            state.store.notification_for_identifier(identifier)
        };

        let Ok(Some(payload)) = readded else {
            return;
        };
        let Ok(notification) = GeofenceNotification::from_json(&payload) else {
            return;
        };
        if let Err(err) = self.location.start_monitoring(&notification.region()) {
            warn!("event=region_crossing module=manager status=error id={identifier} reason=reregister_failed error={err}");
            self.lock().registered.remove(identifier);
        }
    }

    fn roll_back(&self, identifier: &str, previous: Option<Value>, was_registered: bool) {
        let mut state = self.lock();
        let restored = match previous {
            Some(payload) => state.store.add_or_update_notification(&payload).map(|_| ()),
            None => state
                .store
                .remove_notification_for_identifier(identifier)
                .map(|_| ()),
        };
        if let Err(err) = restored {
            error!("event=geofence_rollback module=manager status=error id={identifier} error={err}");
        }
        if !was_registered {
            state.registered.remove(identifier);
        }
    }

    fn dispatch(&self, event: &RegionEvent) {
        let listeners = self
            .listeners_lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect::<Vec<_>>();
        for listener in listeners {
            listener.on_region_event(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners_lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Arc<dyn RegionEventListener>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
