//! Location service backed by a request queue drained by the native host.

use super::{AuthorizationStatus, LocationError, LocationService};
use crate::model::region::CircularRegion;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One instruction for the native location manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformRequest {
    RequestAuthorization,
    StartMonitoring { region: CircularRegion },
    StopMonitoring { identifier: String },
}

#[derive(Debug)]
struct QueuedState {
    authorization: AuthorizationStatus,
    region_limit: Option<usize>,
    monitored: BTreeSet<String>,
    pending: VecDeque<PlatformRequest>,
}

/// `LocationService` that records requests for the host to execute.
///
/// The host (Swift/Kotlin side of the plugin) drains `take_requests` and
/// forwards each request to the OS, then reports status changes back.
#[derive(Debug)]
pub struct QueuedLocationService {
    state: Mutex<QueuedState>,
}

impl QueuedLocationService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueuedState {
                authorization: AuthorizationStatus::NotDetermined,
                region_limit: None,
                monitored: BTreeSet::new(),
                pending: VecDeque::new(),
            }),
        }
    }

    /// Mirrors the OS cap on monitored regions, rejecting requests beyond it.
    pub fn with_region_limit(limit: usize) -> Self {
        let service = Self::new();
        service.lock().region_limit = Some(limit);
        service
    }

    pub fn set_authorization_status(&self, status: AuthorizationStatus) {
        let mut state = self.lock();
        state.authorization = status;
        if status.is_refused() {
            state.monitored.clear();
        }
    }

    /// Removes and returns every request recorded since the last call.
    pub fn take_requests(&self) -> Vec<PlatformRequest> {
        self.lock().pending.drain(..).collect()
    }

    pub fn monitored_identifiers(&self) -> Vec<String> {
        self.lock().monitored.iter().cloned().collect()
    }

    pub fn is_monitoring(&self, identifier: &str) -> bool {
        self.lock().monitored.contains(identifier)
    }

    /// Forgets a region the host reported as failed.
    pub fn mark_failed(&self, identifier: &str) {
        self.lock().monitored.remove(identifier);
    }

    fn lock(&self) -> MutexGuard<'_, QueuedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for QueuedLocationService {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationService for QueuedLocationService {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.lock().authorization
    }

    fn request_authorization(&self) {
        self.lock()
            .pending
            .push_back(PlatformRequest::RequestAuthorization);
    }

    fn start_monitoring(&self, region: &CircularRegion) -> Result<(), LocationError> {
        let mut state = self.lock();
        if state.authorization.is_refused() {
            return Err(LocationError::PermissionDenied);
        }
        if let Some(limit) = state.region_limit {
            if !state.monitored.contains(&region.identifier) && state.monitored.len() >= limit {
                return Err(LocationError::LimitReached { limit });
            }
        }

        state.monitored.insert(region.identifier.clone());
        state.pending.push_back(PlatformRequest::StartMonitoring {
            region: region.clone(),
        });
        debug!(
            "event=platform_start module=platform status=queued id={}",
            region.identifier
        );
        Ok(())
    }

    fn stop_monitoring(&self, identifier: &str) {
        let mut state = self.lock();
        state.monitored.remove(identifier);
        // Forwarded even when untracked: the OS may still hold regions
        // registered by a previous launch.
        state.pending.push_back(PlatformRequest::StopMonitoring {
            identifier: identifier.to_string(),
        });
    }
}
