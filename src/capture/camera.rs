use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter};
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};

use crate::settings::{CameraConstraints, SettingsStore};

use super::state::{DeviceSlot, DeviceSwitch};

pub const CAMERA_ACQUIRE_EVENT: &str = "camera-acquire";
pub const CAMERA_RELEASE_EVENT: &str = "camera-release";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera did not start within {0}ms")]
    Timeout(u64),
    #[error("camera host went away before answering")]
    HostClosed,
}

/// Failure reported by the webview, shaped like a DOMException.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraFailure {
    pub name: String,
    pub message: String,
}

impl From<CameraFailure> for DeviceError {
    fn from(failure: CameraFailure) -> Self {
        let detail = if failure.message.is_empty() {
            failure.name.clone()
        } else {
            format!("{}: {}", failure.name, failure.message)
        };
        match failure.name.as_str() {
            "NotAllowedError" | "SecurityError" | "PermissionDeniedError" => {
                DeviceError::PermissionDenied(detail)
            }
            _ => DeviceError::Unavailable(detail),
        }
    }
}

/// Owner of the physical cameras.
#[async_trait::async_trait]
pub trait CameraHost: Send + Sync {
    async fn acquire(
        &self,
        slot: DeviceSlot,
        constraints: &CameraConstraints,
    ) -> Result<(), DeviceError>;

    async fn release(&self, slot: DeviceSlot);
}

/// Devices currently held and the last switch applied to them.
#[derive(Debug, Default)]
struct HeldDevices {
    active: Option<DeviceSlot>,
    applied_seq: u64,
}

/// Serializes device switches so a release always completes before the next
/// acquire and no two devices are ever held together. A switch planned
/// before one that already ran is dropped.
#[derive(Clone)]
pub struct DeviceManager {
    host: Arc<dyn CameraHost>,
    held: Arc<Mutex<HeldDevices>>,
}

impl DeviceManager {
    pub fn new(host: Arc<dyn CameraHost>) -> Self {
        Self {
            host,
            held: Arc::new(Mutex::new(HeldDevices::default())),
        }
    }

    /// Make `switch.target` the only acquired device (or none). Returns
    /// `Ok(false)` when a newer switch already ran and this one was skipped.
    /// On failure nothing is left acquired.
    pub async fn switch_to(
        &self,
        switch: &DeviceSwitch,
        constraints: &CameraConstraints,
    ) -> Result<bool, DeviceError> {
        let mut held = self.held.lock().await;
        if switch.seq <= held.applied_seq {
            info!(
                "Skipping camera switch {} to {:?}, switch {} already applied",
                switch.seq, switch.target, held.applied_seq
            );
            return Ok(false);
        }
        held.applied_seq = switch.seq;

        if held.active == switch.target {
            return Ok(true);
        }

        if let Some(current) = held.active.take() {
            self.host.release(current).await;
            info!("Released {:?} camera", current);
        }

        if let Some(slot) = switch.target {
            self.host.acquire(slot, constraints).await?;
            held.active = Some(slot);
            info!("Acquired {:?} camera", slot);
        }

        Ok(true)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CameraAcquireEvent<'a> {
    request_id: u64,
    slot: DeviceSlot,
    constraints: &'a CameraConstraints,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CameraReleaseEvent {
    slot: DeviceSlot,
}

type PendingAcks = HashMap<u64, oneshot::Sender<Result<(), DeviceError>>>;

/// Cameras live in the webview: acquisition is requested with an event and
/// confirmed by the `camera_ready` command.
#[derive(Clone)]
pub struct WebviewCameraHost {
    app_handle: AppHandle,
    settings: Arc<SettingsStore>,
    pending: Arc<std::sync::Mutex<PendingAcks>>,
    next_request: Arc<AtomicU64>,
}

impl WebviewCameraHost {
    pub fn new(app_handle: AppHandle, settings: Arc<SettingsStore>) -> Self {
        Self {
            app_handle,
            settings,
            pending: Arc::new(std::sync::Mutex::new(HashMap::new())),
            next_request: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Deliver the webview's answer. Returns false for unknown or expired
    /// requests; the webview must then stop the stream it opened.
    pub fn resolve(&self, request_id: u64, failure: Option<CameraFailure>) -> bool {
        let sender = self.pending_acks().remove(&request_id);
        match sender {
            Some(sender) => {
                let result = match failure {
                    Some(failure) => Err(DeviceError::from(failure)),
                    None => Ok(()),
                };
                sender.send(result).is_ok()
            }
            None => {
                warn!("Camera answer for unknown request {request_id}");
                false
            }
        }
    }

    fn pending_acks(&self) -> std::sync::MutexGuard<'_, PendingAcks> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait::async_trait]
impl CameraHost for WebviewCameraHost {
    async fn acquire(
        &self,
        slot: DeviceSlot,
        constraints: &CameraConstraints,
    ) -> Result<(), DeviceError> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending_acks().insert(request_id, reply_tx);

        let payload = CameraAcquireEvent {
            request_id,
            slot,
            constraints,
        };
        if let Err(err) = self.app_handle.emit(CAMERA_ACQUIRE_EVENT, payload) {
            self.pending_acks().remove(&request_id);
            return Err(DeviceError::Unavailable(format!(
                "failed to reach webview: {err}"
            )));
        }

        let timeout_ms = self.settings.capture().device_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(DeviceError::HostClosed),
            Err(_) => {
                self.pending_acks().remove(&request_id);
                Err(DeviceError::Timeout(timeout_ms))
            }
        }
    }

    async fn release(&self, slot: DeviceSlot) {
        if let Err(err) = self
            .app_handle
            .emit(CAMERA_RELEASE_EVENT, CameraReleaseEvent { slot })
        {
            warn!("failed to emit {CAMERA_RELEASE_EVENT}: {err}");
        }
    }
}
