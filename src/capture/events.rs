//! Payloads pushed to the webview and the sink trait that delivers them.

use serde::Serialize;
use tauri::{AppHandle, Emitter};

use crate::records::RecordTable;

use super::state::{CapturePhase, CaptureSession, CaptureStep, DeviceSlot};

pub const STATE_CHANGED_EVENT: &str = "capture-state-changed";
pub const NOTICE_EVENT: &str = "capture-notice";
pub const RECORDS_CHANGED_EVENT: &str = "records-changed";

/// What the UI needs to render both steps.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSnapshot {
    pub cycle_id: String,
    pub phase: CapturePhase,
    pub step: CaptureStep,
    pub active_device: Option<DeviceSlot>,
    pub student_id: Option<String>,
    pub mark: Option<String>,
    pub detecting: Option<DeviceSlot>,
    pub barcode_capture_enabled: bool,
    pub mark_capture_enabled: bool,
    pub mark_step_enabled: bool,
    pub can_save: bool,
}

impl From<&CaptureSession> for CaptureSnapshot {
    fn from(session: &CaptureSession) -> Self {
        Self {
            cycle_id: session.cycle_id.clone(),
            phase: session.phase,
            step: session.phase.step(),
            active_device: session.active_device,
            student_id: session.pending_student_id.clone(),
            mark: session.pending_mark.clone(),
            detecting: session.in_flight,
            barcode_capture_enabled: session.capture_enabled(DeviceSlot::Barcode),
            mark_capture_enabled: session.capture_enabled(DeviceSlot::Mark),
            mark_step_enabled: session.phase.step() == CaptureStep::Mark,
            can_save: session.pending_student_id.is_some() && session.pending_mark.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    Detected,
    DetectionMiss,
    DetectionFailed,
    DeviceError,
    ValidationError,
    StorageError,
    Saved,
}

/// Transient message for the status bar.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureNotice {
    pub level: NoticeLevel,
    pub kind: NoticeKind,
    pub step: Option<CaptureStep>,
    pub message: String,
    /// Extra text from the detector, e.g. the service's own explanation.
    pub detail: Option<String>,
    /// Form field a validation failure refers to.
    pub field: Option<&'static str>,
}

impl CaptureNotice {
    pub fn new(level: NoticeLevel, kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            level,
            kind,
            step: None,
            message: message.into(),
            detail: None,
            field: None,
        }
    }

    pub fn for_step(mut self, step: CaptureStep) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_detail(mut self, detail: Option<String>) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_field(mut self, field: &'static str) -> Self {
        self.field = Some(field);
        self
    }
}

/// Where the controller reports state, notices and record changes. The
/// running app emits Tauri events; tests record them.
pub trait CaptureEvents: Send + Sync {
    fn state_changed(&self, snapshot: &CaptureSnapshot);

    fn notice(&self, notice: &CaptureNotice);

    fn records_changed(&self, table: &RecordTable);
}

impl CaptureEvents for AppHandle {
    fn state_changed(&self, snapshot: &CaptureSnapshot) {
        if let Err(err) = self.emit(STATE_CHANGED_EVENT, snapshot) {
            log::warn!("failed to emit {STATE_CHANGED_EVENT}: {err}");
        }
    }

    fn notice(&self, notice: &CaptureNotice) {
        if let Err(err) = self.emit(NOTICE_EVENT, notice) {
            log::warn!("failed to emit {NOTICE_EVENT}: {err}");
        }
    }

    fn records_changed(&self, table: &RecordTable) {
        if let Err(err) = self.emit(RECORDS_CHANGED_EVENT, table) {
            log::warn!("failed to emit {RECORDS_CHANGED_EVENT}: {err}");
        }
    }
}
