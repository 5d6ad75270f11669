use std::{sync::Arc, time::Duration};

use log::{error, info, warn};
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    detection::{DetectionError, Frame, IdentifierDecoder, MarkReading, MarkRecognizer},
    records::{Entry, RecordError, RecordStore, RecordTable, ValidationError},
    settings::SettingsStore,
};

use super::{
    camera::{CameraHost, DeviceManager},
    events::{CaptureEvents, CaptureNotice, CaptureSnapshot, NoticeKind, NoticeLevel},
    state::{CaptureSession, CaptureStep, DeviceSlot, DeviceSwitch, TransitionError},
};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("camera frame unavailable: {0}")]
    FrameUnavailable(DetectionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to save entry: {0}")]
    Storage(String),
}

impl From<RecordError> for CaptureError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Validation(err) => CaptureError::Validation(err),
            RecordError::Storage(err) => CaptureError::Storage(format!("{err:#}")),
        }
    }
}

/// Delayed barcode → mark transition, valid only for the generation it was
/// scheduled under.
struct PendingAdvance {
    generation: u64,
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

/// Drives the capture session: every UI action goes through here, runs its
/// transition to completion under the session lock, then performs device
/// switches and detections without holding it.
#[derive(Clone)]
pub struct CaptureController {
    session: Arc<Mutex<CaptureSession>>,
    devices: DeviceManager,
    decoder: Arc<dyn IdentifierDecoder>,
    recognizer: Arc<dyn MarkRecognizer>,
    records: RecordStore,
    settings: Arc<SettingsStore>,
    events: Arc<dyn CaptureEvents>,
    advance: Arc<Mutex<Option<PendingAdvance>>>,
}

impl CaptureController {
    pub fn new(
        camera: Arc<dyn CameraHost>,
        decoder: Arc<dyn IdentifierDecoder>,
        recognizer: Arc<dyn MarkRecognizer>,
        records: RecordStore,
        settings: Arc<SettingsStore>,
        events: Arc<dyn CaptureEvents>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(CaptureSession::new())),
            devices: DeviceManager::new(camera),
            decoder,
            recognizer,
            records,
            settings,
            events,
            advance: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot::from(&*self.session.lock().await)
    }

    /// Acquire the barcode camera once the webview is ready.
    pub async fn start(&self) -> CaptureSnapshot {
        let switch = self.session.lock().await.start();
        info!("Capture started");
        self.emit_state().await;
        self.run_switch(switch).await;
        self.snapshot().await
    }

    pub async fn capture_barcode(&self, image: &str) -> Result<CaptureSnapshot, CaptureError> {
        let frame = Frame::from_data_url(image).map_err(CaptureError::FrameUnavailable)?;
        let ticket = self.session.lock().await.begin_capture(DeviceSlot::Barcode)?;
        self.emit_state().await;

        let decoder = self.decoder.clone();
        let outcome = tokio::task::spawn_blocking(move || decoder.decode(&frame))
            .await
            .map_err(|err| DetectionError::Worker(err.to_string()))
            .and_then(|result| result);

        let (notice, advance_generation) = {
            let mut session = self.session.lock().await;
            if !session.finish_detection(&ticket) {
                info!("Dropping stale barcode result (generation {})", ticket.generation);
                return Ok(CaptureSnapshot::from(&*session));
            }

            match outcome {
                Ok(Some(student_id)) => {
                    info!("Student ID detected: {student_id} (cycle {})", session.cycle_id);
                    let message = format!("Student ID {student_id} detected, switching to mark scanning");
                    let generation = session.accept_student_id(student_id);
                    (
                        CaptureNotice::new(NoticeLevel::Success, NoticeKind::Detected, message),
                        Some(generation),
                    )
                }
                Ok(None) => (
                    CaptureNotice::new(
                        NoticeLevel::Warning,
                        NoticeKind::DetectionMiss,
                        "Barcode not detected. Try again.",
                    ),
                    None,
                ),
                Err(err) => {
                    error!("Barcode detection failed: {err}");
                    (
                        CaptureNotice::new(
                            NoticeLevel::Error,
                            NoticeKind::DetectionFailed,
                            "Error processing barcode",
                        )
                        .with_detail(Some(err.to_string())),
                        None,
                    )
                }
            }
        };

        if let Some(generation) = advance_generation {
            self.schedule_advance(generation).await;
        }

        self.events.notice(&notice.for_step(CaptureStep::Barcode));
        self.emit_state().await;
        Ok(self.snapshot().await)
    }

    pub async fn capture_mark(&self, image: &str) -> Result<CaptureSnapshot, CaptureError> {
        let frame = Frame::from_data_url(image).map_err(CaptureError::FrameUnavailable)?;
        let ticket = self.session.lock().await.begin_capture(DeviceSlot::Mark)?;
        self.emit_state().await;

        let outcome = self.recognizer.recognize(&frame).await;

        let notice = {
            let mut session = self.session.lock().await;
            if !session.finish_detection(&ticket) {
                info!("Dropping stale mark result (generation {})", ticket.generation);
                return Ok(CaptureSnapshot::from(&*session));
            }

            match outcome {
                Ok(MarkReading::Found { value, confidence }) => {
                    info!(
                        "Mark detected: {value} (confidence {confidence:?}, cycle {})",
                        session.cycle_id
                    );
                    let message = format!("Mark {value} detected");
                    session.accept_mark(value);
                    CaptureNotice::new(NoticeLevel::Success, NoticeKind::Detected, message)
                }
                Ok(MarkReading::NotFound { hint }) => CaptureNotice::new(
                    NoticeLevel::Warning,
                    NoticeKind::DetectionMiss,
                    "Mark not detected. Enter it manually or rescan.",
                )
                .with_detail(hint),
                Err(err) => {
                    error!("Mark detection failed: {err}");
                    CaptureNotice::new(
                        NoticeLevel::Error,
                        NoticeKind::DetectionFailed,
                        "Error detecting mark",
                    )
                    .with_detail(Some(err.to_string()))
                }
            }
        };

        self.events.notice(&notice.for_step(CaptureStep::Mark));
        self.emit_state().await;
        Ok(self.snapshot().await)
    }

    /// Skip the remaining auto-advance delay.
    pub async fn continue_to_marks(&self) -> Result<CaptureSnapshot, CaptureError> {
        let switch = self.session.lock().await.advance()?;
        self.cancel_pending_advance().await;
        self.emit_state().await;
        self.run_switch(switch).await;
        Ok(self.snapshot().await)
    }

    pub async fn rescan_barcode(&self) -> CaptureSnapshot {
        let switch = self.session.lock().await.rescan_barcode();
        info!("Rescanning barcode only");
        self.cancel_pending_advance().await;
        self.emit_state().await;
        self.run_switch(switch).await;
        self.snapshot().await
    }

    pub async fn rescan_mark(&self) -> Result<CaptureSnapshot, CaptureError> {
        let switch = self.session.lock().await.rescan_mark()?;
        info!("Rescanning mark only");
        self.cancel_pending_advance().await;
        self.emit_state().await;
        self.run_switch(switch).await;
        Ok(self.snapshot().await)
    }

    pub async fn set_manual_mark(&self, text: &str) -> CaptureSnapshot {
        let switch = self.session.lock().await.set_manual_mark(text);
        self.emit_state().await;
        self.run_switch(switch).await;
        self.snapshot().await
    }

    /// Validate the pending pair, append it to the store and start a new cycle.
    pub async fn save(&self) -> Result<Entry, CaptureError> {
        let result = {
            let mut session = self.session.lock().await;
            match session.pending_for_save() {
                Ok((student_id, mark)) => match self.records.append(&student_id, &mark).await {
                    Ok(entry) => Ok((entry, session.reset())),
                    Err(err) => Err(CaptureError::from(err)),
                },
                Err(err) => Err(CaptureError::from(err)),
            }
        };

        let (entry, switch) = match result {
            Ok(saved) => saved,
            Err(err) => {
                warn!("Save rejected: {err}");
                let notice = match &err {
                    CaptureError::Validation(invalid) => CaptureNotice::new(
                        NoticeLevel::Warning,
                        NoticeKind::ValidationError,
                        err.to_string(),
                    )
                    .with_field(invalid.field()),
                    _ => CaptureNotice::new(
                        NoticeLevel::Error,
                        NoticeKind::StorageError,
                        err.to_string(),
                    ),
                };
                self.events.notice(&notice);
                return Err(err);
            }
        };

        self.cancel_pending_advance().await;
        self.events.notice(&CaptureNotice::new(
            NoticeLevel::Success,
            NoticeKind::Saved,
            format!("Saved: {} - {}", entry.student_id, entry.mark),
        ));
        self.events
            .records_changed(&RecordTable::from_entries(&self.records.entries().await));
        self.emit_state().await;
        self.run_switch(switch).await;

        Ok(entry)
    }

    pub async fn reset(&self) -> CaptureSnapshot {
        let switch = self.session.lock().await.reset();
        info!("Capture session reset");
        self.cancel_pending_advance().await;
        self.emit_state().await;
        self.run_switch(switch).await;
        self.snapshot().await
    }

    async fn schedule_advance(&self, generation: u64) {
        let delay = Duration::from_millis(self.settings.capture().auto_advance_ms);
        let token = CancellationToken::new();
        let token_clone = token.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    controller.advance_if_current(generation).await;
                }
                _ = token_clone.cancelled() => {}
            }
        });

        let mut pending = self.advance.lock().await;
        let next = PendingAdvance {
            generation,
            token,
            _handle: handle,
        };
        if let Some(previous) = pending.replace(next) {
            previous.token.cancel();
        }
    }

    async fn cancel_pending_advance(&self) {
        if let Some(pending) = self.advance.lock().await.take() {
            pending.token.cancel();
        }
    }

    async fn advance_if_current(&self, generation: u64) {
        let switch = {
            let mut session = self.session.lock().await;
            if session.generation != generation {
                info!("Auto-advance superseded (generation {generation})");
                return;
            }
            match session.advance() {
                Ok(switch) => switch,
                Err(err) => {
                    warn!("Auto-advance skipped: {err}");
                    return;
                }
            }
        };

        {
            let mut pending = self.advance.lock().await;
            if pending.as_ref().map(|p| p.generation) == Some(generation) {
                pending.take();
            }
        }
        self.emit_state().await;
        self.run_switch(switch).await;
    }

    async fn run_switch(&self, switch: Option<DeviceSwitch>) {
        let Some(switch) = switch else {
            return;
        };

        let constraints = self.settings.capture().camera;
        let outcome = self.devices.switch_to(&switch, &constraints).await;

        let current = {
            let mut session = self.session.lock().await;
            match &outcome {
                Ok(true) => session.device_acquired(&switch),
                Ok(false) => false,
                Err(_) => session.switch_seq == switch.seq,
            }
        };
        if !current {
            info!(
                "Device switch {} to {:?} superseded",
                switch.seq, switch.target
            );
            return;
        }

        if let Err(err) = outcome {
            error!("Failed to switch camera to {:?}: {err}", switch.target);
            let step = match switch.target {
                Some(DeviceSlot::Mark) => CaptureStep::Mark,
                _ => CaptureStep::Barcode,
            };
            self.events.notice(
                &CaptureNotice::new(
                    NoticeLevel::Error,
                    NoticeKind::DeviceError,
                    "Camera permission required. Allow camera access and try again.",
                )
                .for_step(step)
                .with_detail(Some(err.to_string())),
            );
        }

        self.emit_state().await;
    }

    async fn emit_state(&self) {
        let snapshot = self.snapshot().await;
        self.events.state_changed(&snapshot);
    }
}
