use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::records::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CapturePhase {
    AwaitingBarcode,
    BarcodeDetected,
    AwaitingMark,
    MarkDetected,
}

impl Default for CapturePhase {
    fn default() -> Self {
        CapturePhase::AwaitingBarcode
    }
}

impl CapturePhase {
    pub fn step(self) -> CaptureStep {
        match self {
            CapturePhase::AwaitingBarcode | CapturePhase::BarcodeDetected => CaptureStep::Barcode,
            CapturePhase::AwaitingMark | CapturePhase::MarkDetected => CaptureStep::Mark,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureStep {
    Barcode,
    Mark,
}

/// The two capture devices; one per step. At most one is acquired.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum DeviceSlot {
    Barcode,
    Mark,
}

impl DeviceSlot {
    fn capture_phase(self) -> CapturePhase {
        match self {
            DeviceSlot::Barcode => CapturePhase::AwaitingBarcode,
            DeviceSlot::Mark => CapturePhase::AwaitingMark,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot {action} while {phase:?}")]
    InvalidPhase {
        action: &'static str,
        phase: CapturePhase,
    },
    #[error("a {0:?} detection is already in progress")]
    Busy(DeviceSlot),
    #[error("the {0:?} camera is not ready yet")]
    DeviceNotReady(DeviceSlot),
    #[error("scan a student barcode first")]
    MissingStudentId,
}

/// Requested change of the acquired device. `seq` increases with every switch
/// the session plans; only the latest one may take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSwitch {
    pub seq: u64,
    pub target: Option<DeviceSlot>,
}

/// Issued when a detection starts; its result only applies while the ticket
/// is still current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionTicket {
    pub slot: DeviceSlot,
    pub generation: u64,
}

/// Ephemeral state of one two-step capture cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub cycle_id: String,
    pub phase: CapturePhase,
    /// Device confirmed as acquired.
    pub active_device: Option<DeviceSlot>,
    /// Device the current phase wants acquired.
    pub target_device: Option<DeviceSlot>,
    pub pending_student_id: Option<String>,
    /// Kept as text until save so the operator can override it.
    pub pending_mark: Option<String>,
    pub in_flight: Option<DeviceSlot>,
    pub generation: u64,
    /// Sequence number of the most recently planned device switch.
    pub switch_seq: u64,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self {
            cycle_id: Uuid::new_v4().to_string(),
            phase: CapturePhase::AwaitingBarcode,
            active_device: None,
            target_device: None,
            pending_student_id: None,
            pending_mark: None,
            in_flight: None,
            generation: 0,
            switch_seq: 0,
        }
    }
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the barcode camera for the first cycle.
    pub fn start(&mut self) -> Option<DeviceSwitch> {
        self.retarget(self.phase_device())
    }

    pub fn begin_capture(&mut self, slot: DeviceSlot) -> Result<DetectionTicket, TransitionError> {
        if self.phase != slot.capture_phase() {
            return Err(TransitionError::InvalidPhase {
                action: "capture",
                phase: self.phase,
            });
        }
        if let Some(busy) = self.in_flight {
            return Err(TransitionError::Busy(busy));
        }
        if self.active_device != Some(slot) {
            return Err(TransitionError::DeviceNotReady(slot));
        }

        self.in_flight = Some(slot);
        Ok(DetectionTicket {
            slot,
            generation: self.generation,
        })
    }

    /// Clear the in-flight marker for `ticket`. Returns false when the session
    /// has moved on and the result must be dropped.
    pub fn finish_detection(&mut self, ticket: &DetectionTicket) -> bool {
        if self.generation != ticket.generation || self.in_flight != Some(ticket.slot) {
            return false;
        }
        self.in_flight = None;
        true
    }

    /// Record a decoded identifier. Returns the generation the auto-advance
    /// must be tagged with.
    pub fn accept_student_id(&mut self, student_id: String) -> u64 {
        self.pending_student_id = Some(student_id);
        self.transition_to(CapturePhase::BarcodeDetected);
        self.generation
    }

    pub fn accept_mark(&mut self, mark: String) {
        self.pending_mark = Some(mark);
        self.transition_to(CapturePhase::MarkDetected);
    }

    /// Move from the barcode step to the mark step. The mark camera is only
    /// started when no mark has been captured yet.
    pub fn advance(&mut self) -> Result<Option<DeviceSwitch>, TransitionError> {
        if self.phase != CapturePhase::BarcodeDetected {
            return Err(TransitionError::InvalidPhase {
                action: "advance",
                phase: self.phase,
            });
        }
        if self.pending_student_id.is_none() {
            return Err(TransitionError::MissingStudentId);
        }

        if self.pending_mark.is_some() {
            self.transition_to(CapturePhase::MarkDetected);
            Ok(self.retarget(None))
        } else {
            self.transition_to(CapturePhase::AwaitingMark);
            Ok(self.retarget(Some(DeviceSlot::Mark)))
        }
    }

    /// Discard the identifier only; a captured mark is kept.
    pub fn rescan_barcode(&mut self) -> Option<DeviceSwitch> {
        self.pending_student_id = None;
        self.transition_to(CapturePhase::AwaitingBarcode);
        self.retarget(Some(DeviceSlot::Barcode))
    }

    /// Discard the mark only; the identifier is kept.
    pub fn rescan_mark(&mut self) -> Result<Option<DeviceSwitch>, TransitionError> {
        if self.pending_student_id.is_none() {
            return Err(TransitionError::MissingStudentId);
        }
        self.pending_mark = None;
        self.transition_to(CapturePhase::AwaitingMark);
        Ok(self.retarget(Some(DeviceSlot::Mark)))
    }

    /// Operator-typed mark. Always accepted here; validated at save. Clearing
    /// it on the mark step reopens mark capture.
    pub fn set_manual_mark(&mut self, text: &str) -> Option<DeviceSwitch> {
        let text = text.trim();
        if text.is_empty() {
            self.pending_mark = None;
            if self.phase == CapturePhase::MarkDetected {
                self.transition_to(CapturePhase::AwaitingMark);
                return self.retarget(Some(DeviceSlot::Mark));
            }
            return None;
        }

        self.pending_mark = Some(text.to_string());
        if self.phase == CapturePhase::AwaitingMark {
            self.transition_to(CapturePhase::MarkDetected);
        }
        None
    }

    /// Values needed to save, or the first missing field.
    pub fn pending_for_save(&self) -> Result<(String, String), ValidationError> {
        let student_id = self
            .pending_student_id
            .clone()
            .ok_or(ValidationError::MissingStudentId)?;
        let mark = self
            .pending_mark
            .clone()
            .ok_or(ValidationError::MissingMark)?;
        Ok((student_id, mark))
    }

    /// Start a fresh cycle on the barcode step.
    pub fn reset(&mut self) -> Option<DeviceSwitch> {
        self.cycle_id = Uuid::new_v4().to_string();
        self.pending_student_id = None;
        self.pending_mark = None;
        self.transition_to(CapturePhase::AwaitingBarcode);
        self.retarget(Some(DeviceSlot::Barcode))
    }

    /// Confirm a completed device switch. Returns false if it was superseded.
    pub fn device_acquired(&mut self, switch: &DeviceSwitch) -> bool {
        if self.switch_seq != switch.seq || self.target_device != switch.target {
            return false;
        }
        self.active_device = switch.target;
        true
    }

    pub fn capture_enabled(&self, slot: DeviceSlot) -> bool {
        self.phase == slot.capture_phase()
            && self.in_flight.is_none()
            && self.active_device == Some(slot)
    }

    fn phase_device(&self) -> Option<DeviceSlot> {
        match self.phase.step() {
            CaptureStep::Barcode => Some(DeviceSlot::Barcode),
            CaptureStep::Mark => self.target_device,
        }
    }

    fn transition_to(&mut self, phase: CapturePhase) {
        self.phase = phase;
        self.in_flight = None;
        self.generation = self.generation.wrapping_add(1);
    }

    fn retarget(&mut self, target: Option<DeviceSlot>) -> Option<DeviceSwitch> {
        // An unconfirmed or failed switch leaves the camera state unknown, so
        // always plan a fresh one in that case.
        let settled = self.active_device == self.target_device;
        self.target_device = target;
        if settled && self.active_device == target {
            return None;
        }
        // The previous device is released before anything else is acquired.
        self.active_device = None;
        self.switch_seq += 1;
        Some(DeviceSwitch {
            seq: self.switch_seq,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquire(session: &mut CaptureSession, switch: Option<DeviceSwitch>) {
        let switch = switch.expect("device switch");
        assert!(session.device_acquired(&switch));
    }

    fn session_at_mark_step() -> CaptureSession {
        let mut session = CaptureSession::new();
        let switch = session.start();
        acquire(&mut session, switch);
        let ticket = session.begin_capture(DeviceSlot::Barcode).unwrap();
        assert!(session.finish_detection(&ticket));
        session.accept_student_id("S12345".into());
        let switch = session.advance().unwrap();
        acquire(&mut session, switch);
        session
    }

    #[test]
    fn starts_awaiting_barcode_with_barcode_camera() {
        let mut session = CaptureSession::new();
        assert_eq!(session.phase, CapturePhase::AwaitingBarcode);
        let switch = session.start().unwrap();
        assert_eq!(switch.target, Some(DeviceSlot::Barcode));
        assert!(!session.capture_enabled(DeviceSlot::Barcode));
        assert!(session.device_acquired(&switch));
        assert!(session.capture_enabled(DeviceSlot::Barcode));
    }

    #[test]
    fn capture_requires_acquired_device_and_right_phase() {
        let mut session = CaptureSession::new();
        assert_eq!(
            session.begin_capture(DeviceSlot::Barcode),
            Err(TransitionError::DeviceNotReady(DeviceSlot::Barcode))
        );
        assert!(matches!(
            session.begin_capture(DeviceSlot::Mark),
            Err(TransitionError::InvalidPhase { .. })
        ));

        let switch = session.start();
        acquire(&mut session, switch);
        session.begin_capture(DeviceSlot::Barcode).unwrap();
        assert_eq!(
            session.begin_capture(DeviceSlot::Barcode),
            Err(TransitionError::Busy(DeviceSlot::Barcode))
        );
    }

    #[test]
    fn happy_path_reaches_mark_detected() {
        let mut session = session_at_mark_step();
        assert_eq!(session.phase, CapturePhase::AwaitingMark);
        assert_eq!(session.active_device, Some(DeviceSlot::Mark));

        let ticket = session.begin_capture(DeviceSlot::Mark).unwrap();
        assert!(session.finish_detection(&ticket));
        session.accept_mark("87".into());

        assert_eq!(session.phase, CapturePhase::MarkDetected);
        assert_eq!(
            session.pending_for_save(),
            Ok(("S12345".to_string(), "87".to_string()))
        );
    }

    #[test]
    fn advance_needs_detected_barcode() {
        let mut session = CaptureSession::new();
        assert!(matches!(
            session.advance(),
            Err(TransitionError::InvalidPhase { .. })
        ));
    }

    #[test]
    fn rescan_barcode_keeps_mark() {
        let mut session = session_at_mark_step();
        session.accept_mark("87".into());

        let switch = session.rescan_barcode().unwrap();
        assert_eq!(switch.target, Some(DeviceSlot::Barcode));
        assert_eq!(session.active_device, None);
        assert_eq!(session.phase, CapturePhase::AwaitingBarcode);
        assert_eq!(session.pending_student_id, None);
        assert_eq!(session.pending_mark.as_deref(), Some("87"));

        // With the mark preserved the next advance skips the mark camera.
        assert!(session.device_acquired(&switch));
        session.accept_student_id("S2".into());
        let switch = session.advance().unwrap().unwrap();
        assert_eq!(switch.target, None);
        assert_eq!(session.phase, CapturePhase::MarkDetected);
    }

    #[test]
    fn rescan_mark_keeps_identifier() {
        let mut session = session_at_mark_step();
        session.accept_mark("87".into());

        let switch = session.rescan_mark().unwrap();
        assert_eq!(switch, None, "mark camera already active");
        assert_eq!(session.phase, CapturePhase::AwaitingMark);
        assert_eq!(session.pending_mark, None);
        assert_eq!(session.pending_student_id.as_deref(), Some("S12345"));
    }

    #[test]
    fn rescan_mark_requires_identifier() {
        let mut session = CaptureSession::new();
        assert_eq!(session.rescan_mark(), Err(TransitionError::MissingStudentId));
    }

    #[test]
    fn superseded_detection_is_stale() {
        let mut session = session_at_mark_step();
        let ticket = session.begin_capture(DeviceSlot::Mark).unwrap();
        session.rescan_barcode();

        assert!(!session.finish_detection(&ticket));
        assert_eq!(session.in_flight, None);
    }

    #[test]
    fn superseded_switch_is_not_confirmed() {
        let mut session = CaptureSession::new();
        let first = session.start().unwrap();
        let second = session.reset().unwrap();

        assert!(!session.device_acquired(&first));
        assert_eq!(session.active_device, None);
        assert!(session.device_acquired(&second));
        assert_eq!(session.active_device, Some(DeviceSlot::Barcode));
    }

    #[test]
    fn switches_planned_out_of_order_confirm_only_the_latest() {
        let mut session = CaptureSession::new();
        let switch = session.start();
        acquire(&mut session, switch);
        session.accept_student_id("S1".into());

        let to_mark = session.advance().unwrap().unwrap();
        let to_barcode = session.rescan_barcode().unwrap();
        assert!(to_barcode.seq > to_mark.seq);

        assert!(session.device_acquired(&to_barcode));
        assert!(!session.device_acquired(&to_mark));
        assert_eq!(session.active_device, Some(DeviceSlot::Barcode));
    }

    #[test]
    fn unconfirmed_switch_is_replanned_on_retarget() {
        let mut session = CaptureSession::new();
        let first = session.start().unwrap();
        // Acquisition failed: nothing confirmed, the same target is retried.
        let retry = session.rescan_barcode().unwrap();
        assert_eq!(retry.target, first.target);
        assert!(retry.seq > first.seq);
    }

    #[test]
    fn manual_mark_overrides_and_clears() {
        let mut session = session_at_mark_step();
        session.set_manual_mark(" 95 ");
        assert_eq!(session.phase, CapturePhase::MarkDetected);
        assert_eq!(session.pending_mark.as_deref(), Some("95"));

        session.set_manual_mark("150");
        assert_eq!(session.pending_mark.as_deref(), Some("150"));

        assert_eq!(session.set_manual_mark(""), None);
        assert_eq!(session.phase, CapturePhase::AwaitingMark);
        assert_eq!(session.pending_mark, None);
    }

    #[test]
    fn manual_mark_wins_over_inflight_detection() {
        let mut session = session_at_mark_step();
        let ticket = session.begin_capture(DeviceSlot::Mark).unwrap();
        session.set_manual_mark("60");
        assert!(!session.finish_detection(&ticket));
        assert_eq!(session.pending_mark.as_deref(), Some("60"));
    }

    #[test]
    fn save_requires_both_values() {
        let mut session = CaptureSession::new();
        assert_eq!(
            session.pending_for_save(),
            Err(ValidationError::MissingStudentId)
        );
        session.accept_student_id("S1".into());
        assert_eq!(session.pending_for_save(), Err(ValidationError::MissingMark));
    }

    #[test]
    fn reset_clears_everything_and_starts_new_cycle() {
        let mut session = session_at_mark_step();
        session.accept_mark("87".into());
        let cycle = session.cycle_id.clone();
        let generation = session.generation;

        let switch = session.reset().unwrap();
        assert_eq!(switch.target, Some(DeviceSlot::Barcode));
        assert_eq!(session.phase, CapturePhase::AwaitingBarcode);
        assert_eq!(session.pending_student_id, None);
        assert_eq!(session.pending_mark, None);
        assert_ne!(session.cycle_id, cycle);
        assert!(session.generation > generation);
    }
}
