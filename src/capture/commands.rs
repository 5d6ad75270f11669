use tauri::State;

use crate::{
    capture::{CameraFailure, CaptureController, CaptureSnapshot},
    records::Entry,
    AppState,
};

fn controller_from_state(state: &State<'_, AppState>) -> CaptureController {
    state.capture.clone()
}

#[tauri::command]
pub async fn start_capture(state: State<'_, AppState>) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.start().await)
}

#[tauri::command]
pub async fn get_capture_state(state: State<'_, AppState>) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.snapshot().await)
}

/// `image` is a data URL grabbed from the barcode camera's video element.
#[tauri::command]
pub async fn capture_barcode(
    state: State<'_, AppState>,
    image: String,
) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .capture_barcode(&image)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn capture_mark(
    state: State<'_, AppState>,
    image: String,
) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    controller
        .capture_mark(&image)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn continue_to_marks(state: State<'_, AppState>) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.continue_to_marks().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn rescan_barcode(state: State<'_, AppState>) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.rescan_barcode().await)
}

#[tauri::command]
pub async fn rescan_mark(state: State<'_, AppState>) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    controller.rescan_mark().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_manual_mark(
    state: State<'_, AppState>,
    mark: String,
) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.set_manual_mark(&mark).await)
}

#[tauri::command]
pub async fn save_entry(state: State<'_, AppState>) -> Result<Entry, String> {
    let controller = controller_from_state(&state);
    controller.save().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn reset_capture(state: State<'_, AppState>) -> Result<CaptureSnapshot, String> {
    let controller = controller_from_state(&state);
    Ok(controller.reset().await)
}

/// Acknowledgement for a `camera-acquire` request. `error` is set when
/// `getUserMedia` rejected.
#[tauri::command]
pub fn camera_ready(
    state: State<'_, AppState>,
    request_id: u64,
    error: Option<CameraFailure>,
) -> Result<(), String> {
    if state.camera.resolve(request_id, error) {
        Ok(())
    } else {
        Err(format!("no pending camera request {request_id}"))
    }
}
