use chrono::Utc;
use log::info;
use tauri::{Manager, State};

use crate::{
    records::{export::write_export, Entry, RecordTable},
    AppState,
};

#[tauri::command]
pub async fn list_entries(state: State<'_, AppState>) -> Result<Vec<Entry>, String> {
    Ok(state.records.entries().await)
}

#[tauri::command]
pub async fn get_record_table(state: State<'_, AppState>) -> Result<RecordTable, String> {
    let entries = state.records.entries().await;
    Ok(RecordTable::from_entries(&entries))
}

/// Write every saved entry to `marks-<date>.csv` in the downloads folder and
/// return the file path.
#[tauri::command]
pub async fn export_csv(
    state: State<'_, AppState>,
    app_handle: tauri::AppHandle,
) -> Result<String, String> {
    if state.records.is_empty().await {
        return Err("No data to export".into());
    }

    let csv = state.records.to_csv().await.map_err(|e| e.to_string())?;
    let dir = app_handle
        .path()
        .download_dir()
        .or_else(|_| app_handle.path().app_data_dir())
        .map_err(|e| e.to_string())?;

    let path = write_export(&dir, &csv, Utc::now()).map_err(|e| format!("{e:#}"))?;
    info!("Exported {} entries to {}", state.records.len().await, path.display());
    Ok(path.display().to_string())
}
