mod capture;
mod db;
mod detection;
mod records;
mod settings;
mod utils;

use std::sync::Arc;

use capture::{
    commands::{
        camera_ready, capture_barcode, capture_mark, continue_to_marks, get_capture_state,
        rescan_barcode, rescan_mark, reset_capture, save_entry, set_manual_mark, start_capture,
    },
    CaptureController, WebviewCameraHost,
};
use db::Database;
use detection::{HttpMarkRecognizer, RxingDecoder};
use log::{info, warn};
use records::{
    commands::{export_csv, get_record_table, list_entries},
    RecordStore,
};
use settings::{CaptureSettings, SettingsStore};
use tauri::{Manager, State};

pub(crate) struct AppState {
    pub(crate) records: RecordStore,
    pub(crate) capture: CaptureController,
    pub(crate) camera: WebviewCameraHost,
    recognizer: Arc<HttpMarkRecognizer>,
    settings: Arc<SettingsStore>,
}

#[tauri::command]
fn get_settings(state: State<AppState>) -> Result<CaptureSettings, String> {
    Ok(state.settings.capture())
}

#[tauri::command]
fn update_settings(settings: CaptureSettings, state: State<AppState>) -> Result<(), String> {
    state
        .settings
        .update_capture(settings)
        .map_err(|e| e.to_string())?;

    let effective = state.settings.capture();
    state.recognizer.set_endpoint(effective.mark_endpoint);
    state.recognizer.set_verbose(effective.verbose_diagnostics);

    info!("Capture settings updated");
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("markscan starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let db_path = app_data_dir.join("markscan.sqlite3");
                let database = Database::new(db_path)?;
                info!("Saved entries live in {}", database.path().display());
                let records = tauri::async_runtime::block_on(RecordStore::load(Arc::new(database)));

                let settings_path = app_data_dir.join("settings.json");
                let settings = Arc::new(SettingsStore::new(settings_path)?);
                let capture_settings = settings.capture();
                if capture_settings.mark_endpoint.is_empty() {
                    warn!("No mark service endpoint configured, set {}", settings::ENDPOINT_ENV);
                }

                let recognizer = Arc::new(HttpMarkRecognizer::new(
                    capture_settings.mark_endpoint.clone(),
                    capture_settings.verbose_diagnostics,
                )?);
                let camera = WebviewCameraHost::new(app.handle().clone(), settings.clone());

                let capture = CaptureController::new(
                    Arc::new(camera.clone()),
                    Arc::new(RxingDecoder::new()),
                    recognizer.clone(),
                    records.clone(),
                    settings.clone(),
                    Arc::new(app.handle().clone()),
                );

                app.manage(AppState {
                    records,
                    capture,
                    camera,
                    recognizer,
                    settings,
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            start_capture,
            get_capture_state,
            capture_barcode,
            capture_mark,
            continue_to_marks,
            rescan_barcode,
            rescan_mark,
            set_manual_mark,
            save_entry,
            reset_capture,
            camera_ready,
            list_entries,
            get_record_table,
            export_csv,
            get_settings,
            update_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
