use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// Overrides the configured mark service endpoint when set.
pub const ENDPOINT_ENV: &str = "MARKSCAN_ENDPOINT";
/// Enables verbose diagnostics when set to `1` or `true`.
pub const DEBUG_ENV: &str = "MARKSCAN_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CameraConstraints {
    pub facing_mode: String,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing_mode: "environment".into(),
            ideal_width: 1920,
            ideal_height: 1080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureSettings {
    pub mark_endpoint: String,
    /// Delay between a detected barcode and switching to the mark step.
    pub auto_advance_ms: u64,
    /// How long to wait for the webview to confirm a camera start.
    pub device_timeout_ms: u64,
    pub camera: CameraConstraints,
    pub verbose_diagnostics: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            mark_endpoint: String::new(),
            auto_advance_ms: 1500,
            device_timeout_ms: 15_000,
            camera: CameraConstraints::default(),
            verbose_diagnostics: false,
        }
    }
}

/// Values taken from the environment at startup. They shadow the settings
/// file for the life of the process and are never written back to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    pub mark_endpoint: Option<String>,
    pub verbose_diagnostics: bool,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let mark_endpoint = std::env::var(ENDPOINT_ENV)
            .ok()
            .map(|endpoint| endpoint.trim().to_string())
            .filter(|endpoint| !endpoint.is_empty());
        let verbose_diagnostics = std::env::var(DEBUG_ENV)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            mark_endpoint,
            verbose_diagnostics,
        }
    }

    fn apply(&self, settings: &mut CaptureSettings) {
        if let Some(endpoint) = &self.mark_endpoint {
            settings.mark_endpoint = endpoint.clone();
        }
        if self.verbose_diagnostics {
            settings.verbose_diagnostics = true;
        }
    }

    /// Undo `apply` on an incoming update so the stored values survive.
    fn restore(&self, incoming: &mut CaptureSettings, stored: &CaptureSettings) {
        if self.mark_endpoint.is_some() {
            incoming.mark_endpoint = stored.mark_endpoint.clone();
        }
        if self.verbose_diagnostics {
            incoming.verbose_diagnostics = stored.verbose_diagnostics;
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    /// Exactly what is on disk.
    data: RwLock<CaptureSettings>,
    overrides: EnvOverrides,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        Self::with_overrides(path, EnvOverrides::from_env())
    }

    pub fn with_overrides(path: PathBuf, overrides: EnvOverrides) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            CaptureSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            overrides,
        })
    }

    /// Effective settings: the stored file with environment overrides on top.
    pub fn capture(&self) -> CaptureSettings {
        let mut settings = match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        self.overrides.apply(&mut settings);
        settings
    }

    pub fn update_capture(&self, mut settings: CaptureSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        self.overrides.restore(&mut settings, &guard);
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    fn persist(&self, data: &CaptureSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::with_overrides(path, EnvOverrides::default()).unwrap();
        let settings = store.capture();
        assert_eq!(settings.auto_advance_ms, 1500);
        assert_eq!(settings.camera.facing_mode, "environment");
        assert_eq!(settings.camera.ideal_width, 1920);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        let store = SettingsStore::with_overrides(path, EnvOverrides::default()).unwrap();
        assert_eq!(store.capture().device_timeout_ms, 15_000);
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "autoAdvanceMs": 250 }"#).unwrap();
        let store = SettingsStore::with_overrides(path, EnvOverrides::default()).unwrap();
        let settings = store.capture();
        assert_eq!(settings.auto_advance_ms, 250);
        assert_eq!(settings.camera, CameraConstraints::default());
    }

    #[test]
    fn updates_persist_across_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::with_overrides(path.clone(), EnvOverrides::default()).unwrap();

        let mut settings = store.capture();
        settings.mark_endpoint = "https://marks.example.test/detect".into();
        settings.auto_advance_ms = 900;
        store.update_capture(settings.clone()).unwrap();
        assert_eq!(store.capture(), settings);

        let reloaded = SettingsStore::with_overrides(path, EnvOverrides::default()).unwrap();
        assert_eq!(reloaded.capture().auto_advance_ms, 900);
    }

    #[test]
    fn env_overrides_are_not_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let overrides = EnvOverrides {
            mark_endpoint: Some("http://override.test/detect".into()),
            verbose_diagnostics: true,
        };
        let store = SettingsStore::with_overrides(path.clone(), overrides).unwrap();

        let mut settings = store.capture();
        assert_eq!(settings.mark_endpoint, "http://override.test/detect");
        assert!(settings.verbose_diagnostics);

        settings.auto_advance_ms = 700;
        store.update_capture(settings).unwrap();

        let on_disk: CaptureSettings =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.mark_endpoint, "");
        assert!(!on_disk.verbose_diagnostics);
        assert_eq!(on_disk.auto_advance_ms, 700);

        let effective = store.capture();
        assert_eq!(effective.mark_endpoint, "http://override.test/detect");
        assert_eq!(effective.auto_advance_ms, 700);
    }
}
