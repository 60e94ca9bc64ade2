use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use scanbridge_core::scanning::scan_state::ScanConfig;
use scanbridge_core::shared::constants::APP_DIR_NAME;

const MAX_TARGET_FPS: f64 = 240.0;
const MAX_TIMEOUT_MS: u64 = 10 * 60 * 1000;

/// Persistent scan defaults, overridden per run by command-line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scan: ScanConfig,
    /// Engine resource: local path, cached file name or URL. When unset a
    /// built-in scripted engine is used.
    pub engine_location: Option<String>,
    pub license_key: String,
    pub user_id: Option<String>,
    /// Log a progress line every N ticks.
    pub log_every_ticks: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            engine_location: None,
            license_key: "development".into(),
            user_id: None,
            log_every_ticks: 30,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join("settings.json"))
    }

    /// Loads the settings file at the default location, falling back to
    /// defaults when it is missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path).unwrap_or_else(|e| {
            log::warn!("Ignoring settings at {}: {e}", path.display());
            Self::default()
        })
    }

    /// Loads `path`; a missing file yields defaults, a malformed one fails.
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        let fps = self.scan.target_fps;
        if !(fps > 0.0 && fps <= MAX_TARGET_FPS) {
            return Err(format!(
                "Target FPS must be greater than 0 and at most {MAX_TARGET_FPS}, got {fps}"
            )
            .into());
        }
        if !(1..=MAX_TIMEOUT_MS).contains(&self.scan.timeout_ms) {
            return Err(format!(
                "Timeout must be between 1 and {MAX_TIMEOUT_MS} ms, got {}",
                self.scan.timeout_ms
            )
            .into());
        }
        if self.log_every_ticks == 0 {
            return Err("Log interval must be at least 1 tick".into());
        }
        if self.license_key.trim().is_empty() {
            return Err("License key must not be empty".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanbridge_core::scanning::scan_state::RecognitionMode;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = Settings::default();
        settings.scan.mode = RecognitionMode::DetectionTest;
        settings.engine_location = Some("https://example.com/engine.script".into());

        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"scan": {"target_fps": 15.0}, "user_id": "kiosk-7"}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();

        assert_eq!(settings.scan.target_fps, 15.0);
        assert_eq!(settings.scan.timeout_ms, ScanConfig::default().timeout_ms);
        assert_eq!(settings.user_id.as_deref(), Some("kiosk-7"));
        assert_eq!(settings.license_key, "development");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        assert!(Settings::default().validate().is_ok());

        let mut settings = Settings::default();
        settings.scan.target_fps = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.scan.target_fps = f64::NAN;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.scan.timeout_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.license_key = "  ".into();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.log_every_ticks = 0;
        assert!(settings.validate().is_err());
    }
}
