use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::domain::frame_source::CaptureError;
use crate::proxy::proxy_error::ProxyError;
use crate::shared::constants::{DEFAULT_RECOGNITION_TIMEOUT_MS, DEFAULT_TARGET_FPS};

/// What the pump does with each result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// Regular scanning: finish on `Valid` or on `Uncertain` timeout.
    #[default]
    Recognition,
    /// Endless loop with a hard reset after every frame.
    RecognitionTest,
    /// Like `RecognitionTest`, with the runner in detection-only mode.
    DetectionTest,
}

impl RecognitionMode {
    pub fn is_test(self) -> bool {
        !matches!(self, RecognitionMode::Recognition)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Paused,
    Cancelling,
}

/// Why a scan ended without a result.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("frame capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("recognition request failed: {0}")]
    Remote(#[from] ProxyError),
    #[error("a scan is already running")]
    AlreadyRunning,
    #[error("the frame source has been released")]
    Released,
    #[error("failed to start frame pump thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Tunables of one video recognizer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub target_fps: f64,
    /// How long `Uncertain` may persist before the scan ends with it.
    pub timeout_ms: u64,
    pub mode: RecognitionMode,
}

impl ScanConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            timeout_ms: DEFAULT_RECOGNITION_TIMEOUT_MS,
            mode: RecognitionMode::Recognition,
        }
    }
}
