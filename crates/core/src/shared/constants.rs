/// Frame rate the pump aims for when no explicit rate is configured.
pub const DEFAULT_TARGET_FPS: f64 = 30.0;

/// Lowest frame rate the throttle accepts; smaller values are clamped.
pub const MIN_TARGET_FPS: f64 = 1.0;

/// How long the engine may keep reporting `Uncertain` before the scan ends.
pub const DEFAULT_RECOGNITION_TIMEOUT_MS: u64 = 20_000;

/// Name of the worker thread hosting the engine.
pub const WORKER_THREAD_NAME: &str = "scanbridge-worker";

/// Name of the control-side thread demultiplexing worker traffic.
pub const DEMUX_THREAD_NAME: &str = "scanbridge-demux";

/// Name of the frame pump thread.
pub const PUMP_THREAD_NAME: &str = "scanbridge-pump";

/// Directory name used under the platform cache/config directories.
pub const APP_DIR_NAME: &str = "ScanBridge";

/// Class name the scripted engine accepts for recognizer objects.
pub const SCRIPTED_RECOGNIZER_CLASS: &str = "ScriptedRecognizer";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
