use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::shared::frame::CapturedFrame;

/// Coarse class of a capture failure, for picking a user-facing recovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaptureErrorKind {
    PermissionDenied,
    DeviceInUse,
    NoDevice,
    Unsupported,
    Ended,
    Decode,
    Io,
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("camera is in use by another application")]
    DeviceInUse,
    #[error("no camera device found: {0}")]
    NoDevice(String),
    #[error("media capture is not supported: {0}")]
    Unsupported(String),
    #[error("frame source ended")]
    Ended,
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CaptureError {
    pub fn kind(&self) -> CaptureErrorKind {
        match self {
            CaptureError::PermissionDenied => CaptureErrorKind::PermissionDenied,
            CaptureError::DeviceInUse => CaptureErrorKind::DeviceInUse,
            CaptureError::NoDevice(_) => CaptureErrorKind::NoDevice,
            CaptureError::Unsupported(_) => CaptureErrorKind::Unsupported,
            CaptureError::Ended => CaptureErrorKind::Ended,
            CaptureError::Decode { .. } => CaptureErrorKind::Decode,
            CaptureError::Io { .. } => CaptureErrorKind::Io,
        }
    }
}

/// A live source of frames, already bound and running.
///
/// Pixel capture itself is the implementation's business; the pump only asks
/// for "a frame now".
pub trait FrameSource: Send {
    /// Blocks until a new frame is ready or `max_wait` elapses. Returns
    /// whether a frame is ready. Sources without a readiness signal report
    /// ready immediately and leave pacing to the throttle.
    fn wait_frame_ready(&mut self, max_wait: Duration) -> bool {
        let _ = max_wait;
        true
    }

    fn acquire(&mut self) -> Result<CapturedFrame, CaptureError>;

    /// Whether frames are horizontally mirrored (front-facing camera).
    fn is_mirrored(&self) -> bool;

    /// Stops capture and releases the device.
    fn close(&mut self) {}
}
