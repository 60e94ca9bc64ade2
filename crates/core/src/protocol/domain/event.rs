use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Detector verdict accompanying a detected quadrilateral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionStatus {
    Failed,
    Success,
    CameraTooHigh,
    CameraTooNear,
    CameraAtAngle,
    Partial,
}

/// Document outline reported while the engine tracks a candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quad {
    pub status: DetectionStatus,
    /// Corners in clockwise order starting at top-left.
    pub corners: [Point; 4],
}

/// Out-of-band notification posted by the worker. Events carry no request id
/// and are never answered.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    /// Engine module loading progress, 0-100.
    LoadProgress(u8),
    DebugText(String),
    DetectionFailed,
    QuadDetected(Quad),
    PointsDetected(Vec<Point>),
    FirstSideResult,
    GlareDetected(bool),
    /// A multi-side recognizer started a new side; the scheduler restarts
    /// its timeout accrual.
    ClearTimeout,
}

impl WorkerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerEvent::LoadProgress(_) => "load_progress",
            WorkerEvent::DebugText(_) => "debug_text",
            WorkerEvent::DetectionFailed => "detection_failed",
            WorkerEvent::QuadDetected(_) => "quad_detected",
            WorkerEvent::PointsDetected(_) => "points_detected",
            WorkerEvent::FirstSideResult => "first_side_result",
            WorkerEvent::GlareDetected(_) => "glare_detected",
            WorkerEvent::ClearTimeout => "clear_timeout",
        }
    }
}

/// Which engine events the control context wants to receive.
///
/// Sent to the worker so that unsubscribed kinds never cross the boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackFlags {
    pub debug_text: bool,
    pub detection_failed: bool,
    pub quad_detected: bool,
    pub points_detected: bool,
    pub first_side_result: bool,
    pub glare_detected: bool,
}

impl CallbackFlags {
    pub fn all() -> Self {
        Self {
            debug_text: true,
            detection_failed: true,
            quad_detected: true,
            points_detected: true,
            first_side_result: true,
            glare_detected: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether a subscribed handler exists for `event`. Load progress and
    /// clear-timeout have their own switches and are never allowed here.
    pub fn allows(&self, event: &WorkerEvent) -> bool {
        match event {
            WorkerEvent::DebugText(_) => self.debug_text,
            WorkerEvent::DetectionFailed => self.detection_failed,
            WorkerEvent::QuadDetected(_) => self.quad_detected,
            WorkerEvent::PointsDetected(_) => self.points_detected,
            WorkerEvent::FirstSideResult => self.first_side_result,
            WorkerEvent::GlareDetected(_) => self.glare_detected,
            WorkerEvent::LoadProgress(_) | WorkerEvent::ClearTimeout => false,
        }
    }
}
