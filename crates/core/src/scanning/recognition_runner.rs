use crate::protocol::domain::result_state::ResultState;
use crate::proxy::proxy_error::ProxyError;
use crate::shared::frame::CapturedFrame;

/// The runner operations the frame pump needs.
///
/// Implemented by the remote runner proxy; tests substitute scripted stubs.
/// Every call is a suspension point: it returns once the engine answered.
pub trait RecognitionRunner: Send + Sync {
    fn process_image(&self, frame: CapturedFrame) -> Result<ResultState, ProxyError>;

    fn reset(&self, hard_reset: bool) -> Result<(), ProxyError>;

    fn set_detection_only(&self, detection_only: bool) -> Result<(), ProxyError>;

    fn set_camera_preview_mirrored(&self, mirrored: bool) -> Result<(), ProxyError>;
}
