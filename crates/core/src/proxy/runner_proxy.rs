use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::protocol::domain::envelope::{Payload, RequestKind};
use crate::protocol::domain::result_state::ResultState;
use crate::protocol::infrastructure::connection::WorkerConnection;
use crate::protocol::infrastructure::event_router::{ClearTimeoutFn, MetadataCallbacks};
use crate::proxy::payload::{into_result_state, into_unit};
use crate::proxy::proxy_error::ProxyError;
use crate::proxy::recognizer_proxy::RecognizerProxy;
use crate::scanning::recognition_runner::RecognitionRunner;
use crate::shared::frame::CapturedFrame;

const RUNNER_CLASS: &str = "RecognitionRunner";

/// Control-side mirror of the worker's runner singleton.
///
/// Methods take `&self` so the proxy can be shared with the frame pump.
pub struct RunnerProxy {
    connection: Arc<WorkerConnection>,
    deleted: AtomicBool,
}

impl RunnerProxy {
    pub(crate) fn new(connection: Arc<WorkerConnection>) -> Self {
        Self {
            connection,
            deleted: AtomicBool::new(false),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    fn call(&self, kind: RequestKind) -> Result<Payload, ProxyError> {
        if self.is_deleted() {
            return Err(ProxyError::Deleted {
                class_name: RUNNER_CLASS.into(),
            });
        }
        self.connection.call(kind)
    }

    /// Submits one frame; its pixel buffer moves to the worker.
    pub fn process_image(&self, frame: CapturedFrame) -> Result<ResultState, ProxyError> {
        into_result_state(self.call(RequestKind::ProcessImage { frame })?)
    }

    pub fn reconfigure(
        &self,
        recognizers: &[&RecognizerProxy],
        allow_multiple_results: bool,
    ) -> Result<(), ProxyError> {
        let handles = recognizers
            .iter()
            .map(|r| r.handle())
            .collect::<Result<Vec<_>, _>>()?;
        into_unit(self.call(RequestKind::ReconfigureRunner {
            handles,
            allow_multiple_results,
        })?)
    }

    pub fn reset(&self, hard_reset: bool) -> Result<(), ProxyError> {
        into_unit(self.call(RequestKind::ResetRecognizers { hard_reset })?)
    }

    pub fn set_detection_only(&self, detection_only: bool) -> Result<(), ProxyError> {
        into_unit(self.call(RequestKind::SetDetectionOnly(detection_only))?)
    }

    pub fn set_camera_preview_mirrored(&self, mirrored: bool) -> Result<(), ProxyError> {
        into_unit(self.call(RequestKind::SetCameraPreviewMirrored(mirrored))?)
    }

    /// Replaces the metadata handlers. Only kinds with a handler are
    /// subscribed on the worker.
    pub fn set_metadata_callbacks(&self, callbacks: MetadataCallbacks) -> Result<(), ProxyError> {
        into_unit(self.call(RequestKind::RegisterMetadataCallbacks(callbacks.flags()))?)?;
        self.connection.events().set_metadata_callbacks(callbacks);
        Ok(())
    }

    pub fn set_clear_timeout_callback(
        &self,
        callback: Option<ClearTimeoutFn>,
    ) -> Result<(), ProxyError> {
        into_unit(self.call(RequestKind::SetClearTimeoutCallback(callback.is_some()))?)?;
        self.connection.events().set_clear_timeout(callback);
        Ok(())
    }

    /// Destroys the worker's runner, making room for a new one.
    pub fn delete(&self) -> Result<(), ProxyError> {
        if self.deleted.swap(true, Ordering::SeqCst) {
            return Err(ProxyError::Deleted {
                class_name: RUNNER_CLASS.into(),
            });
        }
        let events = self.connection.events();
        events.set_metadata_callbacks(MetadataCallbacks::default());
        events.set_clear_timeout(None);
        into_unit(self.connection.call(RequestKind::DeleteRunner)?)
    }
}

impl RecognitionRunner for RunnerProxy {
    fn process_image(&self, frame: CapturedFrame) -> Result<ResultState, ProxyError> {
        RunnerProxy::process_image(self, frame)
    }

    fn reset(&self, hard_reset: bool) -> Result<(), ProxyError> {
        RunnerProxy::reset(self, hard_reset)
    }

    fn set_detection_only(&self, detection_only: bool) -> Result<(), ProxyError> {
        RunnerProxy::set_detection_only(self, detection_only)
    }

    fn set_camera_preview_mirrored(&self, mirrored: bool) -> Result<(), ProxyError> {
        RunnerProxy::set_camera_preview_mirrored(self, mirrored)
    }
}
