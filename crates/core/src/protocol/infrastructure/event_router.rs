use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::protocol::domain::event::{CallbackFlags, Point, Quad, WorkerEvent};

type Handler<T> = Option<Box<dyn Fn(T) + Send + Sync>>;
type Notify = Option<Box<dyn Fn() + Send + Sync>>;

/// Control-side handlers for engine metadata events.
///
/// Only the handlers that are set are announced to the worker (see
/// [`MetadataCallbacks::flags`]), so unsubscribed events never cross over.
///
/// Handlers run on the demultiplexer thread and must not block on a proxy
/// call: the response could only be delivered by that same thread, so such
/// calls fail with `ProxyError::CalledFromEventHandler`. Hand work off to
/// another thread or flip a flag instead.
#[derive(Default)]
pub struct MetadataCallbacks {
    pub on_debug_text: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub on_detection_failed: Notify,
    pub on_quad_detected: Handler<Quad>,
    pub on_points_detected: Option<Box<dyn Fn(&[Point]) + Send + Sync>>,
    pub on_first_side_result: Notify,
    pub on_glare_detected: Handler<bool>,
}

impl MetadataCallbacks {
    pub fn flags(&self) -> CallbackFlags {
        CallbackFlags {
            debug_text: self.on_debug_text.is_some(),
            detection_failed: self.on_detection_failed.is_some(),
            quad_detected: self.on_quad_detected.is_some(),
            points_detected: self.on_points_detected.is_some(),
            first_side_result: self.on_first_side_result.is_some(),
            glare_detected: self.on_glare_detected.is_some(),
        }
    }

    fn dispatch(&self, event: WorkerEvent) -> bool {
        match event {
            WorkerEvent::DebugText(text) => self.on_debug_text.as_ref().map(|cb| cb(&text)).is_some(),
            WorkerEvent::DetectionFailed => {
                self.on_detection_failed.as_ref().map(|cb| cb()).is_some()
            }
            WorkerEvent::QuadDetected(quad) => {
                self.on_quad_detected.as_ref().map(|cb| cb(quad)).is_some()
            }
            WorkerEvent::PointsDetected(points) => self
                .on_points_detected
                .as_ref()
                .map(|cb| cb(&points))
                .is_some(),
            WorkerEvent::FirstSideResult => {
                self.on_first_side_result.as_ref().map(|cb| cb()).is_some()
            }
            WorkerEvent::GlareDetected(glare) => {
                self.on_glare_detected.as_ref().map(|cb| cb(glare)).is_some()
            }
            WorkerEvent::LoadProgress(_) | WorkerEvent::ClearTimeout => false,
        }
    }
}

pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;
pub type ClearTimeoutFn = Arc<dyn Fn() + Send + Sync>;

/// Demultiplexes worker events to whichever handlers are installed.
///
/// Handlers run on the connection's demultiplexer thread, outside of any
/// router lock, so they may call back into the router. They must not make
/// blocking proxy calls; see [`MetadataCallbacks`].
#[derive(Default)]
pub struct EventRouter {
    metadata: Mutex<Arc<MetadataCallbacks>>,
    clear_timeout: Mutex<Option<ClearTimeoutFn>>,
    load_progress: Mutex<Option<ProgressFn>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_metadata_callbacks(&self, callbacks: MetadataCallbacks) {
        *lock(&self.metadata) = Arc::new(callbacks);
    }

    pub fn set_clear_timeout(&self, callback: Option<ClearTimeoutFn>) {
        *lock(&self.clear_timeout) = callback;
    }

    pub fn set_load_progress(&self, callback: Option<ProgressFn>) {
        *lock(&self.load_progress) = callback;
    }

    /// Routes one event. Returns `false` if no handler was installed for it.
    pub fn dispatch(&self, event: WorkerEvent) -> bool {
        match event {
            WorkerEvent::LoadProgress(pct) => {
                let handler = lock(&self.load_progress).clone();
                handler.map(|h| h(pct.min(100))).is_some()
            }
            WorkerEvent::ClearTimeout => {
                let handler = lock(&self.clear_timeout).clone();
                handler.map(|h| h()).is_some()
            }
            other => {
                let callbacks = lock(&self.metadata).clone();
                callbacks.dispatch(other)
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
