use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::protocol::domain::result_state::ResultState;
use crate::shared::frame::CapturedFrame;
use crate::shared::value::Value;
use crate::worker::domain::runner_callbacks::RunnerCallbacks;

/// Failure raised by the native engine while constructing, invoking or
/// processing. Turned into an `engine_failure` response at the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Engine object shared between the handle table and a runner.
pub type SharedObject = Arc<Mutex<Box<dyn EngineObject>>>;

pub fn share(object: Box<dyn EngineObject>) -> SharedObject {
    Arc::new(Mutex::new(object))
}

pub fn lock_object(object: &SharedObject) -> MutexGuard<'_, Box<dyn EngineObject>> {
    object.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Argument after the worker resolved remote references.
pub enum Argument {
    Plain(Value),
    Object(SharedObject),
}

impl Argument {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Argument::Plain(v) => Some(v),
            Argument::Object(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Argument::Plain(v) => Some(v),
            Argument::Object(_) => None,
        }
    }
}

/// A loaded engine module.
pub trait RecognitionEngine: Send {
    /// Calls a free function exported by the module.
    fn invoke_function(&mut self, name: &str, args: Vec<Argument>) -> Result<Value, EngineError>;

    fn create_object(
        &mut self,
        class_name: &str,
        args: Vec<Argument>,
    ) -> Result<Box<dyn EngineObject>, EngineError>;

    fn create_runner(
        &mut self,
        recognizers: Vec<SharedObject>,
        allow_multiple_results: bool,
    ) -> Result<Box<dyn EngineRunner>, EngineError>;
}

/// An engine-side object addressable through a handle.
pub trait EngineObject: Send {
    fn class_name(&self) -> &str;

    /// Methods this object accepts through generic invocation.
    fn methods(&self) -> &[&'static str];

    /// `args` never contain this object itself.
    fn invoke(&mut self, method: &str, args: Vec<Argument>) -> Result<Value, EngineError>;

    /// Releases native resources. Called exactly once, on explicit deletion.
    fn delete(&mut self) {}
}

/// The engine's frame-processing orchestrator over a set of recognizers.
pub trait EngineRunner: Send {
    fn process_image(&mut self, frame: CapturedFrame) -> Result<ResultState, EngineError>;

    fn reconfigure(
        &mut self,
        recognizers: Vec<SharedObject>,
        allow_multiple_results: bool,
    ) -> Result<(), EngineError>;

    fn reset(&mut self, hard_reset: bool) -> Result<(), EngineError>;

    fn set_detection_only(&mut self, detection_only: bool);

    fn set_camera_preview_mirrored(&mut self, mirrored: bool);

    /// Replaces the callback set the runner reports engine events through.
    fn set_callbacks(&mut self, callbacks: RunnerCallbacks);

    fn delete(&mut self) {}
}
