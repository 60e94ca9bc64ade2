use std::fmt;

use crate::protocol::domain::error::RemoteError;
use crate::protocol::domain::event::{CallbackFlags, WorkerEvent};
use crate::protocol::domain::result_state::ResultState;
use crate::shared::frame::CapturedFrame;
use crate::shared::value::{ObjectHandle, Value};

/// Correlation id of a request; unique for the lifetime of one pairing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parameters of the one-time engine initialization handshake.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InitSettings {
    /// Where the engine module lives: a local path or a URL.
    pub engine_location: String,
    pub license_key: String,
    pub user_id: Option<String>,
    /// Whether the worker should post load-progress events during init.
    pub want_load_progress: bool,
}

/// Metadata granted by a successful license check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LicenseLease {
    pub licensee: String,
    pub user_id: Option<String>,
    pub show_demo_overlay: bool,
}

/// What a request asks the worker to do.
#[derive(Debug)]
pub enum RequestKind {
    Init(InitSettings),
    InvokeFunction {
        function: String,
        args: Vec<Value>,
    },
    CreateNewObject {
        class_name: String,
        args: Vec<Value>,
    },
    InvokeObjectMethod {
        handle: ObjectHandle,
        method: String,
        args: Vec<Value>,
    },
    DeleteObject {
        handle: ObjectHandle,
    },
    CreateRunner {
        handles: Vec<ObjectHandle>,
        allow_multiple_results: bool,
        callbacks: CallbackFlags,
    },
    ReconfigureRunner {
        handles: Vec<ObjectHandle>,
        allow_multiple_results: bool,
    },
    DeleteRunner,
    /// The frame's pixel buffer moves with the request.
    ProcessImage {
        frame: CapturedFrame,
    },
    ResetRecognizers {
        hard_reset: bool,
    },
    SetDetectionOnly(bool),
    SetCameraPreviewMirrored(bool),
    RegisterMetadataCallbacks(CallbackFlags),
    SetClearTimeoutCallback(bool),
}

impl RequestKind {
    pub fn name(&self) -> &'static str {
        match self {
            RequestKind::Init(_) => "init",
            RequestKind::InvokeFunction { .. } => "invokeFunction",
            RequestKind::CreateNewObject { .. } => "createNewObject",
            RequestKind::InvokeObjectMethod { .. } => "invokeObjectMethod",
            RequestKind::DeleteObject { .. } => "deleteObject",
            RequestKind::CreateRunner { .. } => "createRunner",
            RequestKind::ReconfigureRunner { .. } => "reconfigureRunner",
            RequestKind::DeleteRunner => "deleteRunner",
            RequestKind::ProcessImage { .. } => "processImage",
            RequestKind::ResetRecognizers { .. } => "resetRecognizers",
            RequestKind::SetDetectionOnly(_) => "setDetectionOnly",
            RequestKind::SetCameraPreviewMirrored(_) => "setCameraPreviewMirrored",
            RequestKind::RegisterMetadataCallbacks(_) => "registerMetadataCallbacks",
            RequestKind::SetClearTimeoutCallback(_) => "setClearTimeoutCallback",
        }
    }

    /// Bytes that move with this request instead of being copied.
    pub fn transferable_bytes(&self) -> usize {
        match self {
            RequestKind::ProcessImage { frame } => frame.byte_len(),
            RequestKind::InvokeFunction { args, .. }
            | RequestKind::CreateNewObject { args, .. }
            | RequestKind::InvokeObjectMethod { args, .. } => {
                args.iter().map(Value::transferable_bytes).sum()
            }
            _ => 0,
        }
    }
}

#[derive(Debug)]
pub struct Request {
    pub id: RequestId,
    pub kind: RequestKind,
}

/// Typed success payload of a response.
#[derive(Debug, PartialEq)]
pub enum Payload {
    Unit,
    Value(Value),
    Handle(ObjectHandle),
    ResultState(ResultState),
    Lease(LicenseLease),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Unit => "unit",
            Payload::Value(_) => "value",
            Payload::Handle(_) => "handle",
            Payload::ResultState(_) => "result state",
            Payload::Lease(_) => "license lease",
        }
    }

    pub fn transferable_bytes(&self) -> usize {
        match self {
            Payload::Value(v) => v.transferable_bytes(),
            _ => 0,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Result<Payload, RemoteError>,
}

/// Everything the worker sends back. The variant is the shape marker that
/// separates correlated responses from fire-and-forget events.
#[derive(Debug)]
pub enum WorkerMessage {
    Response(Response),
    Event(WorkerEvent),
}
