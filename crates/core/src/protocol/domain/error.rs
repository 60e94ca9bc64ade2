use std::fmt;

use thiserror::Error;

/// Stable, machine-readable classification of a failed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ModuleNotInitialized,
    ModuleAlreadyInitialized,
    ModuleLoadFailed,
    LicenseRejected,
    NetworkFailure,
    UnknownHandle,
    UnknownMethod,
    InvalidArgument,
    RunnerAlreadyExists,
    RunnerMissing,
    EngineFailure,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ModuleNotInitialized => "module_not_initialized",
            ErrorCode::ModuleAlreadyInitialized => "module_already_initialized",
            ErrorCode::ModuleLoadFailed => "module_load_failed",
            ErrorCode::LicenseRejected => "license_rejected",
            ErrorCode::NetworkFailure => "network_failure",
            ErrorCode::UnknownHandle => "unknown_handle",
            ErrorCode::UnknownMethod => "unknown_method",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::RunnerAlreadyExists => "runner_already_exists",
            ErrorCode::RunnerMissing => "runner_missing",
            ErrorCode::EngineFailure => "engine_failure",
        }
    }

    /// Initialization failures end the whole session.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorCode::ModuleLoadFailed | ErrorCode::LicenseRejected | ErrorCode::NetworkFailure
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure outcome carried back in a response envelope.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: ErrorCode,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn module_not_initialized() -> Self {
        Self::new(ErrorCode::ModuleNotInitialized, "module not initialized")
    }

    pub fn unknown_handle(handle: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::UnknownHandle,
            format!("no object with handle {handle}"),
        )
    }

    pub fn runner_already_exists() -> Self {
        Self::new(
            ErrorCode::RunnerAlreadyExists,
            "runner already created; multiple instances not allowed",
        )
    }

    pub fn runner_missing() -> Self {
        Self::new(ErrorCode::RunnerMissing, "runner not created")
    }
}
