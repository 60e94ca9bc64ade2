use thiserror::Error;

use crate::protocol::domain::envelope::LicenseLease;
use crate::protocol::domain::error::{ErrorCode, RemoteError};
use crate::worker::domain::engine::RecognitionEngine;

#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to load engine module from {location}: {reason}")]
    ModuleLoad { location: String, reason: String },
    #[error("license key is invalid: {0}")]
    LicenseInvalid(String),
    #[error("license expired: {0}")]
    LicenseExpired(String),
    #[error("license requires network access, which is not available")]
    NetworkPermissionRequired,
    #[error("network failure while {context}: {reason}")]
    Network { context: String, reason: String },
}

impl InitError {
    pub fn code(&self) -> ErrorCode {
        match self {
            InitError::ModuleLoad { .. } => ErrorCode::ModuleLoadFailed,
            InitError::LicenseInvalid(_)
            | InitError::LicenseExpired(_)
            | InitError::NetworkPermissionRequired => ErrorCode::LicenseRejected,
            InitError::Network { .. } => ErrorCode::NetworkFailure,
        }
    }
}

impl From<InitError> for RemoteError {
    fn from(err: InitError) -> Self {
        RemoteError::new(err.code(), err.to_string())
    }
}

/// Locates, fetches and instantiates the engine module.
pub trait ModuleLoader: Send {
    /// Loads the module at `location`, reporting progress in percent (0..=100).
    fn load(
        &self,
        location: &str,
        progress: &mut dyn FnMut(u8),
    ) -> Result<Box<dyn RecognitionEngine>, InitError>;
}

/// Validates a license key after the module is loaded.
pub trait LicenseChecker: Send {
    fn check(&self, license_key: &str, user_id: Option<&str>) -> Result<LicenseLease, InitError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(InitError::ModuleLoad { location: "x".into(), reason: "y".into() }, ErrorCode::ModuleLoadFailed)]
    #[case(InitError::LicenseInvalid("bad".into()), ErrorCode::LicenseRejected)]
    #[case(InitError::LicenseExpired("2020".into()), ErrorCode::LicenseRejected)]
    #[case(InitError::NetworkPermissionRequired, ErrorCode::LicenseRejected)]
    #[case(InitError::Network { context: "ping".into(), reason: "dns".into() }, ErrorCode::NetworkFailure)]
    fn test_init_errors_map_to_fatal_codes(#[case] err: InitError, #[case] code: ErrorCode) {
        assert_eq!(err.code(), code);
        assert!(code.is_fatal());
        let remote: RemoteError = err.into();
        assert_eq!(remote.code, code);
    }
}
