use crate::protocol::domain::envelope::LicenseLease;
use crate::worker::domain::module_loader::{InitError, LicenseChecker};

/// Offline checker for development builds: any non-blank key passes and the
/// lease asks for the demo overlay.
pub struct DevelopmentLicenseChecker {
    licensee: String,
}

impl DevelopmentLicenseChecker {
    pub fn new(licensee: impl Into<String>) -> Self {
        Self {
            licensee: licensee.into(),
        }
    }
}

impl Default for DevelopmentLicenseChecker {
    fn default() -> Self {
        Self::new("development")
    }
}

impl LicenseChecker for DevelopmentLicenseChecker {
    fn check(&self, license_key: &str, user_id: Option<&str>) -> Result<LicenseLease, InitError> {
        if license_key.trim().is_empty() {
            return Err(InitError::LicenseInvalid("license key is blank".into()));
        }
        Ok(LicenseLease {
            licensee: self.licensee.clone(),
            user_id: user_id.map(str::to_string),
            show_demo_overlay: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_rejected() {
        let checker = DevelopmentLicenseChecker::default();
        assert!(matches!(
            checker.check("   ", None),
            Err(InitError::LicenseInvalid(_))
        ));
    }

    #[test]
    fn test_lease_carries_user_and_overlay() {
        let checker = DevelopmentLicenseChecker::new("acme");
        let lease = checker.check("dev-key", Some("u-42")).unwrap();
        assert_eq!(lease.licensee, "acme");
        assert_eq!(lease.user_id.as_deref(), Some("u-42"));
        assert!(lease.show_demo_overlay);
    }
}
