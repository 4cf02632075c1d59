//! Error types for the licensing module.
//!
//! Outcomes reported by the activation authority are not errors; they are
//! returned as [`crate::ActivationOutcome`] values. This enum covers input
//! that is rejected locally and failures of the local machinery.

use thiserror::Error;

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// License key does not have 16 alphanumeric characters.
    #[error("invalid license key format: {0}")]
    InvalidKeyFormat(String),

    /// Device identifier is not a well-formed fingerprint.
    #[error("invalid device id: {0}")]
    InvalidDeviceId(String),

    /// Imported license file is unreadable or incomplete.
    #[error("invalid license file: {0}")]
    InvalidLicenseFile(String),

    /// A trial was already used on this device.
    #[error("trial unavailable: {0}")]
    TrialUnavailable(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for LicenseError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
