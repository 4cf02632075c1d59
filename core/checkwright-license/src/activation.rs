//! Activation authority: the remote party that binds keys to devices.
//!
//! The authority is contacted only when the user activates or transfers a
//! key. Each call is a single round-trip with no retries; the caller decides
//! whether to try again.

use crate::device::DeviceId;
use crate::key::LicenseKey;
use async_trait::async_trait;
use tracing::debug;

/// Result of one activation or transfer request. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The key is now bound to the requesting device.
    Activated {
        /// Plan reported by the authority, if any.
        plan_type: Option<String>,
    },
    /// The key is bound to another device.
    DeviceMismatch {
        /// Whether the authority offers a transfer.
        requires_transfer: bool,
    },
    /// The key is not recognized.
    Invalid,
    /// The key was revoked.
    Revoked,
    /// No transfers remain for this key.
    TransferLimitReached,
    /// The authority could not be reached or answered unusably.
    NetworkError(String),
}

impl ActivationOutcome {
    /// Returns true if the key ended up bound to the requesting device.
    #[must_use]
    pub fn is_activated(&self) -> bool {
        matches!(self, Self::Activated { .. })
    }

    /// Returns true if trying the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    /// Returns true if the authority refused the key itself.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Invalid | Self::Revoked)
    }

    /// Short machine-readable label, for logs and the CLI.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "activated",
            Self::DeviceMismatch { .. } => "device_mismatch",
            Self::Invalid => "invalid",
            Self::Revoked => "revoked",
            Self::TransferLimitReached => "transfer_limit_reached",
            Self::NetworkError(_) => "network_error",
        }
    }
}

/// The remote activation authority.
#[async_trait]
pub trait ActivationAuthority: Send + Sync {
    /// Requests that `key` be bound to `device`.
    async fn activate(&self, key: &LicenseKey, device: &DeviceId) -> ActivationOutcome;

    /// Requests that `key` be moved to `new_device`.
    async fn transfer(&self, key: &LicenseKey, new_device: &DeviceId) -> ActivationOutcome;
}

/// Development/offline authority: binds any key to any device without a
/// network call.
#[derive(Debug, Clone, Default)]
pub struct LocalAuthority {
    plan_type: Option<String>,
}

impl LocalAuthority {
    /// Creates a local authority that reports no plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a local authority that reports `plan_type` on activation.
    #[must_use]
    pub fn with_plan(plan_type: impl Into<String>) -> Self {
        Self {
            plan_type: Some(plan_type.into()),
        }
    }
}

#[async_trait]
impl ActivationAuthority for LocalAuthority {
    async fn activate(&self, key: &LicenseKey, device: &DeviceId) -> ActivationOutcome {
        debug!(key = %key.masked(), %device, "Offline activation");
        ActivationOutcome::Activated {
            plan_type: self.plan_type.clone(),
        }
    }

    async fn transfer(&self, key: &LicenseKey, new_device: &DeviceId) -> ActivationOutcome {
        debug!(key = %key.masked(), %new_device, "Offline transfer");
        ActivationOutcome::Activated { plan_type: None }
    }
}
