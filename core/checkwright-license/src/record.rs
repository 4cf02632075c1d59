//! The persisted license record and the importable license file.

use crate::device::DeviceId;
use crate::error::{LicenseError, LicenseResult};
use crate::key::LicenseKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single license binding kept on this installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Canonical license key.
    pub license_key: LicenseKey,
    /// Device the key is bound to, as recorded locally.
    pub device_id: DeviceId,
    /// Local activation or last successful transfer.
    pub activated_at: DateTime<Utc>,
    /// Informational plan name. Never consulted for gating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,
}

impl LicenseRecord {
    /// Creates a record for a fresh activation.
    #[must_use]
    pub fn new(
        license_key: LicenseKey,
        device_id: DeviceId,
        activated_at: DateTime<Utc>,
        plan_type: Option<String>,
    ) -> Self {
        Self {
            license_key,
            device_id,
            activated_at,
            plan_type,
        }
    }

    /// Returns true if the record is bound to `device`.
    #[must_use]
    pub fn is_bound_to(&self, device: &DeviceId) -> bool {
        &self.device_id == device
    }

    /// Re-binds the record after a successful transfer.
    pub fn rebind(&mut self, device_id: DeviceId, at: DateTime<Utc>) {
        self.device_id = device_id;
        self.activated_at = at;
    }
}

#[derive(Debug, Deserialize)]
struct RawLicenseFile {
    license_key: Option<String>,
    device_id: Option<String>,
    activated_at: Option<String>,
    plan_type: Option<String>,
}

/// A license file handed to the app instead of a typed key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseFile {
    /// Normalized key from the file.
    pub license_key: LicenseKey,
    /// Device the file claims the key is bound to.
    pub device_id: DeviceId,
    /// Activation time recorded in the file, if any.
    pub activated_at: Option<DateTime<Utc>>,
    /// Plan name recorded in the file, if any.
    pub plan_type: Option<String>,
}

impl LicenseFile {
    /// Parses raw file bytes.
    ///
    /// The key is normalized the same way as a typed key. The device id is
    /// format-checked since the file comes from outside the process.
    pub fn parse(bytes: &[u8]) -> LicenseResult<Self> {
        let raw: RawLicenseFile = serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::InvalidLicenseFile(format!("not a license file: {e}")))?;

        let key = raw
            .license_key
            .ok_or_else(|| LicenseError::InvalidLicenseFile("missing license_key".to_string()))?;
        let license_key = LicenseKey::parse(&key)?;

        let device = raw
            .device_id
            .ok_or_else(|| LicenseError::InvalidLicenseFile("missing device_id".to_string()))?;
        let device_id = DeviceId::parse(&device)?;

        let activated_at = match raw.activated_at {
            Some(ts) => Some(
                DateTime::parse_from_rfc3339(&ts)
                    .map_err(|e| {
                        LicenseError::InvalidLicenseFile(format!("invalid activated_at: {e}"))
                    })?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        Ok(Self {
            license_key,
            device_id,
            activated_at,
            plan_type: raw.plan_type.filter(|p| !p.trim().is_empty()),
        })
    }
}
