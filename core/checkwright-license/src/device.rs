//! Device identity for license binding.
//!
//! The device id is a 32-character hex digest of hostname, OS, architecture
//! and CPU model. It is computed once per process and compared against the
//! id stored with the license record.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use std::fmt;
use std::sync::OnceLock;

/// Length of a device id in hex characters (16 digest bytes).
pub const DEVICE_ID_LEN: usize = 32;

/// Information about the current device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Hostname.
    pub hostname: String,
    /// Operating system name.
    pub os_name: String,
    /// CPU architecture.
    pub arch: String,
    /// Primary CPU model string.
    pub cpu_model: String,
}

impl DeviceInfo {
    /// Collects information about the current device.
    ///
    /// Signals that cannot be read are left empty.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            hostname: get_hostname(),
            os_name: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            cpu_model: get_cpu_model(),
        }
    }

    fn components(&self) -> [&str; 4] {
        [
            self.hostname.as_str(),
            self.os_name.as_str(),
            self.arch.as_str(),
            self.cpu_model.as_str(),
        ]
    }
}

/// Returns true if `s` looks like a device id produced by [`DeviceFingerprint`].
#[must_use]
pub fn is_valid_device_id(s: &str) -> bool {
    s.len() == DEVICE_ID_LEN && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// Opaque device identifier: 32 lowercase hex characters.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validates an id received from outside the process (stored record,
    /// imported file, server response).
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidDeviceId`] if the format is wrong.
    pub fn parse(s: &str) -> LicenseResult<Self> {
        let s = s.trim();
        if !is_valid_device_id(s) {
            return Err(LicenseError::InvalidDeviceId(format!(
                "expected {DEVICE_ID_LEN} lowercase hex characters"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.0)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// A stable fingerprint that identifies this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFingerprint {
    id: DeviceId,
}

impl DeviceFingerprint {
    /// Generates a fingerprint for the current device.
    ///
    /// This combines hostname, platform, architecture and CPU model into a
    /// stable ID that survives reboots but changes if hardware changes.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_info(&DeviceInfo::collect())
    }

    /// Derives the fingerprint from already collected device information.
    #[must_use]
    pub fn from_info(info: &DeviceInfo) -> Self {
        let combined = info.components().join("|");

        let mut hasher = Sha256::new();
        hasher.update(combined.as_bytes());
        let hash = hasher.finalize();

        Self {
            id: DeviceId(hex::encode(&hash[..DEVICE_ID_LEN / 2])),
        }
    }

    /// Returns the fingerprint ID.
    #[must_use]
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Validates that this fingerprint matches the current device.
    #[must_use]
    pub fn matches_current(&self) -> bool {
        &self.id == current_device_id()
    }
}

/// The fingerprint of this host, computed once per process.
pub fn current_device_id() -> &'static DeviceId {
    static CURRENT: OnceLock<DeviceId> = OnceLock::new();
    CURRENT.get_or_init(|| DeviceFingerprint::generate().id)
}

/// Source of the device identity used by the license manager.
pub trait DeviceIdentity: Send + Sync {
    /// Returns the id of the device this process runs on.
    fn device_id(&self) -> DeviceId;
}

/// The real host fingerprint.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostDevice;

impl DeviceIdentity for HostDevice {
    fn device_id(&self) -> DeviceId {
        current_device_id().clone()
    }
}

/// A fixed device id, for tests and for tooling that acts on behalf of
/// another machine.
#[derive(Debug, Clone)]
pub struct FixedDevice(pub DeviceId);

impl DeviceIdentity for FixedDevice {
    fn device_id(&self) -> DeviceId {
        self.0.clone()
    }
}

/// Gets the machine hostname.
fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_default()
}

/// Gets the primary CPU model string.
fn get_cpu_model() -> String {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("sysctl")
            .args(["-n", "machdep.cpu.brand_string"])
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    #[cfg(target_os = "linux")]
    {
        std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|content| {
                content
                    .lines()
                    .find(|l| l.starts_with("model name"))
                    .and_then(|l| l.split_once(':'))
                    .map(|(_, v)| v.trim().to_string())
            })
            .unwrap_or_default()
    }

    #[cfg(target_os = "windows")]
    {
        env::var("PROCESSOR_IDENTIFIER").unwrap_or_default()
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        String::new()
    }
}
