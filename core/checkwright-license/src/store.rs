//! Local license store.
//!
//! The only place that reads or writes license and trial state. Reads are
//! tolerant: anything that cannot be parsed into a well-formed record is
//! reported as absent, never as an error.

use crate::device::DeviceId;
use crate::error::LicenseResult;
use crate::key::LicenseKey;
use crate::kv::{KeyValueStore, KvOp};
use crate::record::LicenseRecord;
use crate::trial::TrialRecord;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Storage keys.
pub mod keys {
    /// Structured license record (JSON).
    pub const LICENSE_RECORD: &str = "license_record";
    /// Legacy flag: canonical key string.
    pub const LICENSE_KEY: &str = "license_key";
    /// Legacy flag: RFC 3339 activation timestamp.
    pub const LICENSE_ACTIVATED_AT: &str = "license_activated_at";
    /// Legacy flag: bound device id.
    pub const LICENSE_DEVICE_ID: &str = "license_device_id";
    /// Legacy flag: `"true"` while a license is stored.
    pub const LICENSE_ACTIVATED: &str = "license_activated";
    /// Structured trial record (JSON).
    pub const TRIAL_RECORD: &str = "trial_record";
    /// Prefix of the per-device "trial was used" marker.
    pub const TRIAL_USED_PREFIX: &str = "trial_used:";
}

/// Durable license and trial state on top of a key-value backend.
#[derive(Clone)]
pub struct LicenseStore {
    kv: Arc<dyn KeyValueStore>,
}

impl LicenseStore {
    /// Wraps a backend.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    // ── License record ───────────────────────────────────────────

    /// Loads the license record, or `None` if absent or unreadable.
    pub fn get(&self) -> Option<LicenseRecord> {
        match self.read(keys::LICENSE_RECORD) {
            Some(json) => match serde_json::from_str::<LicenseRecord>(&json) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Ignoring malformed license record: {e}");
                    None
                }
            },
            None => self.read_legacy_flags(),
        }
    }

    /// Writes the record and the legacy flags as one batch.
    pub fn put(&self, record: &LicenseRecord) -> LicenseResult<()> {
        let json = serde_json::to_string(record)?;
        self.kv.apply(&[
            KvOp::set(keys::LICENSE_RECORD, json),
            KvOp::set(keys::LICENSE_KEY, record.license_key.as_str()),
            KvOp::set(keys::LICENSE_ACTIVATED_AT, record.activated_at.to_rfc3339()),
            KvOp::set(keys::LICENSE_DEVICE_ID, record.device_id.as_str()),
            KvOp::set(keys::LICENSE_ACTIVATED, "true"),
        ])?;
        debug!(key = %record.license_key.masked(), "License record written");
        Ok(())
    }

    /// Removes the record and the legacy flags as one batch.
    ///
    /// Trial state is left alone.
    pub fn clear(&self) -> LicenseResult<()> {
        self.kv.apply(&[
            KvOp::remove(keys::LICENSE_RECORD),
            KvOp::remove(keys::LICENSE_KEY),
            KvOp::remove(keys::LICENSE_ACTIVATED_AT),
            KvOp::remove(keys::LICENSE_DEVICE_ID),
            KvOp::remove(keys::LICENSE_ACTIVATED),
        ])?;
        debug!("License record cleared");
        Ok(())
    }

    /// Installs that predate the structured record only have the flags.
    fn read_legacy_flags(&self) -> Option<LicenseRecord> {
        if self.read(keys::LICENSE_ACTIVATED).as_deref() != Some("true") {
            return None;
        }
        let key = self.read(keys::LICENSE_KEY)?;
        let device = self.read(keys::LICENSE_DEVICE_ID)?;
        let activated_at = self.read(keys::LICENSE_ACTIVATED_AT)?;

        let record = parse_legacy(&key, &device, &activated_at);
        if record.is_none() {
            warn!("Ignoring malformed legacy license flags");
        }
        record
    }

    // ── Trial ────────────────────────────────────────────────────

    /// Loads the trial record, or `None` if absent or unreadable.
    pub fn trial(&self) -> Option<TrialRecord> {
        let json = self.read(keys::TRIAL_RECORD)?;
        match serde_json::from_str(&json) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring malformed trial record: {e}");
                None
            }
        }
    }

    /// Returns true if a trial was ever started on `device`.
    pub fn trial_used(&self, device: &DeviceId) -> bool {
        self.read(&trial_marker(device)).is_some()
    }

    /// Writes the trial record together with the device's used-marker.
    pub fn put_trial(&self, record: &TrialRecord) -> LicenseResult<()> {
        let json = serde_json::to_string(record)?;
        self.kv.apply(&[
            KvOp::set(keys::TRIAL_RECORD, json),
            KvOp::set(
                trial_marker(&record.bound_device_id),
                record.started_at.to_rfc3339(),
            ),
        ])
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("License store read of {key} failed: {e}");
                None
            }
        }
    }
}

fn parse_legacy(key: &str, device: &str, activated_at: &str) -> Option<LicenseRecord> {
    let license_key = LicenseKey::parse(key).ok()?;
    if license_key.as_str() != key {
        return None;
    }
    Some(LicenseRecord::new(
        license_key,
        DeviceId::parse(device).ok()?,
        DateTime::parse_from_rfc3339(activated_at)
            .ok()?
            .with_timezone(&Utc),
        None,
    ))
}

fn trial_marker(device: &DeviceId) -> String {
    format!("{}{}", keys::TRIAL_USED_PREFIX, device.as_str())
}

impl std::fmt::Debug for LicenseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseStore").finish_non_exhaustive()
    }
}
