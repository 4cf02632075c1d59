//! Time-limited trial, tracked next to (and independently of) the license.
//!
//! Expiry is never stored. It is recomputed from `started_at` and the trial
//! duration every time the trial is consulted.

use crate::clock::Clock;
use crate::device::{DeviceId, DeviceIdentity};
use crate::error::{LicenseError, LicenseResult};
use crate::key::LicenseKey;
use crate::record::LicenseRecord;
use crate::store::LicenseStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// A trial started on this installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Key the trial was started with.
    pub trial_key: LicenseKey,
    /// When the trial began.
    pub started_at: DateTime<Utc>,
    /// Device the trial is bound to.
    pub bound_device_id: DeviceId,
}

impl TrialRecord {
    /// When the trial ends.
    #[must_use]
    pub fn expires_at(&self, duration: Duration) -> DateTime<Utc> {
        self.started_at + duration
    }

    /// Returns true once `now` has reached the end of the trial.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, duration: Duration) -> bool {
        now >= self.expires_at(duration)
    }
}

/// Trial lifecycle on this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrialState {
    /// No trial on this device.
    NoTrial,
    /// Trial running.
    Active {
        /// When the trial ends.
        expires_at: DateTime<Utc>,
    },
    /// Trial over. Cannot be restarted on this device.
    Expired,
    /// The trial key was activated as a full license.
    Converted,
}

impl TrialState {
    /// Returns true if the trial currently grants access.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// Starts and evaluates the trial.
#[derive(Clone)]
pub struct TrialCompanion {
    store: LicenseStore,
    device: Arc<dyn DeviceIdentity>,
    clock: Arc<dyn Clock>,
    duration: Duration,
}

impl TrialCompanion {
    /// Creates a trial companion sharing the license store.
    pub fn new(
        store: LicenseStore,
        device: Arc<dyn DeviceIdentity>,
        clock: Arc<dyn Clock>,
        duration: Duration,
    ) -> Self {
        Self {
            store,
            device,
            clock,
            duration,
        }
    }

    /// Returns the trial length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the stored trial record, if readable.
    pub fn record(&self) -> Option<TrialRecord> {
        self.store.trial()
    }

    /// Starts the trial on this device.
    ///
    /// # Errors
    ///
    /// Fails on a malformed key, or with [`LicenseError::TrialUnavailable`]
    /// if a trial was already started here or any trial record is stored.
    pub fn start(&self, raw_key: &str) -> LicenseResult<TrialRecord> {
        let trial_key = LicenseKey::parse(raw_key)?;
        let device = self.device.device_id();

        if self.store.trial_used(&device) {
            return Err(LicenseError::TrialUnavailable(
                "a trial was already used on this device".to_string(),
            ));
        }
        if self.store.trial().is_some() {
            return Err(LicenseError::TrialUnavailable(
                "a trial record already exists".to_string(),
            ));
        }
        let record = TrialRecord {
            trial_key,
            started_at: self.clock.now(),
            bound_device_id: device,
        };
        self.store.put_trial(&record)?;
        info!(
            key = %record.trial_key.masked(),
            expires_at = %record.expires_at(self.duration),
            "Trial started"
        );
        Ok(record)
    }

    /// Evaluates the trial against the current license record.
    #[must_use]
    pub fn state(&self, license: Option<&LicenseRecord>) -> TrialState {
        let device = self.device.device_id();
        let trial = match self.store.trial() {
            Some(trial) if trial.bound_device_id == device => trial,
            // Record lost or belongs elsewhere, but the marker says this
            // device already had its trial.
            _ if self.store.trial_used(&device) => return TrialState::Expired,
            _ => return TrialState::NoTrial,
        };
        if license.is_some_and(|l| l.license_key == trial.trial_key && l.is_bound_to(&device)) {
            return TrialState::Converted;
        }
        if trial.is_expired(self.clock.now(), self.duration) {
            TrialState::Expired
        } else {
            TrialState::Active {
                expires_at: trial.expires_at(self.duration),
            }
        }
    }
}

impl std::fmt::Debug for TrialCompanion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialCompanion")
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}
