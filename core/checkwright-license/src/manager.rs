//! License state machine.
//!
//! `LicenseManager` decides whether this installation is entitled to run.
//! Steady-state checks read only the local store; the activation authority
//! is contacted only from [`LicenseManager::activate`] and
//! [`LicenseManager::transfer`].
//!
//! ```text
//! Unlicensed ──activate──▶ LicensedLocal         (Activated)
//! Unlicensed ──activate──▶ RequiresTransfer      (DeviceMismatch, nothing written)
//! RequiresTransfer ──transfer──▶ LicensedLocal   (record re-bound in place)
//! RequiresTransfer ──transfer──▶ RequiresTransfer (TransferLimitReached, terminal)
//! any ──Invalid / Revoked / NetworkError──▶ unchanged
//! ```

use crate::activation::{ActivationAuthority, ActivationOutcome, LocalAuthority};
use crate::clock::{Clock, SystemClock};
use crate::config::LicenseConfig;
use crate::device::{DeviceId, DeviceIdentity, HostDevice};
use crate::error::LicenseResult;
use crate::key::LicenseKey;
use crate::kv::SqliteKv;
use crate::record::{LicenseFile, LicenseRecord};
use crate::store::LicenseStore;
use crate::trial::{TrialCompanion, TrialRecord, TrialState};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Default trial length.
pub const DEFAULT_TRIAL_DAYS: i64 = 14;

/// Where the license stands on this installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LicenseState {
    /// No usable record.
    Unlicensed,
    /// Record present and bound to this device.
    LicensedLocal(LicenseRecord),
    /// The key is bound to another device.
    RequiresTransfer {
        /// Key awaiting transfer.
        license_key: LicenseKey,
        /// False once the authority refused further transfers.
        transfer_available: bool,
    },
    /// Activation request in flight.
    Activating,
    /// Transfer request in flight.
    Transferring,
}

/// Composite answer consumed by the application shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entitlement {
    /// Licensed on this device.
    Licensed,
    /// Running on an active trial.
    Trial {
        /// When the trial ends.
        expires_at: DateTime<Utc>,
    },
    /// Licensed elsewhere; offer a transfer (or support when unavailable).
    RequiresTransfer {
        /// Whether a transfer can still be requested.
        transfer_available: bool,
    },
    /// Trial over; offer a purchase.
    TrialExpired,
    /// Nothing on record.
    Unlicensed,
}

impl Entitlement {
    /// Returns true if the full feature set may run.
    #[must_use]
    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Licensed | Self::Trial { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Activating,
    Transferring,
}

/// A key the authority reported as bound elsewhere, kept in memory until a
/// transfer succeeds.
#[derive(Debug, Clone)]
struct PendingTransfer {
    key: LicenseKey,
    plan_type: Option<String>,
    transfer_available: bool,
}

/// Resets the phase when the in-flight call finishes or its future is dropped.
struct PhaseGuard<'a> {
    phase: &'a Mutex<Phase>,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = Phase::Idle;
    }
}

/// The license service. Construct one per process and share it by `Arc`.
pub struct LicenseManager {
    store: LicenseStore,
    authority: Arc<dyn ActivationAuthority>,
    device: Arc<dyn DeviceIdentity>,
    clock: Arc<dyn Clock>,
    trial: TrialCompanion,
    pending: Mutex<Option<PendingTransfer>>,
    phase: Mutex<Phase>,
    /// Serializes activate / transfer / import / remove.
    op_lock: tokio::sync::Mutex<()>,
}

impl LicenseManager {
    /// Creates a manager with the system clock and the default trial length.
    pub fn new(
        store: LicenseStore,
        authority: Arc<dyn ActivationAuthority>,
        device: Arc<dyn DeviceIdentity>,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let trial = TrialCompanion::new(
            store.clone(),
            device.clone(),
            clock.clone(),
            Duration::days(DEFAULT_TRIAL_DAYS),
        );
        Self {
            store,
            authority,
            device,
            clock,
            trial,
            pending: Mutex::new(None),
            phase: Mutex::new(Phase::Idle),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.trial = TrialCompanion::new(
            self.store.clone(),
            self.device.clone(),
            clock.clone(),
            self.trial.duration(),
        );
        self.clock = clock;
        self
    }

    /// Sets the trial length.
    #[must_use]
    pub fn with_trial_duration(mut self, duration: Duration) -> Self {
        self.trial = TrialCompanion::new(
            self.store.clone(),
            self.device.clone(),
            self.clock.clone(),
            duration,
        );
        self
    }

    /// Builds the production service: SQLite store in the configured data
    /// directory, host fingerprint, and the HTTP authority (or the local one
    /// in offline mode).
    pub fn from_config(config: &LicenseConfig) -> LicenseResult<Self> {
        config.validate()?;
        let kv = SqliteKv::open(&config.database_path()?)?;
        let store = LicenseStore::new(Arc::new(kv));
        let authority = authority_for(config)?;
        info!(
            offline = config.offline_mode,
            product = %config.product,
            "License manager ready"
        );
        Ok(Self::new(store, authority, Arc::new(HostDevice))
            .with_trial_duration(config.trial_duration()))
    }

    /// Returns the store.
    pub fn store(&self) -> &LicenseStore {
        &self.store
    }

    /// Returns the trial companion.
    pub fn trial(&self) -> &TrialCompanion {
        &self.trial
    }

    /// Returns the id of this device.
    pub fn device_id(&self) -> DeviceId {
        self.device.device_id()
    }

    // ── Queries (local only) ─────────────────────────────────────

    /// Returns true if a record bound to this device is stored.
    ///
    /// Never touches the network and never waits on an in-flight request.
    pub fn is_licensed(&self) -> bool {
        let device = self.device.device_id();
        self.store.get().is_some_and(|r| r.is_bound_to(&device))
    }

    /// Returns the current state, including an in-flight request.
    pub fn state(&self) -> LicenseState {
        match *self.phase() {
            Phase::Activating => return LicenseState::Activating,
            Phase::Transferring => return LicenseState::Transferring,
            Phase::Idle => {}
        }
        self.committed_state(self.store.get())
    }

    /// Combines the license and the trial into one answer.
    pub fn entitlement(&self) -> Entitlement {
        let record = self.store.get();
        let trial = self.trial.state(record.as_ref());
        let state = self.committed_state(record);

        if let LicenseState::LicensedLocal(_) = state {
            return Entitlement::Licensed;
        }
        if let TrialState::Active { expires_at } = trial {
            return Entitlement::Trial { expires_at };
        }
        match state {
            LicenseState::RequiresTransfer {
                transfer_available, ..
            } => Entitlement::RequiresTransfer { transfer_available },
            _ if trial == TrialState::Expired => Entitlement::TrialExpired,
            _ => Entitlement::Unlicensed,
        }
    }

    /// Shorthand for `entitlement().is_entitled()`.
    pub fn is_entitled(&self) -> bool {
        self.entitlement().is_entitled()
    }

    /// Returns the key waiting for a transfer, if any.
    pub fn pending_transfer_key(&self) -> Option<LicenseKey> {
        match self.committed_state(self.store.get()) {
            LicenseState::RequiresTransfer { license_key, .. } => Some(license_key),
            _ => None,
        }
    }

    fn committed_state(&self, record: Option<LicenseRecord>) -> LicenseState {
        let device = self.device.device_id();
        let pending = self.pending().clone();
        match (record, pending) {
            (Some(record), _) if record.is_bound_to(&device) => {
                LicenseState::LicensedLocal(record)
            }
            // The stored key is bound elsewhere and nothing newer is pending.
            (Some(record), pending)
                if pending.as_ref().is_none_or(|p| p.key == record.license_key) =>
            {
                LicenseState::RequiresTransfer {
                    license_key: record.license_key,
                    transfer_available: pending.is_none_or(|p| p.transfer_available),
                }
            }
            // A mismatch reported for a typed or imported key outranks the stored one.
            (_, Some(p)) => LicenseState::RequiresTransfer {
                license_key: p.key,
                transfer_available: p.transfer_available,
            },
            (_, None) => LicenseState::Unlicensed,
        }
    }

    // ── State-changing operations ────────────────────────────────

    /// Activates a typed key on this device.
    ///
    /// The key is format-checked before anything else; a malformed key never
    /// reaches the network. Concurrent calls are queued; a queued call for a
    /// key that got activated meanwhile returns without a network call.
    ///
    /// # Errors
    ///
    /// [`LicenseError::InvalidKeyFormat`] for malformed keys, or a storage
    /// error if the record could not be written. Authority verdicts are
    /// returned as `Ok(outcome)`.
    pub async fn activate(&self, raw_key: &str) -> LicenseResult<ActivationOutcome> {
        let key = LicenseKey::parse(raw_key)?;
        let _op = self.op_lock.lock().await;
        let device = self.device.device_id();

        if let Some(record) = self.store.get() {
            if record.license_key == key && record.is_bound_to(&device) {
                debug!(key = %key.masked(), "Key already active on this device");
                return Ok(ActivationOutcome::Activated {
                    plan_type: record.plan_type,
                });
            }
        }

        let outcome = {
            let _phase = self.enter(Phase::Activating);
            self.authority.activate(&key, &device).await
        };

        match &outcome {
            ActivationOutcome::Activated { plan_type } => {
                let record =
                    LicenseRecord::new(key.clone(), device, self.clock.now(), plan_type.clone());
                self.store.put(&record)?;
                *self.pending() = None;
                info!(key = %key.masked(), "License activated");
            }
            ActivationOutcome::DeviceMismatch { requires_transfer } => {
                *self.pending() = Some(PendingTransfer {
                    key: key.clone(),
                    plan_type: None,
                    transfer_available: *requires_transfer,
                });
                info!(key = %key.masked(), "Key is bound to another device");
            }
            other => {
                warn!(key = %key.masked(), outcome = other.label(), "Activation not applied");
            }
        }
        Ok(outcome)
    }

    /// Moves a key bound elsewhere to this device.
    ///
    /// On success the existing record for the key is re-bound in place, or a
    /// fresh one is written. Failures leave the store and any pending
    /// transfer as they were.
    pub async fn transfer(&self, raw_key: &str) -> LicenseResult<ActivationOutcome> {
        let key = LicenseKey::parse(raw_key)?;
        let _op = self.op_lock.lock().await;
        let device = self.device.device_id();
        let stored = self.store.get();

        if let Some(record) = &stored {
            if record.license_key == key && record.is_bound_to(&device) {
                debug!(key = %key.masked(), "Key already bound to this device");
                return Ok(ActivationOutcome::Activated {
                    plan_type: record.plan_type.clone(),
                });
            }
        }

        let pending = self.pending().clone().filter(|p| p.key == key);
        if pending.as_ref().is_some_and(|p| !p.transfer_available) {
            debug!(key = %key.masked(), "Transfer already refused for this key");
            return Ok(ActivationOutcome::TransferLimitReached);
        }

        let outcome = {
            let _phase = self.enter(Phase::Transferring);
            self.authority.transfer(&key, &device).await
        };

        match &outcome {
            ActivationOutcome::Activated { plan_type } => {
                let now = self.clock.now();
                let record = match stored {
                    Some(mut record) if record.license_key == key => {
                        record.rebind(device, now);
                        if record.plan_type.is_none() {
                            record.plan_type = plan_type.clone();
                        }
                        record
                    }
                    _ => LicenseRecord::new(
                        key.clone(),
                        device,
                        now,
                        plan_type.clone().or(pending.and_then(|p| p.plan_type)),
                    ),
                };
                self.store.put(&record)?;
                *self.pending() = None;
                info!(key = %key.masked(), "License transferred to this device");
            }
            ActivationOutcome::TransferLimitReached => {
                *self.pending() = Some(PendingTransfer {
                    key: key.clone(),
                    plan_type: pending.and_then(|p| p.plan_type),
                    transfer_available: false,
                });
                warn!(key = %key.masked(), "Transfer limit reached");
            }
            other => {
                warn!(key = %key.masked(), outcome = other.label(), "Transfer not applied");
            }
        }
        Ok(outcome)
    }

    /// Imports a license file.
    ///
    /// A file bound to this device is accepted without any network call. A
    /// file bound elsewhere becomes a pending transfer; nothing is written
    /// until the transfer succeeds.
    pub async fn import_license_file(&self, bytes: &[u8]) -> LicenseResult<ActivationOutcome> {
        let file = LicenseFile::parse(bytes)?;
        let _op = self.op_lock.lock().await;
        let device = self.device.device_id();

        if file.device_id == device {
            let record = LicenseRecord::new(
                file.license_key,
                device,
                file.activated_at.unwrap_or_else(|| self.clock.now()),
                file.plan_type,
            );
            self.store.put(&record)?;
            *self.pending() = None;
            info!(key = %record.license_key.masked(), "License file imported");
            return Ok(ActivationOutcome::Activated {
                plan_type: record.plan_type,
            });
        }

        info!(
            key = %file.license_key.masked(),
            "License file is bound to another device"
        );
        *self.pending() = Some(PendingTransfer {
            key: file.license_key,
            plan_type: file.plan_type,
            transfer_available: true,
        });
        Ok(ActivationOutcome::DeviceMismatch {
            requires_transfer: true,
        })
    }

    /// Starts the trial on this device.
    pub fn start_trial(&self, raw_key: &str) -> LicenseResult<TrialRecord> {
        self.trial.start(raw_key)
    }

    /// Deletes the license record and forgets any pending transfer.
    ///
    /// For testing and support resets. The trial-used marker survives.
    pub async fn remove_license(&self) -> LicenseResult<()> {
        let _op = self.op_lock.lock().await;
        self.store.clear()?;
        *self.pending() = None;
        info!("License removed");
        Ok(())
    }

    fn enter(&self, phase: Phase) -> PhaseGuard<'_> {
        *self.phase() = phase;
        PhaseGuard { phase: &self.phase }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingTransfer>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn authority_for(config: &LicenseConfig) -> LicenseResult<Arc<dyn ActivationAuthority>> {
    if config.offline_mode {
        return Ok(Arc::new(LocalAuthority::new()));
    }

    #[cfg(feature = "online")]
    {
        Ok(Arc::new(crate::http::HttpAuthority::new(config)?))
    }

    #[cfg(not(feature = "online"))]
    {
        Err(crate::error::LicenseError::Config(
            "online activation is not compiled in; enable offline_mode".to_string(),
        ))
    }
}

impl std::fmt::Debug for LicenseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LicenseManager")
            .field("phase", &*self.phase())
            .finish_non_exhaustive()
    }
}
