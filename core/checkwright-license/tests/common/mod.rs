//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use checkwright_license::{
    ActivationAuthority, ActivationOutcome, DeviceId, FixedDevice, LicenseKey, LicenseManager,
    LicenseStore, ManualClock, MemoryKv,
};
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const KEY: &str = "ABCD-1234-EFGH-5678";
pub const OTHER_KEY: &str = "WXYZ-9876-MNOP-5432";

/// Device id for "this" machine in tests.
pub fn this_device() -> DeviceId {
    DeviceId::parse("0123456789abcdef0123456789abcdef").unwrap()
}

/// Device id for some other machine.
pub fn other_device() -> DeviceId {
    DeviceId::parse("fedcba9876543210fedcba9876543210").unwrap()
}

pub fn key(raw: &str) -> LicenseKey {
    LicenseKey::parse(raw).unwrap()
}

/// A fixed starting point for clocks.
pub fn epoch() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

/// Authority double that replays scripted outcomes and counts calls.
#[derive(Default)]
pub struct ScriptedAuthority {
    outcomes: Mutex<VecDeque<ActivationOutcome>>,
    pub activate_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedAuthority {
    pub fn new(outcomes: impl IntoIterator<Item = ActivationOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.activate_calls.load(Ordering::SeqCst) + self.transfer_calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> ActivationOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ActivationOutcome::NetworkError("no scripted outcome".into()))
    }
}

#[async_trait]
impl ActivationAuthority for ScriptedAuthority {
    async fn activate(&self, _key: &LicenseKey, _device: &DeviceId) -> ActivationOutcome {
        self.activate_calls.fetch_add(1, Ordering::SeqCst);
        self.next().await
    }

    async fn transfer(&self, _key: &LicenseKey, _device: &DeviceId) -> ActivationOutcome {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.next().await
    }
}

pub fn activated() -> ActivationOutcome {
    ActivationOutcome::Activated {
        plan_type: Some("pro".into()),
    }
}

pub fn mismatch() -> ActivationOutcome {
    ActivationOutcome::DeviceMismatch {
        requires_transfer: true,
    }
}

/// Everything a manager test needs to poke at.
pub struct Harness {
    pub kv: Arc<MemoryKv>,
    pub store: LicenseStore,
    pub authority: Arc<ScriptedAuthority>,
    pub clock: Arc<ManualClock>,
    pub manager: LicenseManager,
}

impl Harness {
    pub fn new(authority: ScriptedAuthority) -> Self {
        Self::on_device(authority, this_device())
    }

    pub fn on_device(authority: ScriptedAuthority, device: DeviceId) -> Self {
        let kv = Arc::new(MemoryKv::new());
        Self::with_kv(kv, authority, device)
    }

    /// Builds a harness over an existing backend, e.g. to simulate a restart
    /// or a different machine reading the same data.
    pub fn with_kv(kv: Arc<MemoryKv>, authority: ScriptedAuthority, device: DeviceId) -> Self {
        let store = LicenseStore::new(kv.clone());
        let authority = Arc::new(authority);
        let clock = Arc::new(ManualClock::new(epoch()));
        let manager = LicenseManager::new(
            store.clone(),
            authority.clone(),
            Arc::new(FixedDevice(device)),
        )
        .with_clock(clock.clone());
        Self {
            kv,
            store,
            authority,
            clock,
            manager,
        }
    }
}
