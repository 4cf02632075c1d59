mod common;

use checkwright_license::store::keys;
use checkwright_license::{
    Entitlement, KeyValueStore, KvOp, LicenseError, LicenseRecord, TrialRecord, TrialState,
};
use chrono::Duration;
use common::{
    activated, epoch, key, other_device, this_device, Harness, ScriptedAuthority, KEY, OTHER_KEY,
};

// ── TrialRecord ──────────────────────────────────────────────────

#[test]
fn trial_started_fifteen_days_ago_is_expired() {
    let now = epoch();
    let record = TrialRecord {
        trial_key: key(KEY),
        started_at: now - Duration::days(15),
        bound_device_id: this_device(),
    };
    assert!(record.is_expired(now, Duration::days(14)));
}

#[test]
fn trial_within_duration_is_not_expired() {
    let now = epoch();
    let record = TrialRecord {
        trial_key: key(KEY),
        started_at: now - Duration::days(13),
        bound_device_id: this_device(),
    };
    assert!(!record.is_expired(now, Duration::days(14)));
    assert_eq!(record.expires_at(Duration::days(14)), now + Duration::days(1));
}

// ── TrialCompanion ───────────────────────────────────────────────

#[test]
fn no_trial_by_default() {
    let h = Harness::new(ScriptedAuthority::default());
    assert_eq!(h.manager.trial().state(None), TrialState::NoTrial);
}

#[test]
fn started_trial_is_active_and_entitled() {
    let h = Harness::new(ScriptedAuthority::default());
    let record = h.manager.start_trial("abcd1234efgh5678").unwrap();
    assert_eq!(record.started_at, epoch());
    assert_eq!(record.bound_device_id, this_device());

    let expires_at = epoch() + Duration::days(14);
    assert_eq!(
        h.manager.trial().state(None),
        TrialState::Active { expires_at }
    );
    assert_eq!(h.manager.entitlement(), Entitlement::Trial { expires_at });
    assert!(h.manager.is_entitled());
    assert!(!h.manager.is_licensed());
}

#[test]
fn trial_expires_after_duration() {
    let h = Harness::new(ScriptedAuthority::default());
    h.manager.start_trial(KEY).unwrap();

    h.clock.advance(Duration::days(15));
    assert_eq!(h.manager.trial().state(None), TrialState::Expired);
    assert_eq!(h.manager.entitlement(), Entitlement::TrialExpired);
    assert!(!h.manager.is_entitled());
}

#[test]
fn expiry_ignores_stored_flags() {
    let h = Harness::new(ScriptedAuthority::default());
    // A stored record with an extra "expired": false field must not matter.
    let json = format!(
        r#"{{"trial_key":"{KEY}","started_at":"{}","bound_device_id":"{}","is_expired":false}}"#,
        (epoch() - Duration::days(15)).to_rfc3339(),
        this_device()
    );
    h.kv.apply(&[KvOp::set(keys::TRIAL_RECORD, json)]).unwrap();

    assert_eq!(h.manager.trial().state(None), TrialState::Expired);
}

#[test]
fn trial_cannot_be_started_twice() {
    let h = Harness::new(ScriptedAuthority::default());
    h.manager.start_trial(KEY).unwrap();
    let err = h.manager.start_trial("WXYZ-9876-MNOP-5432").unwrap_err();
    assert!(matches!(err, LicenseError::TrialUnavailable(_)));
}

#[test]
fn expired_trial_cannot_restart_after_record_is_cleared() {
    let h = Harness::new(ScriptedAuthority::default());
    h.manager.start_trial(KEY).unwrap();
    h.clock.advance(Duration::days(20));

    h.kv.apply(&[KvOp::remove(keys::TRIAL_RECORD)]).unwrap();

    assert_eq!(h.manager.trial().state(None), TrialState::Expired);
    let err = h.manager.start_trial(KEY).unwrap_err();
    assert!(matches!(err, LicenseError::TrialUnavailable(_)));
}

#[test]
fn trial_rejects_malformed_key() {
    let h = Harness::new(ScriptedAuthority::default());
    let err = h.manager.start_trial("trial").unwrap_err();
    assert!(matches!(err, LicenseError::InvalidKeyFormat(_)));
    assert!(h.kv.snapshot().unwrap().is_empty());
}

#[test]
fn trial_bound_to_other_device_does_not_count() {
    let h = Harness::new(ScriptedAuthority::default());
    let record = TrialRecord {
        trial_key: key(KEY),
        started_at: epoch(),
        bound_device_id: other_device(),
    };
    h.kv.apply(&[KvOp::set(
        keys::TRIAL_RECORD,
        serde_json::to_string(&record).unwrap(),
    )])
    .unwrap();

    assert_eq!(h.manager.trial().state(None), TrialState::NoTrial);
}

#[test]
fn trial_record_from_other_device_blocks_new_trial() {
    let h = Harness::new(ScriptedAuthority::default());
    let foreign = TrialRecord {
        trial_key: key(KEY),
        started_at: epoch(),
        bound_device_id: other_device(),
    };
    h.kv.apply(&[KvOp::set(
        keys::TRIAL_RECORD,
        serde_json::to_string(&foreign).unwrap(),
    )])
    .unwrap();
    let before = h.kv.snapshot().unwrap();

    let err = h.manager.start_trial(OTHER_KEY).unwrap_err();
    assert!(matches!(err, LicenseError::TrialUnavailable(_)));
    assert_eq!(h.kv.snapshot().unwrap(), before);
    assert_eq!(h.manager.trial().record(), Some(foreign));
}

#[test]
fn corrupt_trial_record_is_no_trial() {
    let h = Harness::new(ScriptedAuthority::default());
    h.kv.apply(&[KvOp::set(keys::TRIAL_RECORD, "???")]).unwrap();
    assert_eq!(h.manager.trial().state(None), TrialState::NoTrial);
}

#[tokio::test]
async fn activating_trial_key_converts_trial() {
    let h = Harness::new(ScriptedAuthority::new([activated()]));
    h.manager.start_trial(KEY).unwrap();
    h.manager.activate(KEY).await.unwrap();

    let license = h.store.get();
    assert_eq!(h.manager.trial().state(license.as_ref()), TrialState::Converted);
    assert_eq!(h.manager.entitlement(), Entitlement::Licensed);
}

#[tokio::test]
async fn removing_license_keeps_trial_marker() {
    let h = Harness::new(ScriptedAuthority::new([activated()]));
    h.manager.start_trial(KEY).unwrap();
    h.manager.activate(KEY).await.unwrap();
    h.manager.remove_license().await.unwrap();

    assert!(h.store.trial_used(&this_device()));
    assert!(h.manager.start_trial(KEY).is_err());
}

#[test]
fn active_trial_outranks_pending_transfer() {
    let h = Harness::new(ScriptedAuthority::default());
    h.store
        .put(&LicenseRecord::new(key(KEY), other_device(), epoch(), None))
        .unwrap();
    h.manager.start_trial("WXYZ-9876-MNOP-5432").unwrap();

    assert!(h.manager.is_entitled());
    assert!(matches!(h.manager.entitlement(), Entitlement::Trial { .. }));
}

#[test]
fn pending_transfer_outranks_expired_trial() {
    let h = Harness::new(ScriptedAuthority::default());
    h.manager.start_trial("WXYZ-9876-MNOP-5432").unwrap();
    h.clock.advance(Duration::days(30));
    h.store
        .put(&LicenseRecord::new(key(KEY), other_device(), epoch(), None))
        .unwrap();

    assert_eq!(
        h.manager.entitlement(),
        Entitlement::RequiresTransfer {
            transfer_available: true
        }
    );
}

#[test]
fn custom_trial_duration() {
    let h = Harness::new(ScriptedAuthority::default());
    let manager = h.manager.with_trial_duration(Duration::days(3));
    manager.start_trial(KEY).unwrap();
    h.clock.advance(Duration::days(4));
    assert_eq!(manager.trial().state(None), TrialState::Expired);
}
