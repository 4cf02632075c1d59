mod common;

use checkwright_license::{Entitlement, LicenseRecord, MIN_RECHECK_INTERVAL};
use common::{epoch, key, this_device, Harness, ScriptedAuthority, KEY};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn watch_publishes_initial_value() {
    let h = Harness::new(ScriptedAuthority::default());
    let manager = Arc::new(h.manager);

    let watch = manager.watch(Duration::from_secs(60));
    assert_eq!(watch.current(), Entitlement::Unlicensed);
}

#[tokio::test(start_paused = true)]
async fn watch_picks_up_store_changes_on_next_tick() {
    let h = Harness::new(ScriptedAuthority::default());
    let store = h.store.clone();
    let manager = Arc::new(h.manager);

    let mut watch = manager.watch(Duration::from_secs(60));
    store
        .put(&LicenseRecord::new(key(KEY), this_device(), epoch(), None))
        .unwrap();

    let next = tokio::time::timeout(Duration::from_secs(120), watch.changed())
        .await
        .unwrap();
    assert_eq!(next, Some(Entitlement::Licensed));
}

#[tokio::test(start_paused = true)]
async fn watch_notices_trial_expiry() {
    let h = Harness::new(ScriptedAuthority::default());
    let clock = h.clock.clone();
    let manager = Arc::new(h.manager);
    manager.start_trial(KEY).unwrap();

    let mut watch = manager.watch(Duration::from_secs(60));
    assert!(watch.current().is_entitled());

    clock.advance(chrono::Duration::days(15));
    let next = tokio::time::timeout(Duration::from_secs(120), watch.changed())
        .await
        .unwrap();
    assert_eq!(next, Some(Entitlement::TrialExpired));
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_the_task() {
    let h = Harness::new(ScriptedAuthority::default());
    let manager = Arc::new(h.manager);

    let mut watch = manager.watch(Duration::from_secs(1));
    watch.cancel();

    let next = tokio::time::timeout(Duration::from_secs(10), watch.changed())
        .await
        .unwrap();
    assert_eq!(next, None);
    assert!(watch.is_finished());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_watch_releases_the_manager() {
    let h = Harness::new(ScriptedAuthority::default());
    let manager = Arc::new(h.manager);

    let watch = manager.watch(Duration::from_secs(1));
    assert_eq!(Arc::strong_count(&manager), 2);
    drop(watch);

    // Let the runtime process the abort.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(Arc::strong_count(&manager), 1);
}

#[tokio::test(start_paused = true)]
async fn zero_interval_is_raised_to_minimum() {
    let h = Harness::new(ScriptedAuthority::default());
    let store = h.store.clone();
    let manager = Arc::new(h.manager);

    let mut watch = manager.watch(Duration::ZERO);
    store
        .put(&LicenseRecord::new(key(KEY), this_device(), epoch(), None))
        .unwrap();

    let next = tokio::time::timeout(MIN_RECHECK_INTERVAL * 3, watch.changed())
        .await
        .unwrap();
    assert_eq!(next, Some(Entitlement::Licensed));
    assert!(!watch.is_finished());
}
