//! Integration tests for the process-wide sync manager
//!
//! The installed manager is shared by the whole test binary, so every test
//! here runs under serial_test.

use cfsync::sim::SimulatedMedia;
use cfsync::{global, Error, SharedHandle, SyncManager};
use cfsync_common::RuntimeStore;
use serial_test::serial;

fn install_fresh() -> (RuntimeStore, SyncManager) {
    if let Some(previous) = global::uninstall() {
        previous.destroy();
    }
    let runtime = RuntimeStore::new();
    let manager = SyncManager::with_runtime(runtime.clone()).unwrap();
    global::install(manager.clone()).unwrap();
    (runtime, manager)
}

#[tokio::test]
#[serial]
async fn test_wrappers_are_noops_without_manager() {
    if let Some(previous) = global::uninstall() {
        previous.destroy();
    }
    let handle: SharedHandle = SimulatedMedia::playing(0.0);

    global::register_sync_element(Some(&handle), 0.0);
    global::unregister_sync_element(Some(&handle));

    assert!(global::get().is_none());
    assert!(!global::is_sync_active());
    assert_eq!(global::sync_tracked_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_second_install_rejected() {
    let (_runtime, manager) = install_fresh();
    let other = SyncManager::with_runtime(RuntimeStore::new()).unwrap();

    assert!(matches!(global::install(other), Err(Error::AlreadyInstalled)));
    assert!(global::get().is_some());

    global::uninstall();
    manager.destroy();
}

#[tokio::test]
#[serial]
async fn test_wrappers_reach_installed_manager() {
    let (runtime, manager) = install_fresh();
    let handle: SharedHandle = SimulatedMedia::playing(3.0);

    runtime.set_busy(true);
    assert!(global::is_sync_active());

    global::register_sync_element(Some(&handle), 0.0);
    global::register_sync_element(None, 0.0);
    assert_eq!(global::sync_tracked_count(), 1);
    assert!(manager.is_tracked(&handle));

    global::unregister_sync_element(None);
    assert_eq!(global::sync_tracked_count(), 1);

    global::unregister_sync_element(Some(&handle));
    assert_eq!(global::sync_tracked_count(), 0);

    runtime.set_busy(false);
    assert!(!global::is_sync_active());

    global::uninstall();
    manager.destroy();
}
