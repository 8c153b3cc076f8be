//! Process-wide sync manager
//!
//! Playback code that does not own the manager reaches it through these
//! functions. Every wrapper is a silent no-op while nothing is installed.

use crate::error::{Error, Result};
use crate::media::SharedHandle;
use crate::sync::SyncManager;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

static MANAGER: Lazy<RwLock<Option<SyncManager>>> = Lazy::new(|| RwLock::new(None));

/// Install `manager` as the process-wide instance
///
/// Fails with [`Error::AlreadyInstalled`] while another manager is installed.
pub fn install(manager: SyncManager) -> Result<()> {
    let mut slot = MANAGER.write();
    if slot.is_some() {
        return Err(Error::AlreadyInstalled);
    }
    *slot = Some(manager);
    debug!("Sync manager installed");
    Ok(())
}

/// Remove and return the installed manager (it is not destroyed)
pub fn uninstall() -> Option<SyncManager> {
    let manager = MANAGER.write().take();
    if manager.is_some() {
        debug!("Sync manager uninstalled");
    }
    manager
}

/// The installed manager, if any
pub fn get() -> Option<SyncManager> {
    MANAGER.read().clone()
}

pub fn is_sync_active() -> bool {
    get().is_some_and(|manager| manager.is_currently_active())
}

pub fn sync_tracked_count() -> usize {
    get().map_or(0, |manager| manager.tracked_count())
}

/// Register a handle with the installed manager; absent handles are ignored
pub fn register_sync_element(handle: Option<&SharedHandle>, start_time: f64) {
    if let (Some(manager), Some(handle)) = (get(), handle) {
        manager.register_element(handle, start_time);
    }
}

/// Unregister a handle from the installed manager; absent handles are ignored
pub fn unregister_sync_element(handle: Option<&SharedHandle>) {
    if let (Some(manager), Some(handle)) = (get(), handle) {
        manager.unregister_element(handle);
    }
}
