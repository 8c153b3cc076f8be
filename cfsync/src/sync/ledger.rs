//! Registration ledger
//!
//! Tracks which media handles are under synchronization, keyed by handle
//! identity. Entries hold `Weak` references: the ledger never keeps a handle
//! alive, and a handle dropped by its owner reads as detached.
//!
//! Each entry owns its cleanup hooks (a watcher task listening for "ended"
//! and, where available, detachment). Dropping the entry releases them.

use crate::media::{MediaHandle, SharedHandle};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::COMPONENT;

/// Identity of a tracked handle (address of its shared allocation)
///
/// Stable while any `Weak` to the allocation exists, which the ledger
/// guarantees for as long as the entry is present.
pub(crate) type HandleKey = usize;

pub(crate) fn handle_key(handle: &SharedHandle) -> HandleKey {
    Arc::as_ptr(handle) as *const () as usize
}

/// Why a cleanup hook fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Teardown {
    Ended,
    Detached,
}

impl Teardown {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Teardown::Ended => "ended",
            Teardown::Detached => "detached",
        }
    }
}

/// Observation hooks attached to one tracked handle
pub(crate) struct CleanupHooks {
    watcher: JoinHandle<()>,
    observing_attachment: bool,
}

impl CleanupHooks {
    /// Subscribe to the handle's lifecycle signals and spawn the watcher
    ///
    /// `on_teardown` runs at most once. Attachment observation failing to set
    /// up is tolerated: the hook degrades to "ended" only.
    pub(crate) fn attach<F>(rt: &Handle, handle: &SharedHandle, on_teardown: F) -> Self
    where
        F: FnOnce(Teardown) + Send + 'static,
    {
        let ended = handle.subscribe_ended();
        let attachment = match handle.observe_attachment() {
            Ok(rx) => Some(rx),
            Err(e) => {
                debug!(component = COMPONENT, error = %e, "Attachment observer setup failed");
                None
            }
        };
        let observing_attachment = attachment.is_some();

        let watcher = rt.spawn(async move {
            let reason = tokio::select! {
                _ = wait_for_ended(ended) => Teardown::Ended,
                _ = wait_for_detach(attachment) => Teardown::Detached,
            };
            trace!(component = COMPONENT, reason = reason.as_str(), "Cleanup hook fired");
            on_teardown(reason);
        });

        Self {
            watcher,
            observing_attachment,
        }
    }

    pub(crate) fn observing_attachment(&self) -> bool {
        self.observing_attachment
    }
}

impl Drop for CleanupHooks {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}

async fn wait_for_ended(mut ended: broadcast::Receiver<()>) {
    match ended.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        // Sender gone with the handle; the liveness sweep covers that case
        Err(broadcast::error::RecvError::Closed) => std::future::pending().await,
    }
}

async fn wait_for_detach(attachment: Option<watch::Receiver<bool>>) {
    let Some(mut attached) = attachment else {
        return std::future::pending().await;
    };
    loop {
        if attached.changed().await.is_err() {
            return std::future::pending().await;
        }
        if !*attached.borrow_and_update() {
            return;
        }
    }
}

/// One handle under synchronization
pub(crate) struct TrackedElement {
    pub(crate) handle: Weak<dyn MediaHandle>,
    /// Timeline position elapsed time is measured against (seconds)
    pub(crate) start_time: f64,
    /// Position minus start time at registration; bookkeeping only
    pub(crate) start_offset: f64,
    pub(crate) cleanup: CleanupHooks,
}

/// Snapshot row used by the check cycle
pub(crate) struct LedgerEntry {
    pub(crate) key: HandleKey,
    pub(crate) handle: Weak<dyn MediaHandle>,
    pub(crate) start_time: f64,
}

/// Mapping handle → tracked element
#[derive(Default)]
pub(crate) struct Ledger {
    entries: HashMap<HandleKey, TrackedElement>,
}

impl Ledger {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn contains(&self, key: HandleKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub(crate) fn get(&self, key: HandleKey) -> Option<&TrackedElement> {
        self.entries.get(&key)
    }

    pub(crate) fn get_mut(&mut self, key: HandleKey) -> Option<&mut TrackedElement> {
        self.entries.get_mut(&key)
    }

    pub(crate) fn insert(&mut self, key: HandleKey, element: TrackedElement) {
        self.entries.insert(key, element);
    }

    /// Remove an entry; its cleanup hooks are released when it drops
    pub(crate) fn remove(&mut self, key: HandleKey) -> Option<TrackedElement> {
        self.entries.remove(&key)
    }

    /// Release every entry and its cleanup hooks
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn snapshot(&self) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .map(|(key, element)| LedgerEntry {
                key: *key,
                handle: element.handle.clone(),
                start_time: element.start_time,
            })
            .collect()
    }
}
