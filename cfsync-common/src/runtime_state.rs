//! Crossfade runtime store
//!
//! Process-wide runtime flags describing the crossfade currently in flight.
//! Consumers observe changes through selector subscriptions: a selector
//! projects the state to a comparable value and the change callback runs only
//! when that projection changes.
//!
//! Callbacks run synchronously on the thread performing the mutation, after
//! the store lock has been released, so a callback may read the store.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Runtime crossfade flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossfadeRuntime {
    /// A crossfade transition is currently in progress
    pub busy: bool,
    /// The next crossfade has been triggered by the end-of-track check
    pub triggered: bool,
    /// The user requested the transition (skip with crossfade)
    pub manual_trigger: bool,
}

type Listener = Arc<dyn Fn(&CrossfadeRuntime, &CrossfadeRuntime) + Send + Sync>;

struct StoreInner {
    state: Mutex<CrossfadeRuntime>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: AtomicU64,
}

/// Shared crossfade runtime store
///
/// Cheap to clone; all clones observe the same state.
#[derive(Clone)]
pub struct RuntimeStore {
    inner: Arc<StoreInner>,
}

impl RuntimeStore {
    /// Create a store with default (idle) runtime flags
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(CrossfadeRuntime::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    /// Snapshot of the current runtime flags
    pub fn state(&self) -> CrossfadeRuntime {
        *self.inner.state.lock()
    }

    /// Whether a crossfade is currently in progress
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().busy
    }

    pub fn set_busy(&self, busy: bool) {
        self.update(|state| state.busy = busy);
    }

    pub fn set_triggered(&self, triggered: bool) {
        self.update(|state| state.triggered = triggered);
    }

    pub fn set_manual_trigger(&self, manual_trigger: bool) {
        self.update(|state| state.manual_trigger = manual_trigger);
    }

    /// Abort the crossfade in flight, clearing every runtime flag
    pub fn cancel_crossfade(&self) {
        self.update(|state| {
            state.busy = false;
            state.triggered = false;
            state.manual_trigger = false;
        });
    }

    /// Restore default runtime flags
    pub fn reset(&self) {
        self.update(|state| *state = CrossfadeRuntime::default());
    }

    /// Subscribe to changes of a projection of the runtime state
    ///
    /// `on_change(new, old)` is invoked after each mutation whose projected
    /// value differs from the previous projection. The subscription stays
    /// registered until cancelled or dropped.
    pub fn subscribe<T, S, F>(&self, selector: S, on_change: F) -> Subscription
    where
        T: PartialEq + Send + 'static,
        S: Fn(&CrossfadeRuntime) -> T + Send + Sync + 'static,
        F: Fn(T, T) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener = Arc::new(move |new, old| {
            let selected_new = selector(new);
            let selected_old = selector(old);
            if selected_new != selected_old {
                on_change(selected_new, selected_old);
            }
        });
        self.inner.listeners.lock().push((id, listener));
        trace!("RuntimeStore: listener {} subscribed", id);

        Subscription {
            store: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    fn update(&self, mutate: impl FnOnce(&mut CrossfadeRuntime)) {
        let (old, new) = {
            let mut state = self.inner.state.lock();
            let old = *state;
            mutate(&mut state);
            (old, *state)
        };

        if old == new {
            return;
        }

        // Snapshot listeners so callbacks may subscribe/cancel re-entrantly
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(&new, &old);
        }
    }
}

impl Default for RuntimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuntimeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeStore")
            .field("state", &self.state())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle to a store subscription
///
/// Cancelled explicitly with [`Subscription::cancel`] or implicitly on drop.
pub struct Subscription {
    store: Weak<StoreInner>,
    id: Option<u64>,
}

impl Subscription {
    /// Remove the listener from the store (idempotent)
    pub fn cancel(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(store) = self.store.upgrade() {
            store.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
            trace!("RuntimeStore: listener {} cancelled", id);
        }
    }

    /// Whether the listener is still registered
    pub fn is_active(&self) -> bool {
        self.id.is_some() && self.store.strong_count() > 0
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
