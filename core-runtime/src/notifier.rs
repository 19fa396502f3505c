//! Change notification for UI listeners.
//!
//! A [`StateNotifier`] holds a set of callbacks and invokes all of them after
//! every state transition. Callbacks receive no payload; listeners read the
//! current state from whoever owns the notifier. Invocation order is
//! unspecified.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`StateNotifier::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct StateNotifier {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<ListenerId, Listener>>,
}

impl StateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.lock() {
            Ok(mut listeners) => {
                listeners.insert(id, Arc::new(listener));
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, Arc::new(listener));
            }
        }
        id
    }

    /// Returns `true` if the listener was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.remove(&id).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&id).is_some(),
        }
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.lock() {
            Ok(listeners) => listeners.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Invoke every registered listener.
    ///
    /// The lock is released before callbacks run, so a listener may add or
    /// remove listeners (including itself).
    pub fn notify_listeners(&self) {
        let snapshot: Vec<Listener> = match self.listeners.lock() {
            Ok(listeners) => listeners.values().cloned().collect(),
            Err(poisoned) => {
                warn!("Listener registry poisoned, continuing with last state");
                poisoned.into_inner().values().cloned().collect()
            }
        };

        for listener in snapshot {
            listener();
        }
    }
}

impl std::fmt::Debug for StateNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
