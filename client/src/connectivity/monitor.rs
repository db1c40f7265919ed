use super::ConnectionState;
use crate::listeners::{ListenerId, Listeners};
use tokio::sync::watch;

/// Last-state-wins holder of the current [`ConnectionState`].
///
/// Listeners are called once per actual change, in registration order, and
/// once on registration with the current state. Async consumers can use
/// [`subscribe`](Self::subscribe) instead; a watch receiver only ever sees
/// the latest state, so rapid flapping is coalesced.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    state: watch::Sender<ConnectionState>,
    listeners: Listeners<ConnectionState>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectionState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            listeners: Listeners::new(),
        }
    }

    /// Create a monitor from the host's current online signal.
    pub fn from_signal(online: bool) -> Self {
        Self::new(ConnectionState::from(online))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Move to `next`. Returns whether the state changed.
    pub fn set_state(&self, next: ConnectionState) -> bool {
        let mut previous = next;
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            previous = *current;
            *current = next;
            true
        });

        if changed {
            tracing::info!(from = %previous, to = %next, "connection state changed");
            self.listeners.notify(&next);
        }
        changed
    }

    /// Apply the host's online/offline signal.
    pub fn report_signal(&self, online: bool) -> bool {
        self.set_state(ConnectionState::from(online))
    }

    /// A receiver that observes every later state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Register a listener and immediately call it with the current state.
    pub fn add_listener(
        &self,
        listener: impl Fn(&ConnectionState) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.listeners.add(listener);
        self.listeners.notify_one(id, &self.state());
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(ConnectionState::Online)
    }
}
