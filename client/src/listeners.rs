//! Observer registry with deterministic registration handles.

use std::sync::{Arc, Mutex, PoisonError};

/// Handle returned by [`Listeners::add`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    next_id: u64,
    entries: Vec<(ListenerId, Callback<T>)>,
}

/// Ordered set of callbacks receiving `&T`.
///
/// Delivery is synchronous and in registration order. Callbacks run outside
/// the registry lock, so they may add or remove listeners themselves; such
/// changes take effect from the next notification.
pub struct Listeners<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 0,
                entries: Vec::new(),
            }),
        }
    }

    /// Register a callback.
    pub fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, Arc::new(callback)));
        id
    }

    /// Unregister a callback. Returns `false` if the id is unknown.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _)| *entry != id);
        inner.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `value` to every registered callback.
    pub fn notify(&self, value: &T) {
        for callback in self.snapshot() {
            callback(value);
        }
    }

    /// Deliver `value` to a single callback, if still registered.
    pub fn notify_one(&self, id: ListenerId, value: &T) {
        let callback = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, callback)| Arc::clone(callback));
        if let Some(callback) = callback {
            callback(value);
        }
    }

    fn snapshot(&self) -> Vec<Callback<T>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
