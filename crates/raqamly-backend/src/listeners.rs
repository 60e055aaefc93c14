//! Observer list with disposable subscriptions
//!
//! Emission is serialized: listeners see values one at a time, in the order
//! `emit` was called. The lock is re-entrant, so a listener may itself cause
//! a nested emission on the same thread.

use parking_lot::{ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

struct Listeners<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

pub struct ListenerRegistry<T> {
    listeners: Arc<RwLock<Listeners<T>>>,
    emit_lock: Arc<ReentrantMutex<()>>,
}

impl<T: 'static> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
            emit_lock: Arc::new(ReentrantMutex::new(())),
        }
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is released or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut listeners = self.listeners.write();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push(Entry {
                id,
                active: Arc::clone(&active),
                callback: Arc::new(callback),
            });
            id
        };

        let registry: Weak<RwLock<Listeners<T>>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            active.store(false, Ordering::SeqCst);
            if let Some(listeners) = registry.upgrade() {
                listeners.write().entries.retain(|entry| entry.id != id);
            }
        })
    }

    /// Deliver `value` to every live listener in registration order
    pub fn emit(&self, value: &T) {
        let _order = self.emit_lock.lock();

        // Snapshot so listeners can (un)subscribe while being called
        let snapshot: Vec<(Arc<AtomicBool>, Callback<T>)> = self
            .listeners
            .read()
            .entries
            .iter()
            .map(|entry| (Arc::clone(&entry.active), Arc::clone(&entry.callback)))
            .collect();

        for (active, callback) in snapshot {
            if active.load(Ordering::SeqCst) {
                callback(value);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every listener. Outstanding subscriptions become no-ops.
    pub fn clear(&self) {
        let mut listeners = self.listeners.write();
        for entry in &listeners.entries {
            entry.active.store(false, Ordering::SeqCst);
        }
        listeners.entries.clear();
    }
}

impl<T: 'static> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ListenerRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            emit_lock: Arc::clone(&self.emit_lock),
        }
    }
}

/// Handle to a registered listener.
///
/// Releasing it (explicitly or by drop) guarantees the listener is not
/// invoked for any later emission.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    pub fn is_active(&self) -> bool {
        self.release.is_some()
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
