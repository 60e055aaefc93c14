//! Session Store
//!
//! ```text
//! Uninitialized
//!   ↓ bootstrap()
//! Loading
//!   ↓ provider resolves (errors resolve to Absent)
//! Present(session) ⇄ Absent      (every provider change notification)
//! ```
//!
//! The store is the only writer of the session value. Everyone else reads
//! it through [`SessionStore::current`] or listens via
//! [`SessionStore::subscribe`].

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use raqamly_backend::{AuthEvent, AuthProvider, ListenerRegistry, Session, Subscription};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// `bootstrap` has not been called
    Uninitialized,
    /// Waiting for the provider's initial answer
    Loading,
    Present(Session),
    Absent,
}

impl SessionStatus {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionStatus::Present(session) => Some(session),
            _ => None,
        }
    }

    /// True once the store knows whether a session exists
    pub fn is_resolved(&self) -> bool {
        matches!(self, SessionStatus::Present(_) | SessionStatus::Absent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Loading => "loading",
            SessionStatus::Present(_) => "present",
            SessionStatus::Absent => "absent",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct StoreInner {
    auth: Arc<dyn AuthProvider>,
    status: RwLock<SessionStatus>,
    listeners: ListenerRegistry<Option<Session>>,
    /// Keeps "write status, notify listeners" atomic across writers
    order: ReentrantMutex<()>,
    provider_subscription: Mutex<Option<Subscription>>,
    bootstrap_started: AtomicBool,
    closed: AtomicBool,
}

impl StoreInner {
    fn apply(&self, session: Option<Session>, origin: &'static str) {
        let _order = self.order.lock();

        if self.closed.load(Ordering::SeqCst) {
            tracing::debug!(origin, "Session store closed, discarding update");
            return;
        }

        *self.status.write() = match &session {
            Some(session) => SessionStatus::Present(session.clone()),
            None => SessionStatus::Absent,
        };

        tracing::debug!(
            origin,
            user_id = session.as_ref().map(|s| s.user.id.as_str()).unwrap_or("-"),
            "Session updated"
        );

        self.listeners.emit(&session);
    }
}

/// Process-wide holder of the current session. Clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    /// Create a store that follows `auth`'s change notifications from now
    /// until [`close`](Self::close).
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        let inner = Arc::new(StoreInner {
            auth: Arc::clone(&auth),
            status: RwLock::new(SessionStatus::Uninitialized),
            listeners: ListenerRegistry::new(),
            order: ReentrantMutex::new(()),
            provider_subscription: Mutex::new(None),
            bootstrap_started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        // Weak: the provider owns the listener, the store owns the provider
        let weak = Arc::downgrade(&inner);
        let subscription = auth.on_change(Box::new(move |event: &AuthEvent| {
            if let Some(inner) = weak.upgrade() {
                tracing::debug!(event = %event.kind, "Auth state changed");
                inner.apply(event.session.clone(), "provider");
            }
        }));
        *inner.provider_subscription.lock() = Some(subscription);

        Self { inner }
    }

    /// Fetch the provider's current session. Runs once; later calls return
    /// [`current`](Self::current) without touching the provider.
    ///
    /// A provider error resolves to "no session" rather than failing. A
    /// result that arrives after [`close`](Self::close) is discarded.
    pub async fn bootstrap(&self) -> Option<Session> {
        if self.inner.bootstrap_started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Session store already bootstrapped");
            return self.current();
        }

        {
            let mut status = self.inner.status.write();
            if *status == SessionStatus::Uninitialized {
                *status = SessionStatus::Loading;
            }
        }

        let session = match self.inner.auth.get_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Session bootstrap failed, continuing signed out");
                None
            }
        };

        if self.is_closed() {
            tracing::debug!("Session store closed during bootstrap, discarding result");
            return None;
        }

        tracing::info!(signed_in = session.is_some(), "Session bootstrap resolved");
        self.inner.apply(session.clone(), "bootstrap");
        session
    }

    /// Register `on_change`, called with the new value after every update
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(&Option<Session>) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(on_change)
    }

    /// Last known session. Never blocks on the provider.
    pub fn current(&self) -> Option<Session> {
        self.inner.status.read().session().cloned()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.status.read().clone()
    }

    pub fn is_present(&self) -> bool {
        matches!(*self.inner.status.read(), SessionStatus::Present(_))
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.inner.auth
    }

    /// Stop following the provider and drop every listener
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(subscription) = self.inner.provider_subscription.lock().take() {
            subscription.unsubscribe();
        }
        self.inner.listeners.clear();
        tracing::debug!("Session store closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}
