//! Auth gate: decides what the app may render
//!
//! ```text
//! mount() ─→ Loading ─(bootstrap resolves)─→ Ready(public | protected)
//!                                              ↑ every session change
//! ```
//!
//! The gate never caches the session. Each render reads
//! [`SessionStore::current`] and derives the [`RouteSet`] from it.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use raqamly_backend::Subscription;
use raqamly_navigation::{Route, RouteSet};
use raqamly_session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateView {
    /// Waiting for the initial session fetch; nothing else is shown
    Loading,
    Ready(RouteSet),
}

impl GateView {
    pub fn route_set(&self) -> Option<RouteSet> {
        match self {
            GateView::Loading => None,
            GateView::Ready(routes) => Some(*routes),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, GateView::Loading)
    }
}

impl std::fmt::Display for GateView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateView::Loading => f.write_str("loading"),
            GateView::Ready(routes) => f.write_str(routes.name()),
        }
    }
}

struct GateInner {
    store: SessionStore,
    loading: AtomicBool,
    mounted: AtomicBool,
    unmounted: AtomicBool,
    subscription: Mutex<Option<Subscription>>,
    views: watch::Sender<GateView>,
    renders: AtomicUsize,
}

impl GateInner {
    fn render(&self) -> GateView {
        let view = if self.loading.load(Ordering::SeqCst) {
            GateView::Loading
        } else {
            GateView::Ready(RouteSet::for_session(self.store.is_present()))
        };

        self.renders.fetch_add(1, Ordering::SeqCst);
        let previous = self.views.send_replace(view);
        if previous != view {
            tracing::info!(view = %view, "Auth gate view changed");
        }
        view
    }
}

/// Root controller gating the whole app on session state. Clones share
/// state; mount once per app lifetime.
#[derive(Clone)]
pub struct AuthGate {
    inner: Arc<GateInner>,
}

impl AuthGate {
    pub fn new(store: SessionStore) -> Self {
        let (views, _) = watch::channel(GateView::Loading);
        Self {
            inner: Arc::new(GateInner {
                store,
                loading: AtomicBool::new(true),
                mounted: AtomicBool::new(false),
                unmounted: AtomicBool::new(false),
                subscription: Mutex::new(None),
                views,
                renders: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to session changes, then wait for the initial fetch.
    ///
    /// Returns the first resolved view, or [`GateView::Loading`] when the
    /// gate was unmounted before the fetch finished.
    pub async fn mount(&self) -> GateView {
        if self.inner.mounted.swap(true, Ordering::SeqCst) {
            return self.view();
        }

        // Subscribed before bootstrap so no change between resolution and
        // subscription can be missed
        let weak = Arc::downgrade(&self.inner);
        let subscription = self.inner.store.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.render();
            }
        });
        *self.inner.subscription.lock() = Some(subscription);

        self.inner.render();
        self.inner.store.bootstrap().await;

        if self.inner.unmounted.load(Ordering::SeqCst) {
            tracing::debug!("Auth gate unmounted before bootstrap resolved");
            return GateView::Loading;
        }

        self.inner.loading.store(false, Ordering::SeqCst);
        self.inner.render()
    }

    /// Release the change subscription and close the store. Results that
    /// arrive afterwards are discarded.
    pub fn unmount(&self) {
        if self.inner.unmounted.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.unsubscribe();
        }
        self.inner.store.close();
        tracing::debug!("Auth gate unmounted");
    }

    /// Re-render from the current session
    pub fn render(&self) -> GateView {
        self.inner.render()
    }

    /// Last rendered view
    pub fn view(&self) -> GateView {
        *self.inner.views.borrow()
    }

    /// Receiver notified on every render
    pub fn views(&self) -> watch::Receiver<GateView> {
        self.inner.views.subscribe()
    }

    /// View for `path` under the last rendered route set; `None` while
    /// loading or when the protected set has no such page
    pub fn route_for(&self, path: &str) -> Option<Route> {
        self.view().route_set()?.resolve(path)
    }

    pub fn render_count(&self) -> usize {
        self.inner.renders.load(Ordering::SeqCst)
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst) && !self.inner.unmounted.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }
}
