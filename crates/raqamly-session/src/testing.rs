//! Test doubles shared by the store and guard tests

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use raqamly_backend::{
    AuthListener, AuthProvider, MemoryBackend, Result, Session, Subscription, User,
};

pub(crate) fn session_expiring_in(lifetime: Duration) -> Session {
    Session {
        access_token: "restored-access".to_string(),
        refresh_token: "restored-refresh".to_string(),
        expires_at: Utc::now() + lifetime,
        user: User {
            id: "user-1".to_string(),
            email: "owner@example.com".to_string(),
        },
    }
}

/// Wraps a [`MemoryBackend`], counting calls and optionally holding
/// `get_session` answers until the gate is notified. A yielding provider
/// suspends every refresh once so overlapping callers interleave.
pub(crate) struct ScriptedProvider {
    inner: Arc<MemoryBackend>,
    gate: Option<Arc<Notify>>,
    yield_on_refresh: bool,
    get_session_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(inner: Arc<MemoryBackend>) -> Self {
        Self {
            inner,
            gate: None,
            yield_on_refresh: false,
            get_session_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub(crate) fn yielding(mut self) -> Self {
        self.yield_on_refresh = true;
        self
    }

    pub(crate) fn gate(&self) -> Arc<Notify> {
        self.gate.clone().unwrap_or_else(|| Arc::new(Notify::new()))
    }

    pub(crate) fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProvider for ScriptedProvider {
    async fn get_session(&self) -> Result<Option<Session>> {
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        // Answer is computed now, delivered when the gate opens
        let answer = self.inner.get_session().await;
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        answer
    }

    fn on_change(&self, listener: AuthListener) -> Subscription {
        self.inner.on_change(listener)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.inner.sign_in_with_password(email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<Session> {
        self.inner.sign_up(email, password, metadata).await
    }

    async fn sign_out(&self) -> Result<()> {
        self.inner.sign_out().await
    }

    async fn refresh_session(&self, refresh_token: Option<&str>) -> Result<Session> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.yield_on_refresh {
            tokio::task::yield_now().await;
        }
        self.inner.refresh_session(refresh_token).await
    }

    async fn get_user(&self) -> Result<Option<User>> {
        self.inner.get_user().await
    }
}
