//! Pre-request session guard

use chrono::{Duration, Utc};

use raqamly_backend::Session;

use crate::error::SessionError;
use crate::store::SessionStore;
use crate::Result;

/// Sessions expiring within this many seconds are refreshed before use
pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;

/// Makes sure a usable session exists before an authenticated request.
///
/// Concurrent callers that both see a stale session each refresh; the
/// store keeps whichever refreshed session was applied last.
#[derive(Clone)]
pub struct SessionGuard {
    store: SessionStore,
    margin: Duration,
}

impl SessionGuard {
    pub fn new(store: SessionStore) -> Self {
        Self::with_margin(store, Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS))
    }

    pub fn with_margin(store: SessionStore, margin: Duration) -> Self {
        Self { store, margin }
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Whether `session` must be refreshed before use
    pub fn needs_refresh(&self, session: Option<&Session>) -> bool {
        match session {
            Some(session) => session.expires_within(self.margin, Utc::now()),
            None => true,
        }
    }

    /// Return a session valid for at least the margin, refreshing it when
    /// it is missing or close to expiry.
    ///
    /// On failure the store is left untouched; the caller decides whether
    /// to sign out.
    pub async fn ensure_valid(&self) -> Result<Session> {
        let current = self.store.current();

        if let Some(session) = current.as_ref() {
            if !self.needs_refresh(Some(session)) {
                return Ok(session.clone());
            }
        }

        tracing::debug!(
            has_session = current.is_some(),
            "Session missing or near expiry, refreshing"
        );

        let refresh_token = current.as_ref().map(|s| s.refresh_token.as_str());
        match self.store.auth().refresh_session(refresh_token).await {
            Ok(session) => {
                tracing::info!(user_id = %session.user.id, "Session refreshed");
                Ok(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed");
                Err(SessionError::AuthExpired(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{session_expiring_in, ScriptedProvider};
    use crate::SessionStatus;
    use raqamly_backend::{AuthProvider, MemoryBackend};
    use std::sync::Arc;

    async fn guarded(backend: Arc<MemoryBackend>) -> (SessionGuard, Arc<ScriptedProvider>) {
        let provider = Arc::new(ScriptedProvider::new(backend));
        let auth: Arc<dyn AuthProvider> = provider.clone();
        let store = SessionStore::new(auth);
        store.bootstrap().await;
        (SessionGuard::new(store), provider)
    }

    #[tokio::test]
    async fn test_fresh_session_is_returned_without_refresh() {
        let backend = Arc::new(MemoryBackend::new());
        let fresh = session_expiring_in(Duration::hours(1));
        backend.install_session(fresh.clone());

        let (guard, provider) = guarded(backend).await;
        assert_eq!(guard.ensure_valid().await.unwrap(), fresh);
        assert_eq!(guard.ensure_valid().await.unwrap(), fresh);
        assert_eq!(provider.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_near_expiry_session_is_refreshed_once() {
        let backend = Arc::new(MemoryBackend::new());
        let stale = session_expiring_in(Duration::seconds(30));
        backend.install_session(stale.clone());

        let (guard, provider) = guarded(backend).await;
        let refreshed = guard.ensure_valid().await.unwrap();

        assert_eq!(provider.refresh_calls(), 1);
        assert_ne!(refreshed.access_token, stale.access_token);
        assert_eq!(refreshed.user, stale.user);
        assert!(refreshed.expires_at - Utc::now() > guard.margin());
        assert_eq!(guard.store().current(), Some(refreshed.clone()));

        // Now fresh, so no second refresh
        assert_eq!(guard.ensure_valid().await.unwrap(), refreshed);
        assert_eq!(provider.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_refreshed() {
        let backend = Arc::new(MemoryBackend::new());
        backend.install_session(session_expiring_in(Duration::seconds(-10)));

        let (guard, provider) = guarded(backend).await;
        let refreshed = guard.ensure_valid().await.unwrap();

        assert_eq!(provider.refresh_calls(), 1);
        assert!(!refreshed.is_expired_at(Utc::now()));
    }

    #[tokio::test]
    async fn test_invalid_refresh_token_is_auth_expired() {
        let backend = Arc::new(MemoryBackend::new());
        let stale = session_expiring_in(Duration::seconds(10));
        backend.install_session(stale.clone());
        backend.revoke_refresh_token(&stale.refresh_token);

        let (guard, provider) = guarded(backend).await;
        let err = guard.ensure_valid().await.unwrap_err();

        assert!(matches!(err, SessionError::AuthExpired(_)));
        assert_eq!(err.to_string(), "Session expired, please sign in again");
        assert_eq!(provider.refresh_calls(), 1);
        // The guard never signs the user out on its own
        assert_eq!(guard.store().status(), SessionStatus::Present(stale));
    }

    #[tokio::test]
    async fn test_expired_session_with_revoked_token_is_auth_expired() {
        let backend = Arc::new(MemoryBackend::new());
        let expired = session_expiring_in(Duration::seconds(-1));
        backend.install_session(expired.clone());
        backend.revoke_refresh_token(&expired.refresh_token);

        let (guard, provider) = guarded(backend).await;
        let err = guard.ensure_valid().await.unwrap_err();

        assert!(matches!(err, SessionError::AuthExpired(_)));
        assert_eq!(provider.refresh_calls(), 1);
        // Still holds the expired session until someone signs out
        assert_eq!(guard.store().current(), Some(expired.clone()));
        assert_eq!(guard.store().status(), SessionStatus::Present(expired));
    }

    #[tokio::test]
    async fn test_overlapping_refreshes_both_succeed() {
        let backend = Arc::new(MemoryBackend::new());
        let stale = session_expiring_in(Duration::seconds(-1));
        backend.install_session(stale.clone());

        let provider = Arc::new(ScriptedProvider::new(backend).yielding());
        let auth: Arc<dyn AuthProvider> = provider.clone();
        let store = SessionStore::new(auth);
        store.bootstrap().await;
        let guard = SessionGuard::new(store);

        let (first, second) = tokio::join!(guard.ensure_valid(), guard.ensure_valid());
        let first = first.unwrap();
        let second = second.unwrap();

        // Both callers saw the stale session and went to the backend
        assert_eq!(provider.refresh_calls(), 2);
        assert_eq!(first, second);
        assert_ne!(first.refresh_token, stale.refresh_token);
        assert_eq!(guard.store().current(), Some(first));
    }

    #[tokio::test]
    async fn test_missing_session_attempts_refresh() {
        let backend = Arc::new(MemoryBackend::new());
        let (guard, provider) = guarded(backend).await;

        let err = guard.ensure_valid().await.unwrap_err();
        assert!(matches!(err, SessionError::AuthExpired(_)));
        assert_eq!(provider.refresh_calls(), 1);
        assert!(guard.store().current().is_none());
    }

    #[tokio::test]
    async fn test_custom_margin() {
        let backend = Arc::new(MemoryBackend::new());
        let session = session_expiring_in(Duration::minutes(5));
        backend.install_session(session.clone());

        let provider = Arc::new(ScriptedProvider::new(backend));
        let auth: Arc<dyn AuthProvider> = provider.clone();
        let store = SessionStore::new(auth);
        store.bootstrap().await;

        let relaxed = SessionGuard::new(store.clone());
        assert!(!relaxed.needs_refresh(Some(&session)));
        assert!(relaxed.needs_refresh(None));

        let strict = SessionGuard::with_margin(store, Duration::minutes(10));
        assert!(strict.needs_refresh(Some(&session)));
        strict.ensure_valid().await.unwrap();
        assert_eq!(provider.refresh_calls(), 1);
    }
}
