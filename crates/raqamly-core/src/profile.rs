//! Signed-in user's profile, as shown in the sidebar

use serde::{Deserialize, Serialize};
use serde_json::Value;

use raqamly_backend::{DataAccess, Query, User};
use raqamly_session::SessionGuard;

use crate::accounts::PROFILES_TABLE;
use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl Profile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Refresh the session if needed, then resolve the signed-in user
pub(crate) async fn authenticated_user(guard: &SessionGuard, data: &DataAccess) -> Result<User> {
    guard.ensure_valid().await?;
    data.auth().get_user().await?.ok_or(CoreError::NotAuthenticated)
}

#[derive(Clone)]
pub struct ProfileService {
    data: DataAccess,
    guard: SessionGuard,
}

impl ProfileService {
    pub fn new(data: DataAccess, guard: SessionGuard) -> Self {
        Self { data, guard }
    }

    pub async fn load_profile(&self) -> Result<Profile> {
        let user = authenticated_user(&self.guard, &self.data).await?;

        let query = Query::new()
            .columns("first_name,last_name,plan,avatar_url")
            .eq("id", user.id.as_str())
            .limit(1);
        let row = self
            .data
            .table(PROFILES_TABLE)
            .select(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::NotFound(format!("profile for user {}", user.id)))?;

        tracing::debug!(user_id = %user.id, "Loaded profile");
        Ok(serde_json::from_value(Value::Object(row))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raqamly_backend::{AuthProvider, MemoryBackend};
    use raqamly_session::{SessionError, SessionStore};
    use serde_json::json;
    use std::sync::Arc;

    async fn signed_in_service(backend: &Arc<MemoryBackend>) -> (ProfileService, String) {
        backend.register_user("owner@example.com", "hunter22");
        let auth: Arc<dyn AuthProvider> = backend.clone();
        let store = SessionStore::new(auth);
        store.bootstrap().await;

        let session = backend
            .sign_in_with_password("owner@example.com", "hunter22")
            .await
            .unwrap();
        let data = DataAccess::from_backend(backend.clone());
        (ProfileService::new(data, SessionGuard::new(store)), session.user.id)
    }

    #[tokio::test]
    async fn test_load_profile() {
        let backend = Arc::new(MemoryBackend::new());
        let (profiles, user_id) = signed_in_service(&backend).await;

        let row = json!({
            "id": user_id,
            "first_name": "Lina",
            "last_name": "Haddad",
            "plan": "Pro",
            "avatar_url": "",
            "phone_number": "+971500000000",
        });
        DataAccess::from_backend(backend.clone())
            .table(PROFILES_TABLE)
            .insert(vec![row.as_object().cloned().unwrap()])
            .await
            .unwrap();

        let profile = profiles.load_profile().await.unwrap();
        assert_eq!(profile.display_name(), "Lina Haddad");
        assert_eq!(profile.plan.as_deref(), Some("Pro"));
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let backend = Arc::new(MemoryBackend::new());
        let (profiles, _) = signed_in_service(&backend).await;

        let err = profiles.load_profile().await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_signed_out_is_auth_expired() {
        let backend = Arc::new(MemoryBackend::new());
        let (profiles, _) = signed_in_service(&backend).await;
        backend.sign_out().await.unwrap();

        let err = profiles.load_profile().await.unwrap_err();
        assert!(err.is_auth_expired());
        assert!(matches!(err, CoreError::Session(SessionError::AuthExpired(_))));
    }
}
