//! Sign-in, sign-up and sign-out

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::path::Path;

use raqamly_backend::{DataAccess, Session, Upload};
use raqamly_navigation::{Navigator, Route};

use crate::Result;

pub const AVATAR_BUCKET: &str = "avatars";
pub const PROFILES_TABLE: &str = "profiles";

/// Fields of the sign-up page
#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub business_name: String,
    pub avatar: Option<Upload>,
}

#[derive(Clone)]
pub struct AccountService {
    data: DataAccess,
    navigator: Navigator,
}

impl AccountService {
    pub fn new(data: DataAccess, navigator: Navigator) -> Self {
        Self { data, navigator }
    }

    /// Sign in and land on the dashboard. The auth gate switches route
    /// sets through the provider's change notification.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self.data.auth().sign_in_with_password(email, password).await?;
        tracing::info!(user_id = %session.user.id, "Signed in");

        self.navigator.navigate(Route::Dashboard.path())?;
        Ok(session)
    }

    /// Create the account, store the optional avatar and the profile row,
    /// then land on the dashboard
    pub async fn sign_up(&self, form: SignUpForm) -> Result<Session> {
        let metadata = json!({
            "first_name": form.first_name,
            "last_name": form.last_name,
        });
        let session = self
            .data
            .auth()
            .sign_up(&form.email, &form.password, metadata)
            .await?;
        let user_id = session.user.id.clone();
        tracing::info!(user_id = %user_id, "Signed up");

        let avatar_url = match &form.avatar {
            Some(avatar) => {
                let bucket = self.data.bucket(AVATAR_BUCKET);
                let path = object_path(&user_id, &avatar.file_name);
                let stored = bucket.upload(&path, avatar).await?;
                tracing::debug!(bucket = %stored.bucket, path = %stored.path, "Uploaded avatar");
                bucket.public_url(&stored.path)?.to_string()
            }
            None => String::new(),
        };

        let mut profile = Map::new();
        profile.insert("id".to_string(), Value::String(user_id));
        profile.insert("first_name".to_string(), Value::String(form.first_name));
        profile.insert("last_name".to_string(), Value::String(form.last_name));
        profile.insert("phone_number".to_string(), Value::String(form.phone_number));
        profile.insert("business_name".to_string(), Value::String(form.business_name));
        profile.insert("avatar_url".to_string(), Value::String(avatar_url));
        self.data.table(PROFILES_TABLE).upsert(vec![profile]).await?;

        self.navigator.navigate(Route::Dashboard.path())?;
        Ok(session)
    }

    /// Errors are returned as the provider reported them
    pub async fn sign_out(&self) -> Result<()> {
        self.data.auth().sign_out().await?;
        tracing::info!("Signed out");
        Ok(())
    }
}

/// `<user_id>/<unix millis>_<file name>`, the layout used by every bucket
pub(crate) fn object_path(user_id: &str, file_name: &str) -> String {
    format!(
        "{}/{}_{}",
        user_id,
        Utc::now().timestamp_millis(),
        sanitize_file_name(file_name)
    )
}

fn sanitize_file_name(file_name: &str) -> String {
    let name = Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .trim();

    if name.is_empty() {
        "upload".to_string()
    } else {
        name.replace(char::is_whitespace, "_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use raqamly_backend::{BackendError, MemoryBackend, Query};
    use std::sync::Arc;

    fn service(backend: &Arc<MemoryBackend>) -> (AccountService, Navigator) {
        let navigator = Navigator::starting_at("/signin");
        let data = DataAccess::from_backend(backend.clone());
        (AccountService::new(data, navigator.clone()), navigator)
    }

    fn form(avatar: Option<Upload>) -> SignUpForm {
        SignUpForm {
            email: "owner@example.com".to_string(),
            password: "hunter22".to_string(),
            first_name: "Lina".to_string(),
            last_name: "Haddad".to_string(),
            phone_number: "+971500000000".to_string(),
            business_name: "Haddad Goods".to_string(),
            avatar,
        }
    }

    #[test]
    fn test_object_path() {
        let path = object_path("user-1", "../me photo.png");
        assert!(path.starts_with("user-1/"));
        assert!(path.ends_with("_me_photo.png"));
        assert!(object_path("user-1", "").ends_with("_upload"));
    }

    #[tokio::test]
    async fn test_sign_in_navigates_to_dashboard() {
        let backend = Arc::new(MemoryBackend::new());
        backend.register_user("owner@example.com", "hunter22");
        let (accounts, navigator) = service(&backend);

        let session = accounts.sign_in("owner@example.com", "hunter22").await.unwrap();
        assert_eq!(session.user.email, "owner@example.com");
        assert_eq!(navigator.current(), "/");
    }

    #[tokio::test]
    async fn test_failed_sign_in_stays_put() {
        let backend = Arc::new(MemoryBackend::new());
        backend.register_user("owner@example.com", "hunter22");
        let (accounts, navigator) = service(&backend);

        let err = accounts.sign_in("owner@example.com", "wrong").await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Backend(BackendError::InvalidCredentials(_))
        ));
        assert_eq!(navigator.current(), "/signin");
    }

    #[tokio::test]
    async fn test_sign_up_with_avatar() {
        let backend = Arc::new(MemoryBackend::new());
        let (accounts, navigator) = service(&backend);
        let avatar = Upload::new("me.png", "image/png", vec![1, 2, 3]);

        let session = accounts.sign_up(form(Some(avatar))).await.unwrap();
        let user_id = session.user.id.clone();

        let metadata = backend.user_metadata("owner@example.com").unwrap();
        assert_eq!(metadata["first_name"], "Lina");
        assert_eq!(metadata["last_name"], "Haddad");

        let profiles = backend.rows(PROFILES_TABLE);
        assert_eq!(profiles.len(), 1);
        let profile = &profiles[0];
        assert_eq!(profile["id"], user_id.as_str());
        assert_eq!(profile["business_name"], "Haddad Goods");

        let avatar_url = profile["avatar_url"].as_str().unwrap();
        let prefix = format!("memory://storage/public/{}/{}/", AVATAR_BUCKET, user_id);
        assert!(avatar_url.starts_with(&prefix));
        let object_path = &avatar_url["memory://storage/public/avatars/".len()..];
        assert_eq!(
            backend.object(AVATAR_BUCKET, object_path).unwrap().bytes,
            vec![1, 2, 3]
        );

        assert_eq!(navigator.current(), "/");
    }

    #[tokio::test]
    async fn test_sign_up_without_avatar() {
        let backend = Arc::new(MemoryBackend::new());
        let (accounts, _) = service(&backend);

        let session = accounts.sign_up(form(None)).await.unwrap();
        let rows = DataAccess::from_backend(backend.clone())
            .table(PROFILES_TABLE)
            .select(&Query::new().eq("id", session.user.id.as_str()))
            .await
            .unwrap();
        assert_eq!(rows[0]["avatar_url"], "");
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_is_rejected() {
        let backend = Arc::new(MemoryBackend::new());
        let (accounts, navigator) = service(&backend);
        accounts.sign_up(form(None)).await.unwrap();
        navigator.navigate("/signup").unwrap();

        let err = accounts.sign_up(form(None)).await.unwrap_err();
        assert!(matches!(err, CoreError::Backend(BackendError::SignUp(_))));
        assert_eq!(navigator.current(), "/signup");
        assert_eq!(backend.rows(PROFILES_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn test_sign_out_error_is_surfaced() {
        let backend = Arc::new(MemoryBackend::new());
        backend.register_user("owner@example.com", "hunter22");
        let (accounts, _) = service(&backend);
        accounts.sign_in("owner@example.com", "hunter22").await.unwrap();

        backend.set_offline(true);
        let err = accounts.sign_out().await.unwrap_err();
        assert!(matches!(err, CoreError::Backend(BackendError::SignOut(_))));

        backend.set_offline(false);
        accounts.sign_out().await.unwrap();
    }
}
