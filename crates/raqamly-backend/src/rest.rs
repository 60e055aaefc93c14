//! HTTP client for the hosted backend
//!
//! Auth lives under `auth/v1`, tables under `rest/v1`, buckets under
//! `storage/v1`. Every request carries the project's anon key as `apikey`
//! and the signed-in user's access token (or the anon key) as bearer.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use raqamly_storage::Database;

use crate::error::BackendError;
use crate::listeners::{ListenerRegistry, Subscription};
use crate::provider::{AuthListener, AuthProvider, ObjectStorage, Query, Row, StoredObject, TableStore, Upload};
use crate::session::{AuthEvent, Session, User};
use crate::Result;

/// Settings key of the persisted session
const SESSION_KEY: &str = "auth.session";

pub struct RestBackend {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    db: Database,
    session: RwLock<Option<Session>>,
    events: ListenerRegistry<AuthEvent>,
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: impl Into<String>, db: Database) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base: normalize_base(base_url)?,
            anon_key: anon_key.into(),
            db,
            session: RwLock::new(None),
            events: ListenerRegistry::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    /// Storage URL with every segment of `path` percent-encoded
    fn object_url(&self, prefix: &[&str], path: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(prefix)
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }

    fn bearer(&self) -> String {
        self.session
            .read()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone())
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer())
    }

    fn cached_session(&self) -> Result<Option<Session>> {
        if let Some(session) = self.session.read().clone() {
            return Ok(Some(session));
        }

        let restored: Option<Session> = self.db.get_json(SESSION_KEY)?;
        if let Some(session) = &restored {
            tracing::debug!(user_id = %session.user.id, "Restored persisted session");
            *self.session.write() = Some(session.clone());
        }
        Ok(restored)
    }

    fn store_session(&self, session: Option<&Session>) -> Result<()> {
        match session {
            Some(session) => self.db.set_json(SESSION_KEY, session)?,
            None => self.db.delete_setting(SESSION_KEY)?,
        }
        *self.session.write() = session.cloned();
        Ok(())
    }

    fn select_url(&self, table: &str, query: &Query) -> Result<Url> {
        let mut url = self.endpoint(&format!("rest/v1/{table}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            let select = if query.columns.is_empty() {
                "*".to_string()
            } else {
                query.columns.join(",")
            };
            pairs.append_pair("select", &select);
            for (column, value) in &query.filters {
                pairs.append_pair(column, &format!("eq.{}", filter_value(value)));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    async fn write_rows(&self, table: &str, rows: Vec<Row>, prefer: &str) -> Result<Vec<Row>> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", prefer)
            .json(&rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::Query {
                table: table.to_string(),
                message: error_message(response).await,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AuthProvider for RestBackend {
    async fn get_session(&self) -> Result<Option<Session>> {
        self.cached_session()
    }

    fn on_change(&self, listener: AuthListener) -> Subscription {
        self.events.subscribe(move |event| listener(event))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let response = self
            .request(Method::POST, url)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::InvalidCredentials(error_message(response).await));
        }

        let session = response
            .json::<TokenResponse>()
            .await?
            .into_session(Utc::now())
            .ok_or_else(|| BackendError::InvalidCredentials("no session in response".to_string()))?;

        self.store_session(Some(&session))?;
        tracing::info!(user_id = %session.user.id, "Signed in");
        self.events.emit(&AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<Session> {
        let url = self.endpoint("auth/v1/signup")?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BackendError::SignUp(error_message(response).await));
        }

        let session = response
            .json::<TokenResponse>()
            .await?
            .into_session(Utc::now())
            .ok_or_else(|| {
                BackendError::SignUp(
                    "no session issued; the email address must be confirmed first".to_string(),
                )
            })?;

        self.store_session(Some(&session))?;
        tracing::info!(user_id = %session.user.id, "Signed up");
        self.events.emit(&AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.cached_session()?.is_some() {
            let url = self.endpoint("auth/v1/logout")?;
            let response = self
                .request(Method::POST, url)
                .send()
                .await
                .map_err(|e| BackendError::SignOut(e.to_string()))?;

            let status = response.status();
            // 401/404: the session is already gone server-side
            if !status.is_success()
                && status != StatusCode::UNAUTHORIZED
                && status != StatusCode::NOT_FOUND
            {
                return Err(BackendError::SignOut(error_message(response).await));
            }
        }

        self.store_session(None)?;
        tracing::info!("Signed out");
        self.events.emit(&AuthEvent::signed_out());
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: Option<&str>) -> Result<Session> {
        let token = match refresh_token {
            Some(token) => token.to_string(),
            None => self
                .cached_session()?
                .map(|s| s.refresh_token)
                .ok_or_else(|| BackendError::Refresh("no stored session".to_string()))?,
        };

        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&json!({ "refresh_token": token }))
            .send()
            .await
            .map_err(|e| BackendError::Refresh(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Refresh(error_message(response).await));
        }

        let session = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| BackendError::Refresh(e.to_string()))?
            .into_session(Utc::now())
            .ok_or_else(|| BackendError::Refresh("no session in response".to_string()))?;

        self.store_session(Some(&session))?;
        tracing::debug!(user_id = %session.user.id, expires_at = %session.expires_at, "Refreshed session");
        self.events.emit(&AuthEvent::token_refreshed(session.clone()));
        Ok(session)
    }

    async fn get_user(&self) -> Result<Option<User>> {
        if self.cached_session()?.is_none() {
            return Ok(None);
        }

        let url = self.endpoint("auth/v1/user")?;
        let response = self.request(Method::GET, url).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(BackendError::Unavailable(error_message(response).await)),
        }
    }
}

#[async_trait]
impl TableStore for RestBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let url = self.select_url(table, query)?;
        let response = self.request(Method::GET, url).send().await?;

        if !response.status().is_success() {
            return Err(BackendError::Query {
                table: table.to_string(),
                message: error_message(response).await,
            });
        }
        Ok(response.json().await?)
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        self.write_rows(table, rows, "return=representation").await
    }

    async fn upsert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        self.write_rows(table, rows, "resolution=merge-duplicates,return=representation")
            .await
    }
}

#[async_trait]
impl ObjectStorage for RestBackend {
    async fn upload(&self, bucket: &str, path: &str, upload: &Upload) -> Result<StoredObject> {
        let url = self.object_url(&["storage", "v1", "object", bucket], path)?;
        let response = self
            .request(Method::POST, url)
            .header("Content-Type", &upload.content_type)
            .header("x-upsert", "false")
            .body(upload.bytes.clone())
            .send()
            .await
            .map_err(|e| BackendError::Upload {
                bucket: bucket.to_string(),
                path: path.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(BackendError::Upload {
                bucket: bucket.to_string(),
                path: path.to_string(),
                message: error_message(response).await,
            });
        }

        tracing::debug!(bucket = %bucket, path = %path, bytes = upload.bytes.len(), "Uploaded object");
        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> Result<Url> {
        self.object_url(&["storage", "v1", "object", "public", bucket], path)
    }
}

/// Token grant / sign-up response body
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    /// Unix seconds
    expires_at: Option<i64>,
    user: Option<User>,
}

impl TokenResponse {
    /// `None` unless every session field is present
    fn into_session(self, now: DateTime<Utc>) -> Option<Session> {
        let expires_at = match (self.expires_at, self.expires_in) {
            (Some(at), _) => DateTime::<Utc>::from_timestamp(at, 0)?,
            (None, Some(secs)) => now.checked_add_signed(Duration::try_seconds(secs)?)?,
            (None, None) => return None,
        };

        Some(Session {
            access_token: self.access_token?,
            refresh_token: self.refresh_token?,
            expires_at,
            user: self.user?,
        })
    }
}

fn normalize_base(base_url: &str) -> Result<Url> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

fn filter_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    extract_message(status, &body)
}

fn extract_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base: &str) -> RestBackend {
        RestBackend::new(base, "anon", Database::open_in_memory().unwrap()).unwrap()
    }

    fn sample_session() -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: DateTime::<Utc>::from_timestamp(1_900_000_000, 0).unwrap(),
            user: User {
                id: "u1".to_string(),
                email: "owner@example.com".to_string(),
            },
        }
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let rest = backend("https://project.example.co");
        assert_eq!(rest.base_url().as_str(), "https://project.example.co/");

        let nested = backend("https://example.com/proxy");
        assert_eq!(
            nested.endpoint("auth/v1/user").unwrap().as_str(),
            "https://example.com/proxy/auth/v1/user"
        );
    }

    #[test]
    fn test_select_url() {
        let rest = backend("https://project.example.co/");
        let query = Query::new()
            .columns("first_name, plan")
            .eq("id", "u1")
            .eq("active", true)
            .limit(1);

        let url = rest.select_url("profiles", &query).unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/rest/v1/profiles?select=first_name%2Cplan&id=eq.u1&active=eq.true&limit=1"
        );

        let all = rest.select_url("products", &Query::new()).unwrap();
        assert_eq!(
            all.as_str(),
            "https://project.example.co/rest/v1/products?select=*"
        );
    }

    #[test]
    fn test_public_url() {
        let rest = backend("https://project.example.co");
        let url = rest.public_url("avatars", "u1/42_me.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/storage/v1/object/public/avatars/u1/42_me.png"
        );
    }

    #[test]
    fn test_object_paths_are_percent_encoded() {
        let rest = backend("https://example.com/proxy");
        let url = rest.public_url("avatars", "u1/42_photo #1.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/proxy/storage/v1/object/public/avatars/u1/42_photo%20%231.png"
        );
        assert_eq!(url.fragment(), None);

        let upload = rest
            .object_url(&["storage", "v1", "object", "avatars"], "u1/what?.png")
            .unwrap();
        assert_eq!(upload.path(), "/proxy/storage/v1/object/avatars/u1/what%3F.png");
        assert_eq!(upload.query(), None);
    }

    #[test]
    fn test_token_response_with_expires_at() {
        let body = r#"{
            "access_token": "a", "refresh_token": "r", "token_type": "bearer",
            "expires_in": 3600, "expires_at": 1900000000,
            "user": {"id": "u1", "email": "owner@example.com", "role": "authenticated"}
        }"#;
        let response: TokenResponse = serde_json::from_str(body).unwrap();
        let session = response.into_session(Utc::now()).unwrap();

        assert_eq!(session.access_token, "a");
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(session.user.email, "owner@example.com");
    }

    #[test]
    fn test_token_response_with_expires_in_only() {
        let now = Utc::now();
        let body = r#"{"access_token": "a", "refresh_token": "r", "expires_in": 60,
                       "user": {"id": "u1", "email": "owner@example.com"}}"#;
        let response: TokenResponse = serde_json::from_str(body).unwrap();
        let session = response.into_session(now).unwrap();
        assert_eq!(session.expires_at, now + Duration::seconds(60));
    }

    #[test]
    fn test_out_of_range_expires_in_has_no_session() {
        let body = format!(
            r#"{{"access_token": "a", "refresh_token": "r", "expires_in": {},
                 "user": {{"id": "u1", "email": "owner@example.com"}}}}"#,
            i64::MAX
        );
        let response: TokenResponse = serde_json::from_str(&body).unwrap();
        assert!(response.into_session(Utc::now()).is_none());
    }

    #[test]
    fn test_unconfirmed_sign_up_has_no_session() {
        // Sign-up with email confirmation returns the user without tokens
        let body = r#"{"id": "u1", "email": "owner@example.com", "confirmation_sent_at": "2024-01-01T00:00:00Z"}"#;
        let response: TokenResponse = serde_json::from_str(body).unwrap();
        assert!(response.into_session(Utc::now()).is_none());
    }

    #[test]
    fn test_extract_message() {
        assert_eq!(
            extract_message(
                StatusCode::BAD_REQUEST,
                r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#
            ),
            "Invalid login credentials"
        );
        assert_eq!(
            extract_message(StatusCode::CONFLICT, r#"{"statusCode":"409","message":"The resource already exists"}"#),
            "The resource already exists"
        );
        assert_eq!(
            extract_message(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            "HTTP 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_session_persists_across_instances() {
        let db = Database::open_in_memory().unwrap();
        let first = RestBackend::new("https://project.example.co", "anon", db.clone()).unwrap();
        first.store_session(Some(&sample_session())).unwrap();
        assert_eq!(first.bearer(), "access");

        let second = RestBackend::new("https://project.example.co", "anon", db).unwrap();
        assert_eq!(second.bearer(), "anon");
        assert_eq!(second.get_session().await.unwrap(), Some(sample_session()));
        assert_eq!(second.bearer(), "access");

        second.store_session(None).unwrap();
        assert!(second.get_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_skips_network() {
        let rest = backend("https://project.invalid");
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&seen);
        let _sub = rest.on_change(Box::new(move |event: &AuthEvent| sink.lock().push(event.kind)));

        rest.sign_out().await.unwrap();
        assert_eq!(*seen.lock(), vec![crate::session::AuthEventKind::SignedOut]);
    }

    #[tokio::test]
    async fn test_refresh_without_session_fails_locally() {
        let rest = backend("https://project.invalid");
        let err = rest.refresh_session(None).await.unwrap_err();
        assert!(matches!(err, BackendError::Refresh(_)));
    }
}
