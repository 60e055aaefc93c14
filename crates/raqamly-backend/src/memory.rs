//! In-process backend
//!
//! Implements the full backend contract without a network: accounts,
//! token issue and refresh, JSON tables and byte buckets. Used for local
//! runs and as the test double for everything above the backend crate.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::error::BackendError;
use crate::listeners::{ListenerRegistry, Subscription};
use crate::provider::{AuthListener, AuthProvider, ObjectStorage, Query, Row, StoredObject, TableStore, Upload};
use crate::session::{AuthEvent, Session, User};
use crate::Result;

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;
/// How long a just-rotated refresh token still answers with the session
/// that replaced it
const DEFAULT_REUSE_INTERVAL_SECS: i64 = 10;
const MIN_PASSWORD_LEN: usize = 6;
const PUBLIC_BASE: &str = "memory://storage/public/";

struct Account {
    user: User,
    password: String,
    metadata: Value,
}

#[derive(Default)]
struct MemoryState {
    /// Accounts keyed by email
    accounts: HashMap<String, Account>,
    /// Refresh token -> user id
    refresh_tokens: HashMap<String, String>,
    /// Spent refresh token -> (user id, when it was rotated)
    rotated: HashMap<String, (String, DateTime<Utc>)>,
    current: Option<Session>,
    tables: HashMap<String, Vec<Row>>,
    objects: HashMap<(String, String), Upload>,
}

pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    events: ListenerRegistry<AuthEvent>,
    token_lifetime: RwLock<Duration>,
    reuse_interval: RwLock<Duration>,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            events: ListenerRegistry::new(),
            token_lifetime: RwLock::new(Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS)),
            reuse_interval: RwLock::new(Duration::seconds(DEFAULT_REUSE_INTERVAL_SECS)),
            offline: AtomicBool::new(false),
        }
    }

    pub fn with_token_lifetime(self, lifetime: Duration) -> Self {
        *self.token_lifetime.write() = lifetime;
        self
    }

    pub fn set_token_lifetime(&self, lifetime: Duration) {
        *self.token_lifetime.write() = lifetime;
    }

    /// Zero makes a rotated refresh token unusable immediately
    pub fn set_reuse_interval(&self, interval: Duration) {
        *self.reuse_interval.write() = interval;
    }

    /// Create an account without signing in
    pub fn register_user(&self, email: &str, password: &str) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
        };
        self.state.write().accounts.insert(
            email.to_string(),
            Account {
                user: user.clone(),
                password: password.to_string(),
                metadata: Value::Null,
            },
        );
        user
    }

    /// Place `session` in the provider's store as if restored from a
    /// previous run. Its refresh token becomes valid. No event is emitted.
    pub fn install_session(&self, session: Session) {
        let mut state = self.state.write();
        state
            .refresh_tokens
            .insert(session.refresh_token.clone(), session.user.id.clone());
        state.current = Some(session);
    }

    pub fn revoke_refresh_token(&self, refresh_token: &str) {
        let mut state = self.state.write();
        state.refresh_tokens.remove(refresh_token);
        state.rotated.remove(refresh_token);
    }

    /// While offline every auth call fails as if the network were down
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn user_metadata(&self, email: &str) -> Option<Value> {
        self.state
            .read()
            .accounts
            .get(email)
            .map(|account| account.metadata.clone())
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .read()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn object(&self, bucket: &str, path: &str) -> Option<Upload> {
        self.state
            .read()
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub fn listener_count(&self) -> usize {
        self.events.len()
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend is offline".to_string()));
        }
        Ok(())
    }

    fn issue_session(&self, state: &mut MemoryState, user: User) -> Session {
        let session = Session {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + *self.token_lifetime.read(),
            user,
        };
        state
            .refresh_tokens
            .insert(session.refresh_token.clone(), session.user.id.clone());
        state.current = Some(session.clone());
        session
    }

    /// Session that replaced `token`, if it was rotated recently enough
    fn reused_session(&self, state: &MemoryState, token: &str) -> Option<Session> {
        let (user_id, rotated_at) = state.rotated.get(token)?;
        if Utc::now() - *rotated_at > *self.reuse_interval.read() {
            return None;
        }
        state
            .current
            .as_ref()
            .filter(|session| &session.user.id == user_id)
            .cloned()
    }

    fn user_by_id(state: &MemoryState, user_id: &str) -> Option<User> {
        state
            .accounts
            .values()
            .find(|account| account.user.id == user_id)
            .map(|account| account.user.clone())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>> {
        self.ensure_online()?;
        Ok(self.state.read().current.clone())
    }

    fn on_change(&self, listener: AuthListener) -> Subscription {
        self.events.subscribe(move |event| listener(event))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        self.ensure_online()?;

        let session = {
            let mut state = self.state.write();
            let user = match state.accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => {
                    return Err(BackendError::InvalidCredentials(
                        "Invalid login credentials".to_string(),
                    ))
                }
            };
            self.issue_session(&mut state, user)
        };

        tracing::info!(user_id = %session.user.id, "Signed in");
        self.events.emit(&AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<Session> {
        self.ensure_online()?;

        if email.trim().is_empty() || !email.contains('@') {
            return Err(BackendError::SignUp("Invalid email address".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(BackendError::SignUp(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let session = {
            let mut state = self.state.write();
            if state.accounts.contains_key(email) {
                return Err(BackendError::SignUp("User already registered".to_string()));
            }

            let user = User {
                id: Uuid::new_v4().to_string(),
                email: email.to_string(),
            };
            state.accounts.insert(
                email.to_string(),
                Account {
                    user: user.clone(),
                    password: password.to_string(),
                    metadata,
                },
            );
            self.issue_session(&mut state, user)
        };

        tracing::info!(user_id = %session.user.id, "Signed up");
        self.events.emit(&AuthEvent::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::SignOut("backend is offline".to_string()));
        }

        {
            let mut state = self.state.write();
            if let Some(session) = state.current.take() {
                state.refresh_tokens.remove(&session.refresh_token);
            }
        }

        tracing::info!("Signed out");
        self.events.emit(&AuthEvent::signed_out());
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: Option<&str>) -> Result<Session> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Refresh("backend is offline".to_string()));
        }

        let session = {
            let mut state = self.state.write();
            let token = match refresh_token {
                Some(token) => token.to_string(),
                None => state
                    .current
                    .as_ref()
                    .map(|s| s.refresh_token.clone())
                    .ok_or_else(|| BackendError::Refresh("no stored session".to_string()))?,
            };

            let user_id = match state.refresh_tokens.get(&token).cloned() {
                Some(user_id) => user_id,
                None => {
                    // An overlapping refresh already rotated this token
                    return match self.reused_session(&state, &token) {
                        Some(current) => {
                            tracing::debug!(user_id = %current.user.id, "Reused rotated refresh token");
                            Ok(current)
                        }
                        None => Err(BackendError::Refresh("Invalid Refresh Token".to_string())),
                    };
                }
            };

            let user = match Self::user_by_id(&state, &user_id) {
                Some(user) => user,
                // Installed sessions may belong to users we never registered
                None => state
                    .current
                    .as_ref()
                    .filter(|s| s.user.id == user_id)
                    .map(|s| s.user.clone())
                    .ok_or_else(|| BackendError::Refresh("User not found".to_string()))?,
            };

            // Refresh tokens rotate
            state.refresh_tokens.remove(&token);
            state.rotated.insert(token, (user_id.clone(), Utc::now()));
            self.issue_session(&mut state, user)
        };

        tracing::debug!(user_id = %session.user.id, "Refreshed session");
        self.events.emit(&AuthEvent::token_refreshed(session.clone()));
        Ok(session)
    }

    async fn get_user(&self) -> Result<Option<User>> {
        self.ensure_online()?;
        Ok(self.state.read().current.as_ref().map(|s| s.user.clone()))
    }
}

#[async_trait]
impl TableStore for MemoryBackend {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>> {
        let state = self.state.read();
        let rows = state.tables.get(table).map(Vec::as_slice).unwrap_or(&[]);

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .iter()
            .filter(|row| query.matches(row))
            .take(limit)
            .map(|row| query.project(row))
            .collect())
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut state = self.state.write();
        let stored = state.tables.entry(table.to_string()).or_default();

        // The batch is all or nothing
        let mut batch_ids: Vec<&Value> = Vec::new();
        for id in rows.iter().filter_map(|row| row.get("id")).filter(|id| !id.is_null()) {
            if batch_ids.contains(&id) || stored.iter().any(|r| r.get("id") == Some(id)) {
                return Err(BackendError::Query {
                    table: table.to_string(),
                    message: "duplicate key value violates unique constraint".to_string(),
                });
            }
            batch_ids.push(id);
        }

        let mut inserted = Vec::with_capacity(rows.len());
        for mut row in rows {
            if row.get("id").map_or(true, Value::is_null) {
                row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
            }
            stored.push(row.clone());
            inserted.push(row);
        }

        tracing::debug!(table = %table, count = inserted.len(), "Inserted rows");
        Ok(inserted)
    }

    async fn upsert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>> {
        let mut state = self.state.write();
        let stored = state.tables.entry(table.to_string()).or_default();

        let mut written = Vec::with_capacity(rows.len());
        for mut row in rows {
            let existing = row
                .get("id")
                .filter(|id| !id.is_null())
                .and_then(|id| stored.iter().position(|r| r.get("id") == Some(id)));

            match existing {
                Some(index) => {
                    let current = &mut stored[index];
                    current.extend(row);
                    written.push(current.clone());
                }
                None => {
                    if row.get("id").map_or(true, Value::is_null) {
                        row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
                    }
                    stored.push(row.clone());
                    written.push(row);
                }
            }
        }

        Ok(written)
    }
}

#[async_trait]
impl ObjectStorage for MemoryBackend {
    async fn upload(&self, bucket: &str, path: &str, upload: &Upload) -> Result<StoredObject> {
        let key = (bucket.to_string(), path.to_string());
        let mut state = self.state.write();
        if state.objects.contains_key(&key) {
            return Err(BackendError::Upload {
                bucket: bucket.to_string(),
                path: path.to_string(),
                message: "The resource already exists".to_string(),
            });
        }
        state.objects.insert(key, upload.clone());

        tracing::debug!(bucket = %bucket, path = %path, bytes = upload.bytes.len(), "Stored object");
        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> Result<Url> {
        let mut url = Url::parse(PUBLIC_BASE)?;
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(bucket)
            .extend(path.split('/').filter(|segment| !segment.is_empty()));
        Ok(url)
    }
}
