//! Backend contract: auth, tables and object storage

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::listeners::Subscription;
use crate::session::{AuthEvent, Session, User};
use crate::Result;

/// A table row as returned by the table store
pub type Row = serde_json::Map<String, Value>;

pub type AuthListener = Box<dyn Fn(&AuthEvent) + Send + Sync>;

/// Hosted authentication service.
///
/// Implementations emit an [`AuthEvent`] to every `on_change` listener on
/// sign-in, sign-up, sign-out and token refresh, in the order the changes
/// happen, and before the call that caused the change returns.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Session restored from the provider's own persistence, if any
    async fn get_session(&self) -> Result<Option<Session>>;

    fn on_change(&self, listener: AuthListener) -> Subscription;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<Session>;

    async fn sign_out(&self) -> Result<()>;

    /// Exchange a refresh token for a new session. `None` uses the refresh
    /// token of the provider's stored session. Failure leaves the stored
    /// session untouched and emits nothing.
    async fn refresh_session(&self, refresh_token: Option<&str>) -> Result<Session>;

    async fn get_user(&self) -> Result<Option<User>>;
}

/// Row filter for [`TableStore::select`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Columns to return; empty means all
    pub columns: Vec<String>,
    /// Equality filters, all of which must match
    pub filters: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated column list such as `"first_name, plan"`
    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty() && *c != "*")
            .map(str::to_string)
            .collect();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True if `row` satisfies every filter
    pub fn matches(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|(column, value)| row.get(column) == Some(value))
    }

    /// Apply the column projection to `row`
    pub fn project(&self, row: &Row) -> Row {
        if self.columns.is_empty() {
            return row.clone();
        }
        self.columns
            .iter()
            .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
            .collect()
    }
}

#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Row>>;

    async fn insert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>>;

    /// Insert, or merge into the existing row with the same primary key
    async fn upsert(&self, table: &str, rows: Vec<Row>) -> Result<Vec<Row>>;
}

/// File contents handed to [`ObjectStorage::upload`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bucket: &str, path: &str, upload: &Upload) -> Result<StoredObject>;

    fn public_url(&self, bucket: &str, path: &str) -> Result<Url>;
}
