//! `DataAccess`: the single handle pages use to reach the backend

use std::sync::Arc;
use url::Url;

use crate::provider::{AuthProvider, ObjectStorage, Query, Row, StoredObject, TableStore, Upload};
use crate::Result;

#[derive(Clone)]
pub struct DataAccess {
    auth: Arc<dyn AuthProvider>,
    tables: Arc<dyn TableStore>,
    storage: Arc<dyn ObjectStorage>,
}

impl DataAccess {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        tables: Arc<dyn TableStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            auth,
            tables,
            storage,
        }
    }

    /// Use one backend for all three services
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AuthProvider + TableStore + ObjectStorage + 'static,
    {
        Self {
            auth: backend.clone(),
            tables: backend.clone(),
            storage: backend,
        }
    }

    pub fn auth(&self) -> &Arc<dyn AuthProvider> {
        &self.auth
    }

    pub fn table(&self, name: &str) -> Table {
        Table {
            store: Arc::clone(&self.tables),
            name: name.to_string(),
        }
    }

    pub fn bucket(&self, name: &str) -> Bucket {
        Bucket {
            storage: Arc::clone(&self.storage),
            name: name.to_string(),
        }
    }
}

pub struct Table {
    store: Arc<dyn TableStore>,
    name: String,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn select(&self, query: &Query) -> Result<Vec<Row>> {
        self.store.select(&self.name, query).await
    }

    pub async fn insert(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        self.store.insert(&self.name, rows).await
    }

    pub async fn upsert(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        self.store.upsert(&self.name, rows).await
    }
}

pub struct Bucket {
    storage: Arc<dyn ObjectStorage>,
    name: String,
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn upload(&self, path: &str, upload: &Upload) -> Result<StoredObject> {
        self.storage.upload(&self.name, path, upload).await
    }

    pub fn public_url(&self, path: &str) -> Result<Url> {
        self.storage.public_url(&self.name, path)
    }
}
