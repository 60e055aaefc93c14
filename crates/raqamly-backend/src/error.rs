//! Backend error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Invalid login credentials: {0}")]
    InvalidCredentials(String),

    #[error("Sign up failed: {0}")]
    SignUp(String),

    #[error("Sign out failed: {0}")]
    SignOut(String),

    #[error("Session refresh failed: {0}")]
    Refresh(String),

    #[error("Query on {table} failed: {message}")]
    Query { table: String, message: String },

    #[error("Upload to {bucket}/{path} failed: {message}")]
    Upload {
        bucket: String,
        path: String,
        message: String,
    },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] raqamly_storage::StorageError),
}
