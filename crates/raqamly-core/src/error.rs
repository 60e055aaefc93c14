//! Core error types

use thiserror::Error;

use raqamly_session::SessionError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] raqamly_storage::StorageError),

    #[error(transparent)]
    Backend(#[from] raqamly_backend::BackendError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Navigation error: {0}")]
    Navigation(#[from] raqamly_navigation::NavigationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("User not authenticated")]
    NotAuthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// The session could not be kept alive; the user has to sign in again
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, CoreError::Session(SessionError::AuthExpired(_)))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Config(e.to_string())
    }
}
