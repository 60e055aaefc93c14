//! Session error types

use raqamly_backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// The session could not be refreshed; callers treat this as signed out
    #[error("Session expired, please sign in again")]
    AuthExpired(#[source] BackendError),
}
