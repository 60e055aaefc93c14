//! Raqamly Backend Client
//!
//! The dashboard talks to a hosted backend-as-a-service for three things:
//! - auth (password sign-in, sign-up, sign-out, token refresh)
//! - a relational table store (select / insert / upsert of JSON rows)
//! - object storage buckets (upload, public URLs)
//!
//! [`DataAccess`] bundles the three behind trait objects. [`RestBackend`]
//! speaks the hosted HTTP API; [`MemoryBackend`] implements the same contract
//! in process.

mod access;
mod error;
mod listeners;
mod memory;
mod provider;
mod rest;
mod session;

pub use access::{Bucket, DataAccess, Table};
pub use error::BackendError;
pub use listeners::{ListenerRegistry, Subscription};
pub use memory::MemoryBackend;
pub use provider::{AuthListener, AuthProvider, ObjectStorage, Query, Row, StoredObject, TableStore, Upload};
pub use rest::RestBackend;
pub use session::{AuthEvent, AuthEventKind, Session, User};

pub type Result<T> = std::result::Result<T, BackendError>;
