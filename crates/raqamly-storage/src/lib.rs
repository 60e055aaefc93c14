//! Raqamly Storage Layer
//!
//! SQLite-backed key/value settings. The auth provider keeps the
//! signed-in session here so it survives a restart.

mod database;
mod error;
mod migrations;

pub use database::Database;
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
