//! Raqamly Session Management
//!
//! - [`SessionStore`] holds the current session for the whole app. It is
//!   bootstrapped once from the auth provider and then follows every
//!   provider change notification, in order.
//! - [`SessionGuard`] runs before each authenticated request and refreshes
//!   the session when it is missing or about to expire.

mod error;
mod guard;
mod store;
#[cfg(test)]
mod testing;

pub use error::SessionError;
pub use guard::{SessionGuard, DEFAULT_REFRESH_MARGIN_SECS};
pub use store::{SessionStatus, SessionStore};

pub type Result<T> = std::result::Result<T, SessionError>;
