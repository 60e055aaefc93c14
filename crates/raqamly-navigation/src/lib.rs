//! Raqamly Navigation
//!
//! Which views exist depends only on whether a session is present:
//! - signed out: `/signup`, and sign-in for every other path
//! - signed in: dashboard, AI library, products, add product, campaigns,
//!   settings
//!
//! [`RouteSet`] is recomputed from session presence on every render and
//! never stored.

mod error;
mod navigator;
mod route;
mod sidebar;

pub use error::NavigationError;
pub use navigator::{Navigator, MAX_BACK_ENTRIES, MAX_TRACKED_PATHS};
pub use route::{normalize_path, Route, RouteSet, RouteSetKind};
pub use sidebar::{sidebar_items, NavItem};

pub type Result<T> = std::result::Result<T, NavigationError>;
