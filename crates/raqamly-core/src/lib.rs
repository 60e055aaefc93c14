//! Raqamly Core
//!
//! Coordination layer of the Raqamly dashboard. The [`AuthGate`] decides
//! which routes exist from the current session; every signed-in page action
//! goes through the [`SessionGuard`](raqamly_session::SessionGuard) before
//! touching the backend.

mod accounts;
mod catalog;
mod config;
mod dashboard;
mod error;
mod gate;
mod profile;

pub use accounts::{AccountService, SignUpForm, AVATAR_BUCKET, PROFILES_TABLE};
pub use catalog::{parse_price, validate_price, CatalogService, NewProduct, Product, PRODUCTS_TABLE, PRODUCT_IMAGE_BUCKET};
pub use config::Config;
pub use dashboard::Dashboard;
pub use error::CoreError;
pub use gate::{AuthGate, GateView};
pub use profile::{Profile, ProfileService};

pub use raqamly_backend::{
    BackendError, DataAccess, MemoryBackend, RestBackend, Session, Upload, User,
};
pub use raqamly_navigation::{NavItem, NavigationError, Navigator, Route, RouteSet};
pub use raqamly_session::{SessionError, SessionGuard, SessionStatus, SessionStore};
pub use raqamly_storage::{Database, StorageError};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
