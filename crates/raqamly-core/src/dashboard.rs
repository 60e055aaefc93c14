//! Dashboard state container
//!
//! Owns one instance of every long-lived piece: the session store, the
//! guard, the auth gate, the navigator and the page services. Clones share
//! all of them.

use std::sync::Arc;

use raqamly_backend::{DataAccess, RestBackend};
use raqamly_navigation::{sidebar_items, NavItem, Navigator};
use raqamly_session::{SessionGuard, SessionStore};
use raqamly_storage::Database;

use crate::accounts::AccountService;
use crate::catalog::CatalogService;
use crate::config::Config;
use crate::gate::AuthGate;
use crate::profile::ProfileService;
use crate::Result;

#[derive(Clone)]
pub struct Dashboard {
    config: Config,
    data: DataAccess,
    store: SessionStore,
    guard: SessionGuard,
    gate: AuthGate,
    navigator: Navigator,
    accounts: AccountService,
    profiles: ProfileService,
    catalog: CatalogService,
}

impl Dashboard {
    /// Open the database and talk to the hosted backend
    pub fn connect(config: Config) -> Result<Self> {
        config.validate()?;

        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open(&config.database_path)?;

        let backend = RestBackend::new(&config.backend_url, config.anon_key.clone(), db)?;
        tracing::info!(backend = %backend.base_url(), "Connecting dashboard");

        Ok(Self::with_data_access(config, DataAccess::from_backend(Arc::new(backend))))
    }

    /// Build the dashboard over any backend
    pub fn with_data_access(config: Config, data: DataAccess) -> Self {
        let store = SessionStore::new(Arc::clone(data.auth()));
        let guard = SessionGuard::with_margin(store.clone(), config.refresh_margin());
        let gate = AuthGate::new(store.clone());
        let navigator = Navigator::new();

        let accounts = AccountService::new(data.clone(), navigator.clone());
        let profiles = ProfileService::new(data.clone(), guard.clone());
        let catalog = CatalogService::new(data.clone(), guard.clone(), navigator.clone());

        Self {
            config,
            data,
            store,
            guard,
            gate,
            navigator,
            accounts,
            profiles,
            catalog,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data(&self) -> &DataAccess {
        &self.data
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    pub fn session_guard(&self) -> &SessionGuard {
        &self.guard
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    /// Sidebar entries with the one matching the current location marked
    pub fn sidebar(&self) -> Vec<(NavItem, bool)> {
        let current = self.navigator.current();
        sidebar_items()
            .into_iter()
            .map(|item| {
                let active = item.is_active(&current);
                (item, active)
            })
            .collect()
    }
}
