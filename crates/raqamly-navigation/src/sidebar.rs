//! Sidebar navigation items

use serde::Serialize;

use crate::route::{normalize_path, Route};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub route: Route,
    pub label: &'static str,
    pub icon: &'static str,
}

impl NavItem {
    /// Highlighted when `current_path` is this item's page
    pub fn is_active(&self, current_path: &str) -> bool {
        normalize_path(current_path)
            .map(|path| path == self.route.path())
            .unwrap_or(false)
    }
}

/// Items of the signed-in sidebar, top to bottom
pub fn sidebar_items() -> Vec<NavItem> {
    vec![
        NavItem {
            route: Route::Dashboard,
            label: "Dashboard",
            icon: "🏠",
        },
        NavItem {
            route: Route::AiLibrary,
            label: "AI Library",
            icon: "📚",
        },
        NavItem {
            route: Route::Products,
            label: "Products",
            icon: "🛍️",
        },
        NavItem {
            route: Route::Campaigns,
            label: "Campaigns",
            icon: "📢",
        },
        NavItem {
            route: Route::Settings,
            label: "Settings",
            icon: "⚙️",
        },
    ]
}
