//! Routes and the two route sets

use serde::{Deserialize, Serialize};

use crate::error::NavigationError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    SignUp,
    SignIn,
    Dashboard,
    AiLibrary,
    Products,
    AddProduct,
    Campaigns,
    Settings,
}

const PUBLIC_ROUTES: &[Route] = &[Route::SignUp, Route::SignIn];

const PROTECTED_ROUTES: &[Route] = &[
    Route::Dashboard,
    Route::AiLibrary,
    Route::Products,
    Route::AddProduct,
    Route::Campaigns,
    Route::Settings,
];

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::SignUp => "/signup",
            Route::SignIn => "/signin",
            Route::Dashboard => "/",
            Route::AiLibrary => "/ai-library",
            Route::Products => "/products",
            Route::AddProduct => "/add-product",
            Route::Campaigns => "/campaigns",
            Route::Settings => "/settings",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::SignUp => "Sign Up",
            Route::SignIn => "Sign In",
            Route::Dashboard => "Dashboard",
            Route::AiLibrary => "AI Library",
            Route::Products => "Products",
            Route::AddProduct => "Add Product",
            Route::Campaigns => "Campaigns",
            Route::Settings => "Settings",
        }
    }

    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::SignUp | Route::SignIn)
    }

    /// Exact match on an already normalized path
    pub fn from_path(path: &str) -> Option<Self> {
        let route = match path {
            "/signup" => Route::SignUp,
            "/signin" => Route::SignIn,
            "/" => Route::Dashboard,
            "/ai-library" => Route::AiLibrary,
            "/products" => Route::Products,
            "/add-product" => Route::AddProduct,
            "/campaigns" => Route::Campaigns,
            "/settings" => Route::Settings,
            _ => return None,
        };
        Some(route)
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Strip query, fragment and trailing slashes from an app path
pub fn normalize_path(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok("/".to_string());
    }
    if !input.starts_with('/') || input.contains(char::is_whitespace) {
        return Err(NavigationError::InvalidPath(input.to_string()));
    }

    let mut cut = input.len();
    for ch in ['?', '#'] {
        if let Some(idx) = input.find(ch) {
            cut = cut.min(idx);
        }
    }

    let path = input[..cut].trim_end_matches('/');
    if path.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(path.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteSetKind {
    Public,
    Protected,
}

/// The views reachable for one session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSet {
    kind: RouteSetKind,
}

impl RouteSet {
    pub fn for_session(present: bool) -> Self {
        if present {
            Self::protected()
        } else {
            Self::public()
        }
    }

    pub fn public() -> Self {
        Self {
            kind: RouteSetKind::Public,
        }
    }

    pub fn protected() -> Self {
        Self {
            kind: RouteSetKind::Protected,
        }
    }

    pub fn kind(&self) -> RouteSetKind {
        self.kind
    }

    pub fn is_protected(&self) -> bool {
        self.kind == RouteSetKind::Protected
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            RouteSetKind::Public => "public",
            RouteSetKind::Protected => "protected",
        }
    }

    pub fn routes(&self) -> &'static [Route] {
        match self.kind {
            RouteSetKind::Public => PUBLIC_ROUTES,
            RouteSetKind::Protected => PROTECTED_ROUTES,
        }
    }

    pub fn contains(&self, route: Route) -> bool {
        self.routes().contains(&route)
    }

    /// Where a fresh render of this set lands
    pub fn landing(&self) -> Route {
        match self.kind {
            RouteSetKind::Public => Route::SignIn,
            RouteSetKind::Protected => Route::Dashboard,
        }
    }

    /// View rendered for `path`. The public set never misses: anything
    /// other than the sign-up page shows sign-in.
    pub fn resolve(&self, path: &str) -> Option<Route> {
        let normalized = normalize_path(path).ok();
        match self.kind {
            RouteSetKind::Public => match normalized.as_deref() {
                Some("/signup") => Some(Route::SignUp),
                _ => Some(Route::SignIn),
            },
            RouteSetKind::Protected => normalized
                .as_deref()
                .and_then(Route::from_path)
                .filter(|route| route.is_protected()),
        }
    }

    /// Like [`resolve`](Self::resolve) but reports why nothing matched
    pub fn route(&self, path: &str) -> Result<Route> {
        let normalized = normalize_path(path)?;
        self.resolve(&normalized)
            .ok_or_else(|| NavigationError::UnknownRoute {
                path: normalized,
                route_set: self.name(),
            })
    }
}
