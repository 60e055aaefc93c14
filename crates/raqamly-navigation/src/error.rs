//! Navigation error types

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("No route for {path} in the {route_set} route set")]
    UnknownRoute { path: String, route_set: &'static str },
}
