//! In-memory location and back stack

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::route::normalize_path;
use crate::Result;

/// Oldest locations fall off the back stack past this depth
pub const MAX_BACK_ENTRIES: usize = 50;
/// Distinct paths with a visit count; the least visited is forgotten first
pub const MAX_TRACKED_PATHS: usize = 256;

#[derive(Default)]
struct NavigatorState {
    current: String,
    back: VecDeque<String>,
    visits: HashMap<String, u32>,
}

impl NavigatorState {
    fn push_back_entry(&mut self, path: String) {
        if self.back.len() == MAX_BACK_ENTRIES {
            self.back.pop_front();
        }
        self.back.push_back(path);
    }

    fn record_visit(&mut self, path: &str) {
        if !self.visits.contains_key(path) && self.visits.len() >= MAX_TRACKED_PATHS {
            let least = self
                .visits
                .iter()
                .filter(|(tracked, _)| **tracked != self.current)
                .min_by_key(|(_, count)| **count)
                .map(|(tracked, _)| tracked.clone());
            if let Some(least) = least {
                self.visits.remove(&least);
            }
        }
        *self.visits.entry(path.to_string()).or_insert(0) += 1;
    }
}

/// Current location of the app. Clones share state.
#[derive(Clone)]
pub struct Navigator {
    state: Arc<RwLock<NavigatorState>>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::starting_at("/")
    }

    /// Start at `path`, falling back to `/` when it is not a valid path
    pub fn starting_at(path: &str) -> Self {
        let current = normalize_path(path).unwrap_or_else(|_| "/".to_string());
        let mut visits = HashMap::new();
        visits.insert(current.clone(), 1);
        Self {
            state: Arc::new(RwLock::new(NavigatorState {
                current,
                back: VecDeque::new(),
                visits,
            })),
        }
    }

    /// Go to `path`. Navigating to the current location is a no-op.
    pub fn navigate(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let mut state = self.state.write();
        if state.current == path {
            return Ok(());
        }

        let previous = std::mem::replace(&mut state.current, path.clone());
        state.push_back_entry(previous);
        state.record_visit(&path);

        tracing::debug!(path = %path, "Navigated");
        Ok(())
    }

    /// Return to the previous location, if any
    pub fn back(&self) -> Option<String> {
        let mut state = self.state.write();
        let previous = state.back.pop_back()?;
        state.current = previous.clone();
        Some(previous)
    }

    pub fn current(&self) -> String {
        self.state.read().current.clone()
    }

    pub fn can_go_back(&self) -> bool {
        !self.state.read().back.is_empty()
    }

    /// Number of times `path` was navigated to
    pub fn visits(&self, path: &str) -> u32 {
        let Ok(path) = normalize_path(path) else {
            return 0;
        };
        self.state.read().visits.get(&path).copied().unwrap_or(0)
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NavigationError;

    #[test]
    fn test_navigator() {
        let navigator = Navigator::new();
        assert_eq!(navigator.current(), "/");
        assert!(!navigator.can_go_back());

        navigator.navigate("/products").unwrap();
        navigator.navigate("/add-product").unwrap();
        navigator.navigate("/products/").unwrap();
        assert_eq!(navigator.current(), "/products");
        assert_eq!(navigator.visits("/products"), 2);

        assert_eq!(navigator.back(), Some("/add-product".to_string()));
        assert_eq!(navigator.back(), Some("/products".to_string()));
        assert_eq!(navigator.back(), Some("/".to_string()));
        assert_eq!(navigator.back(), None);
        assert_eq!(navigator.current(), "/");
    }

    #[test]
    fn test_same_location_is_not_pushed() {
        let navigator = Navigator::starting_at("/settings");
        navigator.navigate("/settings?tab=billing").unwrap();
        assert!(!navigator.can_go_back());
        assert_eq!(navigator.visits("/settings"), 1);
    }

    #[test]
    fn test_invalid_path_is_rejected() {
        let navigator = Navigator::new();
        assert!(matches!(
            navigator.navigate("products"),
            Err(NavigationError::InvalidPath(_))
        ));
        assert_eq!(navigator.current(), "/");
        assert_eq!(navigator.visits("not a path"), 0);
    }

    #[test]
    fn test_back_stack_is_bounded() {
        let navigator = Navigator::new();
        for i in 0..MAX_BACK_ENTRIES + 10 {
            navigator.navigate(&format!("/products/{i}")).unwrap();
        }

        let mut steps = 0;
        let mut oldest = None;
        while let Some(previous) = navigator.back() {
            oldest = Some(previous);
            steps += 1;
        }
        assert_eq!(steps, MAX_BACK_ENTRIES);
        // "/" and the first nine products fell off
        assert_eq!(oldest.as_deref(), Some("/products/9"));
    }

    #[test]
    fn test_visit_counts_are_bounded() {
        let navigator = Navigator::new();
        navigator.navigate("/products").unwrap();
        navigator.navigate("/").unwrap();
        navigator.navigate("/products").unwrap();
        for i in 0..MAX_TRACKED_PATHS + 10 {
            navigator.navigate(&format!("/campaigns/{i}")).unwrap();
        }

        let state = navigator.state.read();
        assert!(state.visits.len() <= MAX_TRACKED_PATHS);
        drop(state);
        assert_eq!(navigator.visits("/products"), 2);
        assert_eq!(navigator.visits(&format!("/campaigns/{}", MAX_TRACKED_PATHS + 9)), 1);
    }

    #[test]
    fn test_clones_share_location() {
        let navigator = Navigator::new();
        let other = navigator.clone();
        other.navigate("/campaigns").unwrap();
        assert_eq!(navigator.current(), "/campaigns");
    }
}
