//! Client routes and the navigation side effect.

use parking_lot::Mutex;
use std::fmt;

/// Every view the client can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Register,
    Login,
    Dashboard,
    Upload,
}

impl Route {
    pub const ALL: [Self; 5] = [
        Self::Home,
        Self::Register,
        Self::Login,
        Self::Dashboard,
        Self::Upload,
    ];

    pub const fn path(self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Register => "/register",
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
            Self::Upload => "/dashboard/upload",
        }
    }

    /// Routes that require an authenticated session.
    pub const fn is_protected(self) -> bool {
        matches!(self, Self::Dashboard | Self::Upload)
    }

    /// Resolves a path; anything unknown falls back to [`Route::Home`].
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.split(['?', '#']).next().unwrap_or_default();
        let normalized = match trimmed.trim_end_matches('/') {
            "" => "/",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|route| route.path() == normalized)
            .unwrap_or(Self::Home)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Receives navigation requests issued by the session manager and the route
/// guard.
pub trait Navigator: Send + Sync {
    fn navigate(&self, to: Route);
}

/// Navigator that records where the client has been sent.
#[derive(Debug)]
pub struct History {
    entries: Mutex<Vec<Route>>,
}

impl History {
    /// Starts at `initial`.
    pub fn new(initial: Route) -> Self {
        Self {
            entries: Mutex::new(vec![initial]),
        }
    }

    pub fn current(&self) -> Route {
        self.entries
            .lock()
            .last()
            .copied()
            .unwrap_or(Route::Home)
    }

    pub fn entries(&self) -> Vec<Route> {
        self.entries.lock().clone()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(Route::Home)
    }
}

impl Navigator for History {
    fn navigate(&self, to: Route) {
        tracing::debug!(route = %to, "navigate");
        self.entries.lock().push(to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_to_routes() {
        assert_eq!(Route::from_path("/dashboard"), Route::Dashboard);
        assert_eq!(Route::from_path("/dashboard/upload/"), Route::Upload);
        assert_eq!(Route::from_path("/login?next=/dashboard"), Route::Login);
        assert_eq!(Route::from_path(""), Route::Home);
    }

    #[test]
    fn unknown_paths_fall_back_to_home() {
        assert_eq!(Route::from_path("/settings"), Route::Home);
    }

    #[test]
    fn only_dashboard_routes_are_protected() {
        let protected: Vec<_> = Route::ALL.into_iter().filter(|r| r.is_protected()).collect();
        assert_eq!(protected, vec![Route::Dashboard, Route::Upload]);
    }

    #[test]
    fn history_tracks_current_route() {
        let history = History::default();
        history.navigate(Route::Login);
        history.navigate(Route::Dashboard);
        assert_eq!(history.current(), Route::Dashboard);
        assert_eq!(
            history.entries(),
            vec![Route::Home, Route::Login, Route::Dashboard]
        );
    }
}
