//! Gate in front of protected views.

use std::sync::Arc;
use tokio::sync::watch;

use crate::route::{Navigator, Route};
use crate::session::{SessionManager, SessionState};

/// What to do with a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// Session restoration has not finished; show nothing yet.
    Defer,
    Redirect(Route),
}

/// Outcome of [`RouteGuard::render`].
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<V> {
    Rendered(V),
    Deferred,
    Redirected(Route),
}

/// Decides every navigation from the live session state. Nothing is cached
/// between calls.
#[derive(Clone)]
pub struct RouteGuard {
    session: watch::Receiver<SessionState>,
    navigator: Arc<dyn Navigator>,
}

impl RouteGuard {
    pub fn new(session: &SessionManager, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            session: session.subscribe(),
            navigator,
        }
    }

    /// Decides without side effects.
    pub fn decide(&self, route: Route) -> GuardDecision {
        if !route.is_protected() {
            return GuardDecision::Render;
        }
        match &*self.session.borrow() {
            SessionState::Unknown => GuardDecision::Defer,
            SessionState::Unauthenticated => GuardDecision::Redirect(Route::Login),
            SessionState::Authenticated { .. } => GuardDecision::Render,
        }
    }

    /// Decides and, on redirect, sends the navigator to the target.
    pub fn check(&self, route: Route) -> GuardDecision {
        let decision = self.decide(route);
        match decision {
            GuardDecision::Redirect(target) => {
                tracing::debug!(from = %route, to = %target, "protected route redirected");
                self.navigator.navigate(target);
            }
            GuardDecision::Defer => {
                tracing::debug!(route = %route, "session undecided, deferring");
            }
            GuardDecision::Render => {}
        }
        decision
    }

    /// Runs `view` only when `route` may be shown.
    pub fn render<V>(&self, route: Route, view: impl FnOnce() -> V) -> Guarded<V> {
        match self.check(route) {
            GuardDecision::Render => Guarded::Rendered(view()),
            GuardDecision::Defer => Guarded::Deferred,
            GuardDecision::Redirect(target) => Guarded::Redirected(target),
        }
    }

    /// Waits until session restoration has produced a decision.
    pub async fn decided(&self) -> SessionState {
        let mut rx = self.session.clone();
        if rx.wait_for(SessionState::is_decided).await.is_err() {
            tracing::debug!("session manager dropped before a decision was made");
        }
        let state = rx.borrow().clone();
        state
    }
}
