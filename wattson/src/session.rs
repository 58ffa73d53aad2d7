//! Process-wide authentication state.
//!
//! [`SessionManager`] owns the single [`SessionState`] value. Dependents get a
//! `watch` receiver and observe every transition as soon as it happens; only
//! `initialize`, `login`, `logout` and `invalidate` write it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::route::{Navigator, Route};
use crate::store::{SessionStore, StoreError, StoredSession};
use crate::types::{Credential, Identity};

/// Authentication status of the client.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Startup restoration has not run yet. Not the same as signed out.
    #[default]
    Unknown,
    Authenticated {
        credential: Credential,
        identity: Identity,
    },
    Unauthenticated,
}

impl SessionState {
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub const fn is_decided(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    pub const fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Authenticated { credential, .. } => Some(credential),
            _ => None,
        }
    }

    pub const fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session already initialized")]
    AlreadyInitialized,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    state: watch::Sender<SessionState>,
    initialized: AtomicBool,
}

impl SessionManager {
    /// Creates a manager in the [`SessionState::Unknown`] state.
    pub fn new(store: Arc<dyn SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        let (state, _) = watch::channel(SessionState::Unknown);
        Self {
            store,
            navigator,
            state,
            initialized: AtomicBool::new(false),
        }
    }

    /// Restores the session from the store. Runs once per manager.
    ///
    /// An unreadable store is treated as signed out.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyInitialized`] on a second call.
    pub fn initialize(&self) -> Result<SessionState, SessionError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyInitialized);
        }

        let restored = match self.store.load() {
            Ok(Some(stored)) => SessionState::Authenticated {
                credential: stored.credential,
                identity: stored.identity,
            },
            Ok(None) => SessionState::Unauthenticated,
            Err(err) => {
                tracing::warn!(error = %err, "failed to restore session, starting signed out");
                SessionState::Unauthenticated
            }
        };

        tracing::debug!(authenticated = restored.is_authenticated(), "session restored");
        self.state.send_replace(restored.clone());
        Ok(restored)
    }

    /// Signs in and sends the user to the dashboard.
    ///
    /// Signing in again with the same credential and identity changes
    /// nothing but still navigates.
    ///
    /// # Errors
    /// Returns an error if the session cannot be persisted; the in-memory
    /// state is left as it was.
    pub fn login(
        &self,
        credential: Credential,
        identity: impl Into<String>,
    ) -> Result<(), SessionError> {
        let identity = Identity::new(identity);
        let unchanged = matches!(
            &*self.state.borrow(),
            SessionState::Authenticated { credential: c, identity: i }
                if *c == credential && *i == identity
        );

        if !unchanged {
            self.store.save(&StoredSession {
                credential: credential.clone(),
                identity: identity.clone(),
            })?;
            tracing::info!(user = %identity, "signed in");
            self.state.send_replace(SessionState::Authenticated {
                credential,
                identity,
            });
        }

        self.navigator.navigate(Route::Dashboard);
        Ok(())
    }

    /// Signs out and sends the user to the login page. Never fails.
    pub fn logout(&self) {
        self.sign_out();
        self.navigator.navigate(Route::Login);
    }

    /// Drops a session the backend no longer accepts.
    ///
    /// Only acts while `rejected` is still the current credential; a late
    /// rejection of a replaced or already dropped session is ignored.
    pub fn invalidate(&self, rejected: &Credential) {
        if self.state.borrow().credential() != Some(rejected) {
            tracing::debug!("ignoring rejection of a credential no longer in use");
            return;
        }
        tracing::info!("credential rejected by server, signing out");
        self.logout();
    }

    fn sign_out(&self) {
        if let Err(err) = self.store.clear() {
            tracing::warn!(error = %err, "failed to clear persisted session");
        }
        let changed = self.state.send_if_modified(|state| {
            if *state == SessionState::Unauthenticated {
                return false;
            }
            *state = SessionState::Unauthenticated;
            true
        });
        if changed {
            tracing::info!("signed out");
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.state.borrow().credential().cloned()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    /// Returns a receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}
