//! In-process identity provider

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

use crate::auth::{AuthState, IdentityProvider, Session};
use crate::error::Error;

/// Identity provider whose state is driven by the host.
///
/// Used when the session is established by another component in the same
/// process, and by tests.
pub struct LocalIdentity {
    state: watch::Sender<AuthState>,
    sign_outs: AtomicUsize,
}

impl Default for LocalIdentity {
    fn default() -> Self {
        let (state, _) = watch::channel(AuthState::Resolving);
        Self {
            state,
            sign_outs: AtomicUsize::new(0),
        }
    }
}

impl LocalIdentity {
    /// Create a provider that is still resolving
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider already settled on the given session
    pub fn signed_in(session: Session) -> Self {
        let identity = Self::new();
        identity.set_session(Some(session));
        identity
    }

    /// Create a provider already settled on "no session"
    pub fn signed_out() -> Self {
        let identity = Self::new();
        identity.set_session(None);
        identity
    }

    /// Publish a new session state
    pub fn set_session(&self, session: Option<Session>) {
        let state = match session {
            Some(session) => AuthState::SignedIn(session),
            None => AuthState::SignedOut,
        };
        self.state.send_replace(state);
    }

    /// Current session state
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Number of sign-out calls received
    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    async fn sign_out(&self) -> Result<(), Error> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(AuthState::SignedOut);
        Ok(())
    }
}
