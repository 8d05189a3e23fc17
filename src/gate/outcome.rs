//! Gate states, terminal outcomes and the completion signal

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::auth::Session;
use crate::store::UserProfile;

/// Position of a gate run; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Waiting for the identity provider
    Init,
    /// No active session
    Unauthenticated,
    /// Fetching, creating or migrating the profile
    ResolvingProfile,
    /// The store failed
    ProfileError,
    /// Evaluating the policy
    Authorizing,
    /// The policy refused access
    Denied,
    /// Collecting missing profile data
    PostAuthSetup,
    /// Page unblocked
    Ready,
}

/// Coarse reason shown by the login page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Role or general policy denial
    Access,
    /// Identity outside the allowed domains and not otherwise admitted
    Domain,
    /// The profile could not be read or written
    Profile,
}

impl ErrorCode {
    /// Query parameter value
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Access => "access",
            ErrorCode::Domain => "domain",
            ErrorCode::Profile => "profile",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a rejected visitor is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirect {
    /// Login page without a reason
    Login,
    /// Login page with `error=<code>`
    LoginWithError(ErrorCode),
}

impl Redirect {
    /// Target relative to the configured login page
    pub fn location(&self, login_page: &str) -> String {
        match self {
            Redirect::Login => login_page.to_string(),
            Redirect::LoginWithError(code) => {
                let separator = if login_page.contains('?') { '&' } else { '?' };
                format!("{}{}error={}", login_page, separator, code)
            }
        }
    }

    /// Reason code, if any
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            Redirect::Login => None,
            Redirect::LoginWithError(code) => Some(*code),
        }
    }
}

/// State handed to page code once the gate lets the visitor in
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    /// Current session
    pub session: Session,
    /// Current profile, role-normalized
    pub profile: UserProfile,
    role: Option<String>,
}

impl AuthContext {
    pub(crate) fn new(session: Session, profile: UserProfile, role: Option<String>) -> Self {
        Self {
            session,
            profile,
            role,
        }
    }

    /// Resolved role
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    /// Name to greet the visitor with
    pub fn display_name(&self) -> Option<&str> {
        Some(self.profile.display_name.as_str())
            .filter(|name| !name.trim().is_empty())
            .or(self.session.display_name.as_deref())
    }
}

/// Terminal action of a gate run
#[derive(Debug, Clone)]
pub enum GateOutcome {
    /// The visitor left for the login page
    Redirected(Redirect),
    /// The page was unblocked
    Ready(Arc<AuthContext>),
}

impl GateOutcome {
    /// Context when the page was unblocked
    pub fn context(&self) -> Option<&Arc<AuthContext>> {
        match self {
            GateOutcome::Ready(context) => Some(context),
            GateOutcome::Redirected(_) => None,
        }
    }

    /// Redirect when the visitor was turned away
    pub fn redirect(&self) -> Option<Redirect> {
        match self {
            GateOutcome::Redirected(redirect) => Some(*redirect),
            GateOutcome::Ready(_) => None,
        }
    }

    /// Terminal state the run ended in
    pub fn state(&self) -> GateState {
        match self {
            GateOutcome::Ready(_) => GateState::Ready,
            GateOutcome::Redirected(Redirect::Login) => GateState::Unauthenticated,
            GateOutcome::Redirected(Redirect::LoginWithError(ErrorCode::Profile)) => {
                GateState::ProfileError
            }
            GateOutcome::Redirected(Redirect::LoginWithError(_)) => GateState::Denied,
        }
    }
}

/// Completion signal; any number of page scripts may wait on it
#[derive(Clone)]
pub struct AuthReady {
    rx: watch::Receiver<Option<Arc<AuthContext>>>,
}

impl AuthReady {
    pub(crate) fn new(rx: watch::Receiver<Option<Arc<AuthContext>>>) -> Self {
        Self { rx }
    }

    /// Context if the signal has fired
    pub fn get(&self) -> Option<Arc<AuthContext>> {
        self.rx.borrow().clone()
    }

    /// Wait for the signal. Returns `None` when the gate ended without
    /// unblocking the page.
    pub async fn wait(&self) -> Option<Arc<AuthContext>> {
        let mut rx = self.rx.clone();
        let fired = rx.wait_for(Option::is_some).await;
        fired.ok().and_then(|context| context.clone())
    }
}

/// Sending half of [`AuthReady`]; fires at most once
pub(crate) struct ReadySignal {
    tx: watch::Sender<Option<Arc<AuthContext>>>,
}

impl ReadySignal {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> AuthReady {
        AuthReady::new(self.tx.subscribe())
    }

    /// Returns false if the signal had already fired
    pub(crate) fn fire(&self, context: Arc<AuthContext>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(context);
            true
        })
    }
}
