#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

use hub_gate::auth::{AuthState, LocalIdentity, Session, PASSWORD_PROVIDER};
use hub_gate::config::GateOptions;
use hub_gate::gate::AuthGate;
use hub_gate::policy::AccessPolicy;
use hub_gate::store::MemoryStore;
use hub_gate::ui::{ChannelPrompt, NavLink, PageSurface, SignOutControl};

/// Something the gate did to the page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Hidden,
    Revealed,
    UserName(String),
    Initials(String),
    Link(String),
    SignOutBound,
    Redirect {
        location: String,
        session_active: bool,
    },
}

/// Page surface that records every call
#[derive(Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<PageEvent>>,
    control: Mutex<Option<SignOutControl>>,
    identity: Mutex<Option<Arc<LocalIdentity>>>,
}

impl RecordingSurface {
    pub fn watching(identity: Arc<LocalIdentity>) -> Self {
        let surface = Self::default();
        *surface.identity.lock().unwrap() = Some(identity);
        surface
    }

    fn push(&self, event: PageEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<PageEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn redirects(&self) -> Vec<PageEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, PageEvent::Redirect { .. }))
            .collect()
    }

    pub fn revealed(&self) -> bool {
        self.events().contains(&PageEvent::Revealed)
    }

    pub fn sign_out_control(&self) -> Option<SignOutControl> {
        self.control.lock().unwrap().clone()
    }
}

impl PageSurface for RecordingSurface {
    fn hide_content(&self) {
        self.push(PageEvent::Hidden);
    }

    fn reveal_content(&self) {
        self.push(PageEvent::Revealed);
    }

    fn set_user_name(&self, name: &str) {
        self.push(PageEvent::UserName(name.to_string()));
    }

    fn set_avatar_initials(&self, initials: &str) {
        self.push(PageEvent::Initials(initials.to_string()));
    }

    fn append_nav_link(&self, link: &NavLink) {
        self.push(PageEvent::Link(link.href.clone()));
    }

    fn bind_sign_out(&self, control: SignOutControl) {
        *self.control.lock().unwrap() = Some(control);
        self.push(PageEvent::SignOutBound);
    }

    fn redirect(&self, location: &str) {
        let session_active = self
            .identity
            .lock()
            .unwrap()
            .as_ref()
            .map_or(false, |identity| {
                matches!(identity.current(), AuthState::SignedIn(_))
            });
        self.push(PageEvent::Redirect {
            location: location.to_string(),
            session_active,
        });
    }
}

/// Collaborators for one simulated page load
pub struct Harness {
    pub identity: Arc<LocalIdentity>,
    pub store: Arc<MemoryStore>,
    pub surface: Arc<RecordingSurface>,
    pub prompt: Arc<ChannelPrompt>,
    pub names: UnboundedSender<String>,
}

impl Harness {
    pub fn new(session: Option<Session>) -> Self {
        Self::with_store(session, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(session: Option<Session>, store: Arc<MemoryStore>) -> Self {
        let identity = Arc::new(match session {
            Some(session) => LocalIdentity::signed_in(session),
            None => LocalIdentity::signed_out(),
        });
        let surface = Arc::new(RecordingSurface::watching(identity.clone()));
        let (prompt, names) = ChannelPrompt::channel();
        Self {
            identity,
            store,
            surface,
            prompt: Arc::new(prompt),
            names,
        }
    }

    pub fn gate(&self, policy: AccessPolicy, options: GateOptions) -> AuthGate {
        AuthGate::new(
            self.identity.clone(),
            self.store.clone(),
            policy,
            self.surface.clone(),
            self.prompt.clone(),
            options,
        )
        .with_allowlist(self.store.clone())
    }
}

pub fn staff() -> Session {
    Session::new("uid-jane", "jane@eduversal.org")
        .with_display_name("Jane Q Public")
        .with_provider("google.com")
}

pub fn contractor() -> Session {
    Session::new("uid-ops", "ops@contractor.io")
        .with_display_name("Omar Park")
        .with_provider(PASSWORD_PROVIDER)
}

pub fn outsider() -> Session {
    Session::new("uid-out", "someone@gmail.com")
        .with_display_name("Some One")
        .with_provider("google.com")
}

pub fn hub_policy() -> AccessPolicy {
    AccessPolicy::new()
        .with_domain("eduversal.org")
        .with_provider(PASSWORD_PROVIDER)
        .with_allowlist(true)
}
