//! The authentication gate run by every protected page before it renders.
//!
//! A run waits for the identity provider, resolves (and if needed creates or
//! migrates) the visitor's profile, evaluates the access policy, collects a
//! missing display name and finally unblocks the page. Each step waits for the
//! previous one; exactly one terminal action happens per run: a redirect to the
//! login page, or an unblocked page with [`AuthReady`] fired once.
//!
//! The gate is a convenience layer. The backing store must enforce its own
//! access rules.

mod outcome;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthState, IdentityProvider, Session};
use crate::config::GateOptions;
use crate::error::{Error, StoreError};
use crate::migration::Migrator;
use crate::policy::{AccessPolicy, Decision};
use crate::store::{EmailAllowlist, ProfilePatch, ProfileStore, UserProfile};
use crate::ui::{collect_display_name, initials, short_name, NamePrompt, PageSurface, SignOutControl};

pub use outcome::*;

async fn bounded<T, E, F>(limit: Option<Duration>, call: F) -> Result<T, E>
where
    E: From<StoreError>,
    F: Future<Output = Result<T, E>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| E::from(StoreError::Timeout))?,
        None => call.await,
    }
}

/// Allowlist lookups bounded by the store timeout
struct BoundedAllowlist<'a> {
    inner: &'a dyn EmailAllowlist,
    limit: Option<Duration>,
}

#[async_trait]
impl<'a> EmailAllowlist for BoundedAllowlist<'a> {
    async fn is_listed(&self, email: &str) -> Result<bool, StoreError> {
        bounded(self.limit, self.inner.is_listed(email)).await
    }
}

/// One-shot authentication gate for a page load
pub struct AuthGate {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn ProfileStore>,
    allowlist: Option<Arc<dyn EmailAllowlist>>,
    policy: AccessPolicy,
    surface: Arc<dyn PageSurface>,
    prompt: Arc<dyn NamePrompt>,
    options: GateOptions,
    migrator: Migrator,
    state: GateState,
    ready: ReadySignal,
}

impl AuthGate {
    /// Assemble a gate from its collaborators
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn ProfileStore>,
        policy: AccessPolicy,
        surface: Arc<dyn PageSurface>,
        prompt: Arc<dyn NamePrompt>,
        options: GateOptions,
    ) -> Self {
        let migrator = Migrator::for_schema(&options.role_schema);
        Self {
            identity,
            store,
            allowlist: None,
            policy,
            surface,
            prompt,
            options,
            migrator,
            state: GateState::Init,
            ready: ReadySignal::new(),
        }
    }

    /// Allowlist consulted when the policy asks for it
    pub fn with_allowlist(mut self, allowlist: Arc<dyn EmailAllowlist>) -> Self {
        self.allowlist = Some(allowlist);
        self
    }

    /// Completion signal for page scripts; subscribe before [`AuthGate::run`]
    pub fn ready(&self) -> AuthReady {
        self.ready.subscribe()
    }

    fn transition(&mut self, next: GateState) {
        debug!("Gate {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run the gate to its terminal action. Consumes the gate, so a page load
    /// runs it at most once; session changes after the first resolved state
    /// are not observed. [`GateOutcome::state`] reports where the run ended.
    pub async fn run(mut self) -> GateOutcome {
        if self.options.hide_until_ready {
            self.surface.hide_content();
        }

        let Some(session) = self.await_session().await else {
            self.transition(GateState::Unauthenticated);
            info!("No active session, sending visitor to login");
            return self.leave(Redirect::Login);
        };
        self.store.set_auth(session.access_token.as_deref());

        self.transition(GateState::ResolvingProfile);
        let mut profile = match self.resolve_profile(&session).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Profile unavailable for {}: {}", session.uid, e);
                self.transition(GateState::ProfileError);
                return self.reject(ErrorCode::Profile).await;
            }
        };

        self.transition(GateState::Authorizing);
        let role = self
            .options
            .role_schema
            .resolve(&profile)
            .map(str::to_string);
        let decision = {
            let bounded_allowlist = self.allowlist.as_deref().map(|inner| BoundedAllowlist {
                inner,
                limit: self.options.request_timeout,
            });
            let allowlist = bounded_allowlist.as_ref().map(|a| a as &dyn EmailAllowlist);
            self.policy.evaluate(&session, role.as_deref(), allowlist).await
        };
        if let Decision::Denied(denial) = decision {
            info!("Access denied for {}: {:?}", session.uid, denial);
            self.transition(GateState::Denied);
            return self.reject(denial.error_code()).await;
        }
        debug!("Access granted for {}: {:?}", session.uid, decision);

        self.transition(GateState::PostAuthSetup);
        if !profile.has_display_name() {
            let name = collect_display_name(self.prompt.as_ref(), self.surface.as_ref()).await;
            if let Err(e) = self.save_display_name(&session.uid, &name).await {
                warn!("Could not save display name for {}: {}", session.uid, e);
                self.transition(GateState::ProfileError);
                return self.reject(ErrorCode::Profile).await;
            }
            profile.display_name = name;
        }
        self.options.role_schema.normalize(&mut profile);

        self.transition(GateState::Ready);
        let context = Arc::new(AuthContext::new(session, profile, role));
        self.patch_navigation(&context);
        self.surface.reveal_content();
        self.ready.fire(Arc::clone(&context));
        info!("Gate ready for {}", context.session.uid);
        GateOutcome::Ready(context)
    }

    async fn await_session(&self) -> Option<Session> {
        let mut rx = self.identity.subscribe();
        let state = rx
            .wait_for(AuthState::is_resolved)
            .await
            .map(|state| state.clone());

        match state {
            Ok(AuthState::SignedIn(session)) if session.is_expired() => {
                debug!("Session for {} has expired", session.uid);
                None
            }
            Ok(state) => state.session().cloned(),
            Err(_) => {
                warn!("Identity provider closed before resolving the session");
                None
            }
        }
    }

    async fn resolve_profile(&self, session: &Session) -> Result<UserProfile, StoreError> {
        let limit = self.options.request_timeout;
        let mut profile = match bounded(limit, self.store.get_profile(&session.uid)).await? {
            Some(profile) => profile,
            None => self.create_profile(session).await?,
        };

        if let Some(patch) = self.migrator.plan(&profile) {
            bounded(limit, self.store.update_profile(&profile.uid, &patch)).await?;
            profile.merge(&patch)?;
        }

        Ok(profile)
    }

    async fn create_profile(&self, session: &Session) -> Result<UserProfile, StoreError> {
        let limit = self.options.request_timeout;
        let mut profile = UserProfile::for_session(session, self.migrator.target_version());
        profile.fields.extend(self.options.role_schema.initial_fields());

        match bounded(limit, self.store.create_profile(&profile)).await {
            Ok(()) => {
                info!("Created profile for {}", session.uid);
                Ok(profile)
            }
            Err(StoreError::AlreadyExists(_)) => {
                info!("Profile for {} was created concurrently, reading it back", session.uid);
                bounded(limit, self.store.get_profile(&session.uid))
                    .await?
                    .ok_or_else(|| {
                        StoreError::Unavailable(format!("profile {} missing after create conflict", session.uid))
                    })
            }
            Err(e) => Err(e),
        }
    }

    async fn save_display_name(&self, uid: &str, name: &str) -> Result<(), StoreError> {
        let mut patch = ProfilePatch::new();
        patch.insert("displayName".to_string(), Value::String(name.to_string()));
        bounded(self.options.request_timeout, self.store.update_profile(uid, &patch)).await
    }

    fn patch_navigation(&self, context: &AuthContext) {
        let email = &context.session.email;
        let name = context.display_name();

        self.surface.set_user_name(&short_name(name, email));
        self.surface.set_avatar_initials(&initials(name, email));

        for link in &self.options.nav_links {
            if link.visible_to(context.role()) {
                self.surface.append_nav_link(link);
            }
        }

        self.surface.bind_sign_out(SignOutControl::new(
            Arc::clone(&self.identity),
            Arc::clone(&self.surface),
            &Redirect::Login.location(&self.options.login_page),
        ));
    }

    async fn reject(&self, code: ErrorCode) -> GateOutcome {
        let signed_out: Result<(), Error> =
            bounded(self.options.request_timeout, self.identity.sign_out()).await;
        if let Err(e) = signed_out {
            warn!("Sign-out before redirect failed: {}", e);
        }
        self.leave(Redirect::LoginWithError(code))
    }

    fn leave(&self, redirect: Redirect) -> GateOutcome {
        self.surface
            .redirect(&redirect.location(&self.options.login_page));
        GateOutcome::Redirected(redirect)
    }
}
