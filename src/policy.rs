//! Injected authorization policy
//!
//! Rules are evaluated in a fixed order and the first decisive rule wins:
//!
//! 1. an email domain in the allowed set authorizes outright;
//! 2. when provider or allowlist checks are configured, the identity must have
//!    used an allowed sign-in method or be listed on the external allowlist;
//! 3. when roles are configured, the profile role must be one of them.
//!
//! Anything not explicitly granted is denied.

use log::{debug, warn};
use std::collections::HashSet;

use crate::auth::Session;
use crate::gate::ErrorCode;
use crate::store::EmailAllowlist;

/// Rule that granted access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Email domain is allowed
    Domain,
    /// Signed in with an allowed method
    Provider,
    /// Listed on the external allowlist
    Allowlist,
    /// Profile role is allowed
    Role,
}

/// Rule that refused access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// Outside the allowed domains, not provisioned, not listed
    Domain,
    /// Profile role missing or not allowed
    Role,
    /// No configured rule applies to this identity
    NoRule,
}

impl Denial {
    /// Reason code shown by the login page
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Denial::Domain => ErrorCode::Domain,
            Denial::Role | Denial::NoRule => ErrorCode::Access,
        }
    }
}

/// Outcome of a policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Access granted
    Authorized(Grant),
    /// Access refused
    Denied(Denial),
}

impl Decision {
    /// Whether access was granted
    pub fn is_authorized(&self) -> bool {
        matches!(self, Decision::Authorized(_))
    }
}

/// Static authorization rules for one deployment
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed_domains: HashSet<String>,
    allowed_providers: HashSet<String>,
    allowed_roles: HashSet<String>,
    consult_allowlist: bool,
}

impl AccessPolicy {
    /// Policy that denies everyone
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize every address in this domain
    pub fn with_domain(mut self, domain: &str) -> Self {
        self.allowed_domains.insert(domain.to_ascii_lowercase());
        self
    }

    /// Accept identities that signed in with this method
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.allowed_providers.insert(provider.to_string());
        self
    }

    /// Require the profile role to be one of the configured roles
    pub fn with_role(mut self, role: &str) -> Self {
        self.allowed_roles.insert(role.to_string());
        self
    }

    /// Consult the external allowlist for identities outside the domains
    pub fn with_allowlist(mut self, value: bool) -> Self {
        self.consult_allowlist = value;
        self
    }

    /// Whether the allowlist is part of this policy
    pub fn uses_allowlist(&self) -> bool {
        self.consult_allowlist
    }

    /// Whether a role is in the allowed set
    pub fn allows_role(&self, role: &str) -> bool {
        self.allowed_roles.contains(role)
    }

    fn domain_allowed(&self, session: &Session) -> bool {
        session
            .email_domain()
            .map_or(false, |domain| self.allowed_domains.contains(&domain))
    }

    async fn listed(&self, session: &Session, allowlist: Option<&dyn EmailAllowlist>) -> bool {
        let Some(allowlist) = allowlist else {
            warn!("Allowlist check configured but no allowlist is available");
            return false;
        };
        match allowlist.is_listed(&session.email).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!("Allowlist check failed for {}: {}", session.uid, e);
                false
            }
        }
    }

    /// Evaluate the rules for a session and its resolved role
    pub async fn evaluate(
        &self,
        session: &Session,
        role: Option<&str>,
        allowlist: Option<&dyn EmailAllowlist>,
    ) -> Decision {
        if self.domain_allowed(session) {
            debug!("{} authorized by email domain", session.uid);
            return Decision::Authorized(Grant::Domain);
        }

        let mut grant = None;

        if !self.allowed_providers.is_empty() || self.consult_allowlist {
            if self
                .allowed_providers
                .iter()
                .any(|p| session.signed_in_with(p))
            {
                grant = Some(Grant::Provider);
            } else if self.consult_allowlist && self.listed(session, allowlist).await {
                grant = Some(Grant::Allowlist);
            } else {
                debug!("{} failed the identity checks", session.uid);
                return Decision::Denied(Denial::Domain);
            }
        }

        if !self.allowed_roles.is_empty() {
            match role {
                Some(role) if self.allows_role(role) => grant = Some(Grant::Role),
                _ => {
                    debug!("{} has no allowed role ({:?})", session.uid, role);
                    return Decision::Denied(Denial::Role);
                }
            }
        }

        match grant {
            Some(grant) => Decision::Authorized(grant),
            None => Decision::Denied(Denial::NoRule),
        }
    }
}
