//! Page surface the gate drives: content visibility, navigation slots,
//! the sign-out control and redirects

mod prompt;

use log::warn;
use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::error::Error;

pub use prompt::*;

/// DOM hooks shared by every protected page
pub trait PageSurface: Send + Sync {
    /// Hide protected content
    fn hide_content(&self);

    /// Show protected content
    fn reveal_content(&self);

    /// Fill the username slot
    fn set_user_name(&self, name: &str);

    /// Fill the avatar-initials slot
    fn set_avatar_initials(&self, initials: &str);

    /// Append an entry to the navigation-link container
    fn append_nav_link(&self, link: &NavLink);

    /// Attach the action behind the sign-out control
    fn bind_sign_out(&self, control: SignOutControl);

    /// Leave the page
    fn redirect(&self, location: &str);
}

/// Navigation entry shown only to some roles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavLink {
    /// Visible text
    pub label: String,
    /// Target page
    pub href: String,
    /// Roles that see the entry
    pub roles: Vec<String>,
}

impl NavLink {
    /// Entry visible to nobody until roles are added
    pub fn new(label: &str, href: &str) -> Self {
        Self {
            label: label.to_string(),
            href: href.to_string(),
            roles: Vec::new(),
        }
    }

    /// Show the entry to this role
    pub fn for_role(mut self, role: &str) -> Self {
        self.roles.push(role.to_string());
        self
    }

    /// Whether a visitor with this role sees the entry
    pub fn visible_to(&self, role: Option<&str>) -> bool {
        role.map_or(false, |role| self.roles.iter().any(|r| r == role))
    }
}

/// Action wired to the sign-out control
#[derive(Clone)]
pub struct SignOutControl {
    identity: Arc<dyn IdentityProvider>,
    surface: Arc<dyn PageSurface>,
    location: String,
}

impl SignOutControl {
    /// Control that signs out and then leaves for `location`
    pub fn new(identity: Arc<dyn IdentityProvider>, surface: Arc<dyn PageSurface>, location: &str) -> Self {
        Self {
            identity,
            surface,
            location: location.to_string(),
        }
    }

    /// Where the visitor lands after signing out
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Clear the session and redirect
    pub async fn trigger(&self) -> Result<(), Error> {
        let result = self.identity.sign_out().await;
        if let Err(ref e) = result {
            warn!("Sign-out reported an error: {}", e);
        }
        self.surface.redirect(&self.location);
        result
    }
}

/// Avatar placeholder: first letters of up to two name words, or the first
/// letter of the email
pub fn initials(display_name: Option<&str>, email: &str) -> String {
    match display_name.filter(|name| !name.trim().is_empty()) {
        Some(name) => name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .take(2)
            .collect::<String>()
            .to_uppercase(),
        None => email
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_default(),
    }
}

/// Username slot text: first name, or the email when no name is known
pub fn short_name(display_name: Option<&str>, email: &str) -> String {
    display_name
        .and_then(|name| name.split_whitespace().next())
        .unwrap_or(email)
        .to_string()
}
