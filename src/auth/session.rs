//! Session state published by the identity provider

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Sign-in method reported for email/password accounts
pub const PASSWORD_PROVIDER: &str = "password";

/// The live, provider-issued proof that a browser belongs to an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique subject identifier
    pub uid: String,

    /// Email address
    pub email: String,

    /// Display name, when the provider knows one
    pub display_name: Option<String>,

    /// Avatar URL
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,

    /// Sign-in methods used by this identity
    pub providers: Vec<String>,

    /// Bearer token for store calls made on behalf of this session
    #[serde(skip_serializing, default)]
    pub access_token: Option<String>,

    /// Expiry as a unix timestamp
    pub expires_at: Option<i64>,
}

impl Session {
    /// Create a session without token material
    pub fn new(uid: &str, email: &str) -> Self {
        Self {
            uid: uid.to_string(),
            email: email.to_string(),
            display_name: None,
            photo_url: None,
            providers: Vec::new(),
            access_token: None,
            expires_at: None,
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, value: &str) -> Self {
        self.display_name = Some(value.to_string());
        self
    }

    /// Add a sign-in method
    pub fn with_provider(mut self, value: &str) -> Self {
        self.providers.push(value.to_string());
        self
    }

    /// Lower-cased part of the email after the last `@`
    pub fn email_domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
    }

    /// Whether the identity authenticated with the given method
    pub fn signed_in_with(&self, provider: &str) -> bool {
        self.providers.iter().any(|p| p == provider)
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now().timestamp() >= expires_at,
            None => false,
        }
    }
}

/// What the identity provider currently knows about the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Persisted credentials have not been checked yet
    Resolving,

    /// No active session
    SignedOut,

    /// Active session
    SignedIn(Session),
}

impl AuthState {
    /// Whether the provider has settled on an answer
    pub fn is_resolved(&self) -> bool {
        !matches!(self, AuthState::Resolving)
    }

    /// The active session, if any
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::SignedIn(session) => Some(session),
            _ => None,
        }
    }
}
