//! Project settings and gate options

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

use crate::error::Error;
use crate::migration::RoleSchema;
use crate::ui::NavLink;

/// Settings object identifying the backing project.
///
/// Supplied before the gate runs. [`ProjectConfig::validate`] must pass before
/// any client is constructed from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Public API key sent with every request
    pub api_key: String,

    /// Host serving the identity endpoints
    pub auth_domain: String,

    /// Project identifier
    pub project_id: String,

    /// Default storage bucket
    pub storage_bucket: String,

    /// Numeric sender id
    pub messaging_sender_id: String,

    /// Application id, `1:<sender>:<platform>:<hex>`
    pub app_id: String,

    /// Analytics measurement id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_id: Option<String>,

    /// Overrides the service base URL derived from the auth domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
}

fn required_var(name: &str) -> Result<String, Error> {
    env::var(name).map_err(|_| Error::config(format!("{} must be set", name)))
}

impl ProjectConfig {
    /// Load the settings from `FIREBASE_*` environment variables
    pub fn from_env() -> Result<Self, Error> {
        let config = Self {
            api_key: required_var("FIREBASE_API_KEY")?,
            auth_domain: required_var("FIREBASE_AUTH_DOMAIN")?,
            project_id: required_var("FIREBASE_PROJECT_ID")?,
            storage_bucket: required_var("FIREBASE_STORAGE_BUCKET")?,
            messaging_sender_id: required_var("FIREBASE_MESSAGING_SENDER_ID")?,
            app_id: required_var("FIREBASE_APP_ID")?,
            measurement_id: env::var("FIREBASE_MEASUREMENT_ID").ok(),
            service_url: env::var("HUB_SERVICE_URL").ok(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject absent or malformed values instead of degrading later
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("apiKey", &self.api_key),
            ("authDomain", &self.auth_domain),
            ("projectId", &self.project_id),
            ("storageBucket", &self.storage_bucket),
            ("messagingSenderId", &self.messaging_sender_id),
            ("appId", &self.app_id),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config(format!("{} is empty", name)));
            }
            if value.starts_with("YOUR_") {
                return Err(Error::config(format!("{} still holds a placeholder", name)));
            }
        }

        if self.api_key.chars().any(char::is_whitespace) {
            return Err(Error::config("apiKey contains whitespace"));
        }

        if self.auth_domain.contains("://")
            || self.auth_domain.contains('/')
            || self.auth_domain.chars().any(char::is_whitespace)
        {
            return Err(Error::config(format!(
                "authDomain must be a bare host, got {}",
                self.auth_domain
            )));
        }
        Url::parse(&format!("https://{}", self.auth_domain))?;

        if !self.messaging_sender_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::config("messagingSenderId must be numeric"));
        }

        let parts: Vec<&str> = self.app_id.split(':').collect();
        let well_formed = parts.len() == 4
            && parts[0] == "1"
            && parts[1] == self.messaging_sender_id
            && !parts[2].is_empty()
            && !parts[3].is_empty()
            && parts[3].chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed {
            return Err(Error::config(format!("appId is malformed: {}", self.app_id)));
        }

        if let Some(ref service_url) = self.service_url {
            Url::parse(service_url)?;
        }

        Ok(())
    }

    /// Base URL for the identity and data endpoints
    pub fn service_url(&self) -> Result<Url, Error> {
        let raw = match self.service_url {
            Some(ref url) => url.clone(),
            None => format!("https://{}", self.auth_domain),
        };
        Ok(Url::parse(&raw)?)
    }
}

/// Bound applied to store and identity round trips unless configured otherwise
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Behaviour options for a gate run
#[derive(Debug, Clone)]
pub struct GateOptions {
    /// Page the visitor is sent to when the gate rejects them
    pub login_page: String,

    /// Hide protected content until the gate resolves
    pub hide_until_ready: bool,

    /// Upper bound for every store round trip
    pub request_timeout: Option<Duration>,

    /// Collection holding user profiles
    pub profile_collection: String,

    /// Collection listing individually authorized email addresses
    pub allowlist_collection: String,

    /// Where and how the role is stored on the profile
    pub role_schema: RoleSchema,

    /// Role-gated navigation entries
    pub nav_links: Vec<NavLink>,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            login_page: "login.html".to_string(),
            hide_until_ready: true,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            profile_collection: "users".to_string(),
            allowlist_collection: "allowlist".to_string(),
            role_schema: RoleSchema::default(),
            nav_links: Vec::new(),
        }
    }
}

impl GateOptions {
    /// Set the login page
    pub fn with_login_page(mut self, value: &str) -> Self {
        self.login_page = value.to_string();
        self
    }

    /// Set whether content stays hidden until the gate resolves
    pub fn with_hide_until_ready(mut self, value: bool) -> Self {
        self.hide_until_ready = value;
        self
    }

    /// Set the store call timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the profile collection
    pub fn with_profile_collection(mut self, value: &str) -> Self {
        self.profile_collection = value.to_string();
        self
    }

    /// Set the allowlist collection
    pub fn with_allowlist_collection(mut self, value: &str) -> Self {
        self.allowlist_collection = value.to_string();
        self
    }

    /// Set the role schema
    pub fn with_role_schema(mut self, value: RoleSchema) -> Self {
        self.role_schema = value;
        self
    }

    /// Add a role-gated navigation link
    pub fn with_nav_link(mut self, value: NavLink) -> Self {
        self.nav_links.push(value);
        self
    }
}
