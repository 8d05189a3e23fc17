//! Wire types for the identity endpoints

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::auth::session::{Session, PASSWORD_PROVIDER};
use crate::error::Error;

/// User data returned by `GET /auth/v1/user`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// The user ID
    pub id: String,

    /// The user's email address
    pub email: Option<String>,

    /// The app metadata
    #[serde(default)]
    pub app_metadata: HashMap<String, serde_json::Value>,

    /// The user metadata
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,

    /// The user's authentication providers
    pub identities: Option<Vec<Identity>>,
}

/// A user identity (authentication provider)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// The identity ID
    pub id: String,

    /// The identity provider
    pub provider: String,
}

/// Claims read from an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject
    pub sub: String,

    /// Expiry
    pub exp: Option<i64>,

    /// Email
    pub email: Option<String>,
}

fn metadata_str(metadata: &HashMap<String, serde_json::Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| metadata.get(*key).and_then(|v| v.as_str()))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn normalize_provider(provider: &str) -> String {
    match provider {
        "email" => PASSWORD_PROVIDER.to_string(),
        other => other.to_string(),
    }
}

impl User {
    /// Sign-in methods, preferring the aggregated `providers` list
    pub fn providers(&self) -> Vec<String> {
        let listed: Vec<String> = self
            .app_metadata
            .get("providers")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str())
                    .map(normalize_provider)
                    .collect()
            })
            .unwrap_or_default();

        if !listed.is_empty() {
            return listed;
        }

        self.identities
            .iter()
            .flatten()
            .map(|identity| normalize_provider(&identity.provider))
            .collect()
    }

    /// Build a session for this user
    pub fn into_session(self, access_token: &str, expires_at: Option<i64>) -> Result<Session, Error> {
        let email = self
            .email
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::auth(format!("user {} has no email address", self.id)))?;

        Ok(Session {
            display_name: metadata_str(&self.user_metadata, &["full_name", "name"]),
            photo_url: metadata_str(&self.user_metadata, &["avatar_url", "picture"]),
            providers: self.providers(),
            uid: self.id,
            email,
            access_token: Some(access_token.to_string()),
            expires_at,
        })
    }
}
