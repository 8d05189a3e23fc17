//! Sessions and the identity provider clients

mod local;
mod session;
mod types;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::watch;
use url::Url;

use crate::error::Error;
use crate::fetch::Fetch;

pub use local::*;
pub use session::*;
pub use types::*;

/// Source of session state and the sign-out action.
///
/// The receiver returned by [`IdentityProvider::subscribe`] yields the current
/// state immediately and every later change.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Watch the session state
    fn subscribe(&self) -> watch::Receiver<AuthState>;

    /// End the current session. The local state is cleared even when the
    /// remote call fails.
    async fn sign_out(&self) -> Result<(), Error>;
}

/// Read the claims of an access token without verifying its signature.
///
/// Only used to skip a round trip for tokens that are already expired; the
/// backing store still validates every token it receives.
pub fn read_claims(token: &str) -> Result<TokenClaims, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Client for the identity endpoints of the backing project
pub struct IdentityClient {
    url: Url,
    key: String,
    http_client: Client,
    timeout: Option<Duration>,
    state: watch::Sender<AuthState>,
}

impl IdentityClient {
    /// Create a new identity client; the state starts as `Resolving`
    pub fn new(url: Url, key: &str, http_client: Client) -> Self {
        let (state, _) = watch::channel(AuthState::Resolving);
        Self {
            url,
            key: key.to_string(),
            http_client,
            timeout: None,
            state,
        }
    }

    /// Bound every identity request
    pub fn with_timeout(mut self, value: Option<Duration>) -> Self {
        self.timeout = value;
        self
    }

    fn auth_url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.url.join(&format!("auth/v1/{}", path))?)
    }

    /// Current session state
    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Resolve a persisted access token into a session.
    ///
    /// Expired or rejected tokens resolve to `SignedOut`. Any other failure
    /// also settles the state as `SignedOut` before the error is returned, so
    /// subscribers never wait on a token that cannot be checked.
    pub async fn restore_session(&self, access_token: &str) -> Result<Option<Session>, Error> {
        match self.resolve(access_token).await {
            Ok(Some(session)) => {
                info!("Session restored for {}", session.uid);
                self.state.send_replace(AuthState::SignedIn(session.clone()));
                Ok(Some(session))
            }
            Ok(None) => {
                self.state.send_replace(AuthState::SignedOut);
                Ok(None)
            }
            Err(e) => {
                self.state.send_replace(AuthState::SignedOut);
                Err(e)
            }
        }
    }

    async fn resolve(&self, access_token: &str) -> Result<Option<Session>, Error> {
        let claims = read_claims(access_token)?;
        let expires_at = claims.exp;
        if let Some(exp) = expires_at {
            if chrono::Utc::now().timestamp() >= exp {
                debug!("Access token for {} expired at {}", claims.sub, exp);
                return Ok(None);
            }
        }

        let response = Fetch::get(&self.http_client, self.auth_url("user")?)
            .api_key(&self.key)
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            debug!("Access token for {} rejected with {}", claims.sub, status);
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "user lookup failed with status {}: {}",
                status, error_text
            )));
        }

        let user: User = response.json().await?;
        if user.id != claims.sub {
            return Err(Error::auth("token subject does not match user"));
        }
        user.into_session(access_token, expires_at).map(Some)
    }

    /// Settle the state as signed out without contacting the server
    pub fn mark_signed_out(&self) {
        self.state.send_replace(AuthState::SignedOut);
    }
}

#[async_trait]
impl IdentityProvider for IdentityClient {
    fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    async fn sign_out(&self) -> Result<(), Error> {
        let previous = self.state.send_replace(AuthState::SignedOut);
        let token = match previous {
            AuthState::SignedIn(session) => session.access_token,
            _ => None,
        };

        let Some(token) = token else {
            return Ok(());
        };

        let response = Fetch::post(&self.http_client, self.auth_url("logout")?)
            .api_key(&self.key)
            .bearer_auth(&token)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Remote sign-out returned {}", status);
            return Err(Error::auth(format!("sign-out failed with status {}", status)));
        }

        Ok(())
    }
}
