//! REST-backed store speaking the PostgREST dialect

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::RwLock;
use std::time::Duration;
use url::Url;

use crate::error::StoreError;
use crate::fetch::{Fetch, FetchBuilder};
use crate::store::{EmailAllowlist, ProfilePatch, ProfileStore, UserProfile};

/// Profile store and allowlist backed by `/rest/v1/<collection>`
pub struct RestStore {
    url: Url,
    key: String,
    http_client: Client,
    profiles: String,
    allowlist: String,
    timeout: Option<Duration>,
    access_token: RwLock<Option<String>>,
}

impl RestStore {
    /// Create a new REST store
    pub fn new(url: Url, key: &str, http_client: Client) -> Self {
        Self {
            url,
            key: key.to_string(),
            http_client,
            profiles: "users".to_string(),
            allowlist: "allowlist".to_string(),
            timeout: None,
            access_token: RwLock::new(None),
        }
    }

    /// Set the profile collection
    pub fn with_profile_collection(mut self, value: &str) -> Self {
        self.profiles = value.to_string();
        self
    }

    /// Set the allowlist collection
    pub fn with_allowlist_collection(mut self, value: &str) -> Self {
        self.allowlist = value.to_string();
        self
    }

    /// Bound every request
    pub fn with_timeout(mut self, value: Option<Duration>) -> Self {
        self.timeout = value;
        self
    }

    fn table_url(&self, table: &str) -> Result<Url, StoreError> {
        self.url
            .join(&format!("rest/v1/{}", table))
            .map_err(|e| StoreError::Unavailable(format!("invalid store URL: {}", e)))
    }

    fn bearer(&self) -> String {
        let token = match self.access_token.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        token.unwrap_or_else(|| self.key.clone())
    }

    fn prepare<'a>(&self, builder: FetchBuilder<'a>) -> FetchBuilder<'a> {
        builder
            .api_key(&self.key)
            .bearer_auth(&self.bearer())
            .timeout(self.timeout)
    }
}

#[async_trait]
impl ProfileStore for RestStore {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        let url = self.table_url(&self.profiles)?;
        let rows: Vec<UserProfile> = self
            .prepare(Fetch::get(&self.http_client, url))
            .query("uid", &format!("eq.{}", uid))
            .query("select", "*")
            .execute()
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let url = self.table_url(&self.profiles)?;
        self.prepare(Fetch::post(&self.http_client, url))
            .header("Prefer", "return=minimal")
            .json(profile)?
            .execute_empty()
            .await
    }

    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        let url = self.table_url(&self.profiles)?;
        self.prepare(Fetch::patch(&self.http_client, url))
            .query("uid", &format!("eq.{}", uid))
            .header("Prefer", "return=minimal")
            .json(patch)?
            .execute_empty()
            .await
    }

    fn set_auth(&self, token: Option<&str>) {
        let mut guard = match self.access_token.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = token.map(str::to_string);
    }
}

#[async_trait]
impl EmailAllowlist for RestStore {
    async fn is_listed(&self, email: &str) -> Result<bool, StoreError> {
        let url = self.table_url(&self.allowlist)?;
        let rows: Vec<Value> = self
            .prepare(Fetch::get(&self.http_client, url))
            .query("email", &format!("eq.{}", email))
            .query("select", "email")
            .execute()
            .await?;
        Ok(!rows.is_empty())
    }
}
