//! Identity & profile store collaborators

mod memory;
mod rest;
mod types;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::*;
pub use rest::*;
pub use types::*;

/// Durable storage for user profiles.
///
/// Access rules are enforced by the backing store; this trait only describes
/// the calls the gate makes.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile for a subject id
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Create a profile; fails with [`StoreError::AlreadyExists`] when one is
    /// already stored under the same subject id
    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StoreError>;

    /// Merge a partial update into the stored profile
    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), StoreError>;

    /// Credentials to use for subsequent calls
    fn set_auth(&self, _token: Option<&str>) {}
}

/// External list of individually authorized email addresses
#[async_trait]
pub trait EmailAllowlist: Send + Sync {
    /// Whether the address is listed
    async fn is_listed(&self, email: &str) -> Result<bool, StoreError>;
}
