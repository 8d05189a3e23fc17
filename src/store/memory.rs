//! In-process store

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::store::{EmailAllowlist, ProfilePatch, ProfileStore, UserProfile};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Store that keeps profiles and the allowlist in memory.
///
/// Counts calls and can be told to fail, which makes every gate outcome
/// reachable without a backend.
#[derive(Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
    allowlist: Mutex<HashSet<String>>,
    updates: Mutex<Vec<(String, ProfilePatch)>>,
    reads: AtomicUsize,
    creates: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_allowlist: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a profile
    pub fn insert(&self, profile: UserProfile) {
        lock(&self.profiles).insert(profile.uid.clone(), profile);
    }

    /// Add an address to the allowlist
    pub fn allow_email(&self, email: &str) {
        lock(&self.allowlist).insert(email.to_ascii_lowercase());
    }

    /// Stored copy of a profile
    pub fn profile(&self, uid: &str) -> Option<UserProfile> {
        lock(&self.profiles).get(uid).cloned()
    }

    /// Number of `get_profile` calls
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `create_profile` calls
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Every patch applied, in order
    pub fn updates(&self) -> Vec<(String, ProfilePatch)> {
        lock(&self.updates).clone()
    }

    /// Make profile reads fail
    pub fn fail_reads(&self, value: bool) {
        self.fail_reads.store(value, Ordering::SeqCst);
    }

    /// Make profile writes fail
    pub fn fail_writes(&self, value: bool) {
        self.fail_writes.store(value, Ordering::SeqCst);
    }

    /// Make allowlist lookups fail
    pub fn fail_allowlist(&self, value: bool) {
        self.fail_allowlist.store(value, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::PermissionDenied("reads disabled".to_string()));
        }
        Ok(self.profile(uid))
    }

    async fn create_profile(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.check_writes()?;
        let mut profiles = lock(&self.profiles);
        if profiles.contains_key(&profile.uid) {
            return Err(StoreError::AlreadyExists(profile.uid.clone()));
        }
        profiles.insert(profile.uid.clone(), profile.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_profile(&self, uid: &str, patch: &ProfilePatch) -> Result<(), StoreError> {
        self.check_writes()?;
        let mut profiles = lock(&self.profiles);
        let mut profile = match profiles.get(uid) {
            Some(existing) => existing.clone(),
            None => {
                let mut doc = Map::new();
                doc.insert("uid".to_string(), Value::String(uid.to_string()));
                serde_json::from_value(Value::Object(doc))?
            }
        };
        profile.merge(patch)?;
        profiles.insert(uid.to_string(), profile);
        lock(&self.updates).push((uid.to_string(), patch.clone()));
        Ok(())
    }
}

#[async_trait]
impl EmailAllowlist for MemoryStore {
    async fn is_listed(&self, email: &str) -> Result<bool, StoreError> {
        if self.fail_allowlist.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("allowlist disabled".to_string()));
        }
        Ok(lock(&self.allowlist).contains(&email.to_ascii_lowercase()))
    }
}
