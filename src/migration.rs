//! Role schema and versioned profile migrations

use log::{debug, info};
use serde_json::Value;

use crate::store::{ProfilePatch, UserProfile};

/// Schema version written on every profile this crate creates or migrates
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_VERSION_FIELD: &str = "schemaVersion";

/// Where the role lives on a profile and which values it may take
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleSchema {
    /// A single role field shared by every platform
    Shared {
        /// Field name, usually `role`
        field: String,
        /// Role written on new profiles
        default: String,
    },

    /// A per-platform field that replaced an older shared one
    Namespaced {
        /// Field name, such as `role_central`
        field: String,
        /// Field the role was read from before
        legacy_field: String,
        /// Values accepted when carrying a legacy role over
        allowed: Vec<String>,
        /// Role used when the legacy value is absent or not allowed
        default: String,
    },
}

impl Default for RoleSchema {
    fn default() -> Self {
        RoleSchema::shared("role", "viewer")
    }
}

impl RoleSchema {
    /// Shared role field
    pub fn shared(field: &str, default: &str) -> Self {
        RoleSchema::Shared {
            field: field.to_string(),
            default: default.to_string(),
        }
    }

    /// Per-platform role field migrated from `legacy_field`
    pub fn namespaced(field: &str, legacy_field: &str, allowed: &[&str], default: &str) -> Self {
        RoleSchema::Namespaced {
            field: field.to_string(),
            legacy_field: legacy_field.to_string(),
            allowed: allowed.iter().map(|r| r.to_string()).collect(),
            default: default.to_string(),
        }
    }

    /// Name of the authoritative role field
    pub fn field(&self) -> &str {
        match self {
            RoleSchema::Shared { field, .. } | RoleSchema::Namespaced { field, .. } => field,
        }
    }

    /// Role recorded on the profile
    pub fn resolve<'a>(&self, profile: &'a UserProfile) -> Option<&'a str> {
        profile.field_str(self.field()).filter(|role| !role.is_empty())
    }

    /// Fields written on a newly created profile. Namespaced roles start absent
    /// and are assigned by an administrator.
    pub fn initial_fields(&self) -> ProfilePatch {
        let mut patch = ProfilePatch::new();
        if let RoleSchema::Shared { field, default } = self {
            patch.insert(field.clone(), Value::String(default.clone()));
        }
        patch
    }

    /// Mirror the resolved role under the legacy name, in memory only, for page
    /// code that still reads the old field
    pub fn normalize(&self, profile: &mut UserProfile) {
        if let RoleSchema::Namespaced {
            field, legacy_field, ..
        } = self
        {
            if let Some(role) = profile.field_str(field).map(str::to_string) {
                profile.set_field(legacy_field, Value::String(role));
            }
        }
    }
}

/// One step of the profile upgrade path
pub trait Migration: Send + Sync {
    /// Version a profile reaches once this step is applied
    fn version(&self) -> u32;

    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Fields to write for this profile; may be empty
    fn plan(&self, profile: &UserProfile) -> ProfilePatch;
}

/// Carries a legacy shared role into the namespaced role field
pub struct NamespacedRoleMigration {
    schema: RoleSchema,
}

impl NamespacedRoleMigration {
    /// Migration for the given schema
    pub fn new(schema: RoleSchema) -> Self {
        Self { schema }
    }
}

impl Migration for NamespacedRoleMigration {
    fn version(&self) -> u32 {
        1
    }

    fn name(&self) -> &'static str {
        "namespaced-role"
    }

    fn plan(&self, profile: &UserProfile) -> ProfilePatch {
        let mut patch = ProfilePatch::new();
        let RoleSchema::Namespaced {
            field,
            legacy_field,
            allowed,
            default,
        } = &self.schema
        else {
            return patch;
        };

        // An existing namespaced role is authoritative.
        if profile.fields.contains_key(field) {
            return patch;
        }

        let role = profile
            .field_str(legacy_field)
            .filter(|legacy| allowed.iter().any(|a| a == legacy))
            .unwrap_or(default.as_str());
        patch.insert(field.clone(), Value::String(role.to_string()));
        patch
    }
}

/// Ordered set of migrations applied to profiles below the current version
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    /// Migrations required by a role schema
    pub fn for_schema(schema: &RoleSchema) -> Self {
        let mut migrations: Vec<Box<dyn Migration>> = Vec::new();
        if let RoleSchema::Namespaced { .. } = schema {
            migrations.push(Box::new(NamespacedRoleMigration::new(schema.clone())));
        }
        Self { migrations }
    }

    /// Version a fully migrated profile carries
    pub fn target_version(&self) -> u32 {
        self.migrations
            .iter()
            .map(|m| m.version())
            .max()
            .unwrap_or(0)
            .max(CURRENT_SCHEMA_VERSION)
    }

    /// Combined patch bringing the profile to the target version, or `None`
    /// when it is already there or no step has anything to write
    pub fn plan(&self, profile: &UserProfile) -> Option<ProfilePatch> {
        let target = self.target_version();
        if profile.schema_version >= target {
            return None;
        }

        let mut patch = ProfilePatch::new();
        for migration in self
            .migrations
            .iter()
            .filter(|m| m.version() > profile.schema_version)
        {
            let step = migration.plan(profile);
            debug!(
                "Migration {} for {} writes {} field(s)",
                migration.name(),
                profile.uid,
                step.len()
            );
            patch.extend(step);
        }

        if patch.is_empty() {
            return None;
        }

        info!(
            "Migrating profile {} from version {} to {}",
            profile.uid, profile.schema_version, target
        );
        patch.insert(SCHEMA_VERSION_FIELD.to_string(), Value::from(target));
        Some(patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Session;
    use serde_json::json;

    fn central() -> RoleSchema {
        RoleSchema::namespaced(
            "role_central",
            "role",
            &["central_admin", "central_user"],
            "central_user",
        )
    }

    fn legacy_profile(role: Option<&str>) -> UserProfile {
        let mut profile = UserProfile::for_session(&Session::new("u1", "a@b.c"), 0);
        if let Some(role) = role {
            profile.set_field("role", json!(role));
        }
        profile
    }

    #[test]
    fn test_valid_legacy_role_is_carried_over() {
        let patch = Migrator::for_schema(&central())
            .plan(&legacy_profile(Some("central_admin")))
            .unwrap();
        assert_eq!(patch["role_central"], json!("central_admin"));
        assert_eq!(patch["schemaVersion"], json!(1));
    }

    #[test]
    fn test_invalid_or_missing_legacy_role_falls_back() {
        let migrator = Migrator::for_schema(&central());

        let patch = migrator.plan(&legacy_profile(Some("viewer"))).unwrap();
        assert_eq!(patch["role_central"], json!("central_user"));

        let patch = migrator.plan(&legacy_profile(None)).unwrap();
        assert_eq!(patch["role_central"], json!("central_user"));
    }

    #[test]
    fn test_existing_namespaced_role_is_never_rewritten() {
        let mut profile = legacy_profile(Some("central_admin"));
        profile.set_field("role_central", json!("central_user"));

        assert!(Migrator::for_schema(&central()).plan(&profile).is_none());
    }

    #[test]
    fn test_current_profiles_are_skipped() {
        let mut profile = legacy_profile(Some("central_admin"));
        profile.schema_version = CURRENT_SCHEMA_VERSION;
        assert!(Migrator::for_schema(&central()).plan(&profile).is_none());
    }

    #[test]
    fn test_shared_schema_writes_nothing() {
        let migrator = Migrator::for_schema(&RoleSchema::default());
        assert!(migrator.plan(&legacy_profile(Some("viewer"))).is_none());
        assert!(migrator.plan(&legacy_profile(None)).is_none());
        assert_eq!(migrator.target_version(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_normalize_mirrors_role_under_legacy_name() {
        let mut profile = legacy_profile(Some("viewer"));
        profile.set_field("role_central", json!("central_admin"));
        central().normalize(&mut profile);
        assert_eq!(profile.field_str("role"), Some("central_admin"));
    }
}
