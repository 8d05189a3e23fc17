//! Profile records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::auth::Session;

/// Partial update merged into a stored profile
pub type ProfilePatch = Map<String, Value>;

/// Stores return every column, so absent values arrive as `null`
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Durable per-user record keyed by the session's subject id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Subject id
    pub uid: String,

    /// Email address at creation time
    #[serde(default, deserialize_with = "null_as_default")]
    pub email: String,

    /// Display name, empty until known
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,

    /// Avatar URL, empty when unknown
    #[serde(default, rename = "photoURL", deserialize_with = "null_as_default")]
    pub photo_url: String,

    /// Creation timestamp
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Highest migration applied to this record
    #[serde(default, deserialize_with = "null_as_default")]
    pub schema_version: u32,

    /// Role fields and any deployment-specific attributes
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UserProfile {
    /// Fresh profile for a session seen for the first time
    pub fn for_session(session: &Session, schema_version: u32) -> Self {
        Self {
            uid: session.uid.clone(),
            email: session.email.clone(),
            display_name: session.display_name.clone().unwrap_or_default(),
            photo_url: session.photo_url.clone().unwrap_or_default(),
            created_at: Some(Utc::now()),
            schema_version,
            fields: Map::new(),
        }
    }

    /// String value of an attribute stored outside the fixed columns
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Set an attribute stored outside the fixed columns
    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    /// Whether a non-blank display name is on record
    pub fn has_display_name(&self) -> bool {
        !self.display_name.trim().is_empty()
    }

    /// Merge a patch into this in-memory copy
    pub fn merge(&mut self, patch: &ProfilePatch) -> Result<(), serde_json::Error> {
        let mut doc = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in patch {
            doc.insert(key.clone(), value.clone());
        }
        *self = serde_json::from_value(Value::Object(doc))?;
        Ok(())
    }
}
