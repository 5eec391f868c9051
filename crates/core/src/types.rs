use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Identity of a lock holder (the authenticated user's id).
pub type UserId = DbId;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Maximum length of an entity type slug.
pub const MAX_ENTITY_TYPE_LEN: usize = 64;

/// Reference to a lockable record: `(entity_type, entity_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId {
    pub entity_type: String,
    pub entity_id: DbId,
}

impl RecordId {
    /// Build a record reference, rejecting malformed types and non-positive ids.
    pub fn new(entity_type: impl Into<String>, entity_id: DbId) -> Result<Self, CoreError> {
        let record = Self {
            entity_type: entity_type.into(),
            entity_id,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let entity_type = self.entity_type.as_str();
        if entity_type.is_empty() || entity_type.len() > MAX_ENTITY_TYPE_LEN {
            return Err(CoreError::Validation(format!(
                "entity_type must be 1..={MAX_ENTITY_TYPE_LEN} characters, got {}",
                entity_type.len()
            )));
        }
        if !entity_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(CoreError::Validation(format!(
                "Invalid entity_type '{entity_type}'. Use lowercase letters, digits and '_'"
            )));
        }
        if self.entity_id <= 0 {
            return Err(CoreError::Validation(format!(
                "entity_id must be positive, got {}",
                self.entity_id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// Opaque marker of a record's last persisted modification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(pub String);

impl VersionToken {
    /// Mint a fresh, time-ordered token.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VersionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
