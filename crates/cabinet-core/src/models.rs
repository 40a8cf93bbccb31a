//! Data models for cabinet entries and the on-disk format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{CabinetError, CabinetResult};

/// A structured entry as supplied by callers: any JSON object with a string `name`
pub type Item = Map<String, Value>;

/// Field of an [`Item`] that carries its key
pub const NAME_FIELD: &str = "name";

/// Extract the key of an item, rejecting items without a non-empty string `name`
pub fn item_name(item: &Item) -> CabinetResult<&str> {
    match item.get(NAME_FIELD) {
        Some(Value::String(name)) if !name.trim().is_empty() => Ok(name.as_str()),
        Some(Value::String(_)) => Err(CabinetError::InvalidEntry(
            "entry name must not be empty".to_string(),
        )),
        Some(_) => Err(CabinetError::InvalidEntry(
            "entry name must be a string".to_string(),
        )),
        None => Err(CabinetError::InvalidEntry(
            "entry is missing a name".to_string(),
        )),
    }
}

/// Entry metadata (the item itself is stored separately encrypted)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Unique identifier
    pub id: Uuid,

    /// Key of the entry, copied from the item's `name`
    pub name: String,

    /// When the entry was added
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl EntryRecord {
    pub fn new(name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Encrypted cabinet file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCabinet {
    /// Schema version for migrations
    pub version: u32,

    /// Argon2 salt (32 bytes)
    pub salt: [u8; 32],

    /// AES-GCM nonce (12 bytes)
    pub nonce: [u8; 12],

    /// Encrypted cabinet data
    pub ciphertext: Vec<u8>,

    /// SHA-256 checksum of plaintext for integrity
    pub checksum: [u8; 32],
}

impl EncryptedCabinet {
    pub const CURRENT_VERSION: u32 = 1;
}

/// Decrypted cabinet contents (in memory only)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CabinetData {
    /// Account that owns this cabinet
    pub account_id: String,

    /// Entry metadata in insertion order
    pub entries: Vec<EntryRecord>,

    /// Encrypted items keyed by entry ID
    pub encrypted_values: HashMap<Uuid, EncryptedValue>,
}

impl CabinetData {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    /// Find entry by name
    pub fn find_by_name(&self, name: &str) -> Option<&EntryRecord> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Check if a name is taken
    pub fn name_exists(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }
}

/// Individual encrypted item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedValue {
    /// AES-GCM nonce (12 bytes)
    pub nonce: [u8; 12],

    /// Encrypted item JSON
    pub ciphertext: Vec<u8>,
}

/// Cabinet tuning (non-sensitive, stored in plaintext next to the account config)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CabinetConfig {
    /// Argon2 memory cost in KB
    pub argon2_memory_kb: u32,

    /// Argon2 iterations
    pub argon2_iterations: u32,

    /// Argon2 parallelism
    pub argon2_parallelism: u32,

    /// Create an empty cabinet when none exists at the storage path
    pub create_if_missing: bool,
}

impl Default for CabinetConfig {
    fn default() -> Self {
        Self {
            argon2_memory_kb: 65536, // 64 MB
            argon2_iterations: 3,
            argon2_parallelism: 4,
            create_if_missing: true,
        }
    }
}

impl CabinetConfig {
    /// Minimal Argon2 cost, for tests and throwaway development cabinets
    pub fn for_tests() -> Self {
        Self {
            argon2_memory_kb: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
            create_if_missing: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_item_name() {
        assert_eq!(item_name(&item(json!({"name": "github"}))).unwrap(), "github");
        assert!(item_name(&item(json!({"login": "x"}))).is_err());
        assert!(item_name(&item(json!({"name": 42}))).is_err());
        assert!(item_name(&item(json!({"name": "  "}))).is_err());
    }

    #[test]
    fn test_find_by_name() {
        let mut data = CabinetData::new("me@example.com");
        data.entries.push(EntryRecord::new("github".to_string()));

        assert!(data.name_exists("github"));
        assert!(data.find_by_name("gitlab").is_none());
        assert_eq!(data.account_id, "me@example.com");
    }

    #[test]
    fn test_config_defaults_from_partial_toml() {
        let config: CabinetConfig = toml::from_str("argon2_iterations = 5").unwrap();
        assert_eq!(config.argon2_iterations, 5);
        assert_eq!(config.argon2_memory_kb, 65536);
        assert!(config.create_if_missing);
    }
}
