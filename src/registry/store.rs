// SPDX-License-Identifier: MIT

//! Persistence for user-authored custom blocks.
//!
//! Definitions live in one JSON file. Every mutation rewrites the whole
//! file, so concurrent writers are last-writer-wins; the in-process
//! `RwLock` keeps a single registry consistent.

use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store file is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("custom block '{0}' not found")]
    NotFound(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Declares one configurable parameter of a custom block, for display and
/// for the surrounding API layer to validate against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A stored custom block: display metadata plus its base64-encoded WASM
/// module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomBlockDefinition {
    pub id: String,
    /// Display name as the author gave it.
    pub name: String,
    /// Unique registry key derived from the name.
    pub type_key: String,
    pub description: Option<String>,
    #[serde(default)]
    pub param_schema: Vec<ParamSpec>,
    /// Base64-encoded WASM module implementing the execution protocol.
    pub code: String,
    pub created_at: DateTime<Utc>,
}

/// Lowercases a display name and folds separators, producing the canonical
/// key form ("My Cleaner" and "my-cleaner" both become "my_cleaner").
pub fn normalize_type_key(name: &str) -> String {
    let mut key: String = name
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if key.is_empty() {
        key.push_str("custom_block");
    }
    key
}

pub struct CustomBlockStore {
    path: PathBuf,
    blocks: RwLock<Vec<CustomBlockDefinition>>,
}

impl CustomBlockStore {
    /// Opens (or initializes) the store at the given JSON file path.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let blocks = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            blocks: RwLock::new(blocks),
        })
    }

    /// Registers a new custom block and returns its stored definition.
    ///
    /// The type key is derived from the name. A key that collides with a
    /// built-in gets a `custom_` prefix; one that collides with an earlier
    /// custom block gets a `_2`, `_3`, ... suffix. Registration therefore
    /// never shadows or replaces an existing block.
    pub fn register(
        &self,
        name: &str,
        description: Option<String>,
        param_schema: Vec<ParamSpec>,
        code: String,
        builtin_keys: &[String],
    ) -> Result<CustomBlockDefinition, StoreError> {
        let mut blocks = self.blocks.write().map_err(|_| StoreError::Poisoned)?;

        let mut key = normalize_type_key(name);
        if builtin_keys.iter().any(|b| b == &key) {
            key = format!("custom_{key}");
        }
        if blocks.iter().any(|b| b.type_key == key) {
            let base = key.clone();
            let mut n = 2;
            while blocks.iter().any(|b| b.type_key == key) {
                key = format!("{base}_{n}");
                n += 1;
            }
        }

        let definition = CustomBlockDefinition {
            id: Uuid::new_v4().simple().to_string(),
            name: name.to_string(),
            type_key: key,
            description,
            param_schema,
            code,
            created_at: Utc::now(),
        };
        blocks.push(definition.clone());
        self.persist(&blocks)?;
        Ok(definition)
    }

    pub fn get(&self, id: &str) -> Result<Option<CustomBlockDefinition>, StoreError> {
        let blocks = self.blocks.read().map_err(|_| StoreError::Poisoned)?;
        Ok(blocks.iter().find(|b| b.id == id).cloned())
    }

    /// Lookup by dispatch key, the hot path during block resolution.
    pub fn get_by_type(&self, type_key: &str) -> Result<Option<CustomBlockDefinition>, StoreError> {
        let blocks = self.blocks.read().map_err(|_| StoreError::Poisoned)?;
        Ok(blocks.iter().find(|b| b.type_key == type_key).cloned())
    }

    /// All definitions, in registration order.
    pub fn list(&self) -> Result<Vec<CustomBlockDefinition>, StoreError> {
        let blocks = self.blocks.read().map_err(|_| StoreError::Poisoned)?;
        Ok(blocks.clone())
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut blocks = self.blocks.write().map_err(|_| StoreError::Poisoned)?;
        let before = blocks.len();
        blocks.retain(|b| b.id != id);
        if blocks.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.persist(&blocks)
    }

    fn persist(&self, blocks: &[CustomBlockDefinition]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(blocks)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin_keys() -> Vec<String> {
        vec!["dataset".to_string(), "trainer".to_string()]
    }

    fn store() -> (tempfile::TempDir, CustomBlockStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = CustomBlockStore::open(dir.path().join("custom_blocks.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_normalize_type_key() {
        assert_eq!(normalize_type_key("My Cleaner"), "my_cleaner");
        assert_eq!(normalize_type_key("my-cleaner"), "my_cleaner");
        assert_eq!(normalize_type_key("  Weird!! Name  "), "weird_name");
        assert_eq!(normalize_type_key("???"), "custom_block");
    }

    #[test]
    fn test_builtin_collision_gets_prefix() {
        let (_dir, store) = store();
        let def = store
            .register("Dataset", None, Vec::new(), "AAAA".into(), &builtin_keys())
            .unwrap();
        assert_eq!(def.type_key, "custom_dataset");
    }

    #[test]
    fn test_custom_collision_gets_suffix() {
        let (_dir, store) = store();
        let keys: Vec<String> = (0..3)
            .map(|_| {
                store
                    .register("foo", None, Vec::new(), "AAAA".into(), &builtin_keys())
                    .unwrap()
                    .type_key
            })
            .collect();
        assert_eq!(keys, vec!["foo", "foo_2", "foo_3"]);
    }

    #[test]
    fn test_definitions_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom_blocks.json");

        let store = CustomBlockStore::open(&path).unwrap();
        let schema = vec![ParamSpec {
            name: "threshold".to_string(),
            value_type: "number".to_string(),
            default: Some(serde_json::json!(0.5)),
            description: None,
        }];
        store
            .register("scorer", Some("scores rows".into()), schema, "AAAA".into(), &[])
            .unwrap();
        drop(store);

        let reopened = CustomBlockStore::open(&path).unwrap();
        let stored = reopened.get_by_type("scorer").unwrap().unwrap();
        assert_eq!(stored.name, "scorer");
        assert_eq!(stored.description.as_deref(), Some("scores rows"));
        assert_eq!(stored.param_schema[0].name, "threshold");
    }

    #[test]
    fn test_delete_by_id() {
        let (_dir, store) = store();
        let def = store
            .register("scorer", None, Vec::new(), "AAAA".into(), &[])
            .unwrap();
        assert!(store.get(&def.id).unwrap().is_some());

        store.delete(&def.id).unwrap();
        assert!(store.get(&def.id).unwrap().is_none());
        assert!(store.get_by_type("scorer").unwrap().is_none());
        assert!(matches!(
            store.delete(&def.id),
            Err(StoreError::NotFound(_))
        ));
    }
}
