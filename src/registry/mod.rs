// SPDX-License-Identifier: MIT

//! Block type resolution.
//!
//! The registry maps a block's `type` string to a handler. Built-ins are
//! checked first; custom blocks come from the [`CustomBlockStore`] and run
//! inside the WASM sandbox. Because registration renames colliding keys
//! (see [`store`]), a custom block can never shadow a built-in.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::blocks::{builtin_handlers, BlockHandler};
use crate::sandbox::{SandboxError, SandboxedHandler};

pub use store::{CustomBlockDefinition, CustomBlockStore, ParamSpec, StoreError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Sandbox(#[from] SandboxError),

    #[error("no custom block store configured")]
    NoStore,
}

pub struct BlockRegistry {
    builtins: HashMap<String, Arc<dyn BlockHandler>>,
    custom: Option<CustomBlockStore>,
}

impl BlockRegistry {
    /// Registry with built-in handlers only.
    pub fn new() -> Self {
        let builtins = builtin_handlers()
            .into_iter()
            .map(|h| (h.name().to_string(), h))
            .collect();
        Self {
            builtins,
            custom: None,
        }
    }

    /// Registry that also resolves custom blocks from the given store.
    pub fn with_custom_store(store: CustomBlockStore) -> Self {
        let mut registry = Self::new();
        registry.custom = Some(store);
        registry
    }

    pub fn builtin_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.builtins.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Registers a custom block, validating its module up front so broken
    /// or import-carrying code is rejected at registration time.
    pub fn register_custom(
        &self,
        name: &str,
        description: Option<String>,
        param_schema: Vec<ParamSpec>,
        code: String,
    ) -> Result<CustomBlockDefinition, RegistryError> {
        let store = self.custom_store()?;
        // Decode and inspect before anything is persisted.
        SandboxedHandler::from_base64(store::normalize_type_key(name), &code)?;

        let builtin_keys = self.builtin_keys();
        let definition = store.register(name, description, param_schema, code, &builtin_keys)?;
        info!(
            type_key = %definition.type_key,
            name = %definition.name,
            "custom block registered"
        );
        Ok(definition)
    }

    pub fn list_custom(&self) -> Result<Vec<CustomBlockDefinition>, RegistryError> {
        Ok(self.custom_store()?.list()?)
    }

    pub fn delete_custom(&self, id: &str) -> Result<(), RegistryError> {
        self.custom_store()?.delete(id)?;
        info!(id, "custom block deleted");
        Ok(())
    }

    /// Resolves a block type to a handler: built-ins first, then the custom
    /// store. `Ok(None)` means the type is unknown.
    pub fn resolve(
        &self,
        block_type: &str,
    ) -> Result<Option<Arc<dyn BlockHandler>>, RegistryError> {
        if let Some(handler) = self.builtins.get(block_type) {
            return Ok(Some(Arc::clone(handler)));
        }
        let Some(store) = &self.custom else {
            return Ok(None);
        };
        match store.get_by_type(block_type)? {
            Some(definition) => {
                let handler = SandboxedHandler::from_base64(
                    definition.type_key.clone(),
                    &definition.code,
                )?;
                Ok(Some(Arc::new(handler)))
            }
            None => Ok(None),
        }
    }

    fn custom_store(&self) -> Result<&CustomBlockStore, RegistryError> {
        self.custom.as_ref().ok_or(RegistryError::NoStore)
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    // Minimal protocol module whose output is "{}".
    fn minimal_module() -> String {
        let wasm = wat::parse_str(
            r#"(module
                (memory (export "memory") 1)
                (func (export "allocate") (param i32) (result i32) (i32.const 1024))
                (func (export "deallocate") (param i32 i32))
                (data (i32.const 8) "{}")
                (func (export "process") (param i32 i32 i32) (result i32)
                    (i32.store (local.get 2) (i32.const 2))
                    (i32.const 8)))"#,
        )
        .unwrap();
        BASE64.encode(wasm)
    }

    fn registry_with_store() -> (tempfile::TempDir, BlockRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let store = CustomBlockStore::open(dir.path().join("custom_blocks.json")).unwrap();
        (dir, BlockRegistry::with_custom_store(store))
    }

    #[test]
    fn test_builtins_resolve() {
        let registry = BlockRegistry::new();
        for key in ["dataset", "dataset_merge", "data_cleaner", "split",
                    "feature_pipeline", "model", "voting_ensemble", "trainer", "metrics"] {
            assert!(registry.resolve(key).unwrap().is_some(), "{key} missing");
        }
    }

    #[test]
    fn test_unknown_type_resolves_to_none() {
        let registry = BlockRegistry::new();
        assert!(registry.resolve("nope").unwrap().is_none());
    }

    #[test]
    fn test_custom_block_round_trip() {
        let (_dir, registry) = registry_with_store();
        let def = registry
            .register_custom("scorer", None, Vec::new(), minimal_module())
            .unwrap();
        assert_eq!(def.type_key, "scorer");

        assert!(registry.resolve("scorer").unwrap().is_some());
        assert_eq!(registry.list_custom().unwrap().len(), 1);

        registry.delete_custom(&def.id).unwrap();
        assert!(registry.resolve("scorer").unwrap().is_none());
    }

    #[test]
    fn test_builtin_name_collision_is_renamed() {
        let (_dir, registry) = registry_with_store();
        let def = registry
            .register_custom("dataset", None, Vec::new(), minimal_module())
            .unwrap();
        assert_eq!(def.type_key, "custom_dataset");
        // The built-in still resolves to the built-in handler.
        assert!(registry.resolve("dataset").unwrap().is_some());
        assert!(registry.resolve("custom_dataset").unwrap().is_some());
    }

    #[test]
    fn test_invalid_code_rejected_before_storing() {
        let (_dir, registry) = registry_with_store();
        let err = registry
            .register_custom("bad", None, Vec::new(), BASE64.encode(b"not wasm"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Sandbox(_)));
        assert!(registry.list_custom().unwrap().is_empty());
    }
}
