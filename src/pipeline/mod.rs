// SPDX-License-Identifier: MIT

//! Pipeline description model.
//!
//! A pipeline is an unordered list of [`Block`] descriptors supplied by the
//! caller (typically deserialized from the surrounding API layer's JSON).
//! Blocks are immutable for the duration of a run; the engine validates the
//! list and derives a deterministic execution order from it.

pub mod plan;
pub mod validation;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use plan::ExecutionPlan;
pub use validation::validate_blocks;

/// One node in the pipeline graph.
///
/// `block_type` is an open string key resolved against the block registry
/// (custom types exist, so this is not an enum). `inputs` lists the ids of
/// upstream blocks this block depends on; the edges they induce must form a
/// DAG over the run's block list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    #[serde(default)]
    pub inputs: Vec<String>,
}

impl Block {
    pub fn new(id: impl Into<String>, block_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            block_type: block_type.into(),
            params: HashMap::new(),
            inputs: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_input(mut self, upstream_id: &str) -> Self {
        self.inputs.push(upstream_id.to_string());
        self
    }

    /// Read a parameter, deserializing it into the requested type.
    pub fn param<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.params
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Read a parameter, falling back to a default when absent or ill-typed.
    pub fn param_or<T: serde::de::DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.param(key).unwrap_or(default)
    }
}

/// Parse a pipeline description from a JSON array of block descriptors.
pub fn parse_pipeline(json: &str) -> Result<Vec<Block>, serde_json::Error> {
    serde_json::from_str(json)
}
