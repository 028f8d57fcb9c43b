// SPDX-License-Identifier: MIT

//! Bridges a custom block's WASM module into the block handler interface.
//!
//! The module sees `{"block": {"id", "params"}, "context": {...}}` as input,
//! where the context is the JSON projection from
//! [`Context::sandbox_snapshot`]. Whatever JSON object it returns is merged
//! back into the context, overwriting existing keys.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;
use tracing::debug;

use crate::blocks::BlockHandler;
use crate::context::Context;
use crate::errors::BlockError;
use crate::pipeline::Block;
use crate::sandbox::{check_imports, SandboxError, SandboxExecutor};

pub struct SandboxedHandler {
    type_key: String,
    wasm: Vec<u8>,
    executor: SandboxExecutor,
}

impl SandboxedHandler {
    /// Decodes a stored custom block. Modules with imports are rejected
    /// here, at registration/resolution time, not first at execution.
    pub fn from_base64(type_key: impl Into<String>, code: &str) -> Result<Self, SandboxError> {
        let wasm = BASE64
            .decode(code.trim())
            .map_err(|e| SandboxError::Decode(e.to_string()))?;
        check_imports(&wasm)?;
        Ok(Self {
            type_key: type_key.into(),
            wasm,
            executor: SandboxExecutor::new()?,
        })
    }
}

// The executor holds a wasmtime engine with nothing useful to print.
impl std::fmt::Debug for SandboxedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxedHandler")
            .field("type_key", &self.type_key)
            .field("wasm_len", &self.wasm.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BlockHandler for SandboxedHandler {
    fn name(&self) -> &str {
        &self.type_key
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let input = json!({
            "block": {
                "id": block.id,
                "params": block.params,
            },
            "context": ctx.sandbox_snapshot(),
        });

        let output = self.executor.run(&self.wasm, &input)?;
        debug!(
            block_id = %block.id,
            block_type = %self.type_key,
            keys = output.len(),
            "custom block output merged"
        );
        ctx.merge_json(output);
        Ok(())
    }
}
