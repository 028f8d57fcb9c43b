// SPDX-License-Identifier: MIT

//! Run-level error taxonomy.
//!
//! Every variant carries enough detail (block id, type, cause) for the caller
//! to render a user-facing diagnostic. Graph-shape errors (`DuplicateBlockId`,
//! `UnresolvedInput`, `CyclicDependency`) are raised before any block runs;
//! the remaining variants identify the single block that failed dispatch or
//! execution. None of these are retried by the engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Two blocks in the same run share an id.
    #[error("duplicate block id: '{block_id}'")]
    DuplicateBlockId { block_id: String },

    /// A block's `inputs` entry names a block that is not part of the run.
    #[error("block '{block_id}' depends on '{missing_input}' which does not exist")]
    UnresolvedInput {
        block_id: String,
        missing_input: String,
    },

    /// The dependency graph contains a cycle; the path closes the loop.
    #[error("pipeline contains a cycle: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// `block.block_type` resolved to neither a built-in nor a custom handler.
    #[error("block '{block_id}' has unknown type '{block_type}'")]
    UnknownBlockType {
        block_id: String,
        block_type: String,
    },

    /// A built-in block's declared context preconditions are unmet. This
    /// signals a misconnected graph, not a bug inside the block.
    #[error("block '{block_id}' ({block_type}) is missing required context keys: {}", missing_keys.join(", "))]
    MissingInput {
        block_id: String,
        block_type: String,
        missing_keys: Vec<String>,
    },

    /// A handler failed while executing. Wraps the original message so raw
    /// internal errors never cross the engine boundary.
    #[error("block '{block_id}' ({block_type}) failed: {message}")]
    BlockExecution {
        block_id: String,
        block_type: String,
        message: String,
    },

    /// Custom block code attempted a capability outside the sandbox.
    #[error("block '{block_id}' violated the sandbox: {message}")]
    SandboxViolation { block_id: String, message: String },
}

impl PipelineError {
    /// The id of the block this error is attributed to, when there is one.
    pub fn block_id(&self) -> Option<&str> {
        match self {
            PipelineError::DuplicateBlockId { block_id }
            | PipelineError::UnresolvedInput { block_id, .. }
            | PipelineError::UnknownBlockType { block_id, .. }
            | PipelineError::MissingInput { block_id, .. }
            | PipelineError::BlockExecution { block_id, .. }
            | PipelineError::SandboxViolation { block_id, .. } => Some(block_id),
            PipelineError::CyclicDependency { .. } => None,
        }
    }
}
