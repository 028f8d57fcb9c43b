// SPDX-License-Identifier: MIT

//! Pipeline execution.
//!
//! The engine validates a block list, derives the execution order, and runs
//! each block in sequence against a shared [`Context`]. Execution is
//! all-or-nothing: the first failing block aborts the run and the error names
//! that block. Handler errors never cross the engine boundary raw; they are
//! wrapped into [`PipelineError`] variants with block attribution.

#[cfg(test)]
mod integration_tests;

use std::time::Instant;

use tracing::{error, info};

use crate::blocks::BlockHandler;
use crate::context::Context;
use crate::errors::{BlockError, PipelineError};
use crate::pipeline::{Block, ExecutionPlan};
use crate::registry::{BlockRegistry, RegistryError};

pub struct PipelineEngine {
    registry: BlockRegistry,
}

impl PipelineEngine {
    /// Engine over the built-in block types only.
    pub fn new() -> Self {
        Self {
            registry: BlockRegistry::new(),
        }
    }

    /// Engine over a caller-configured registry (e.g. one with a custom
    /// block store attached).
    pub fn with_registry(registry: BlockRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    /// Runs a pipeline from an empty context and returns the final context.
    pub async fn run(&self, blocks: Vec<Block>) -> Result<Context, PipelineError> {
        let mut ctx = Context::new();
        self.run_with_context(blocks, &mut ctx).await?;
        Ok(ctx)
    }

    /// Runs a pipeline against an existing context, mutating it in place.
    ///
    /// On error the context keeps the writes of every block that completed
    /// before the failure; callers that need a clean slate should pass a
    /// fresh context per run.
    pub async fn run_with_context(
        &self,
        blocks: Vec<Block>,
        ctx: &mut Context,
    ) -> Result<(), PipelineError> {
        let plan = ExecutionPlan::build(blocks)?;
        info!(blocks = plan.len(), order = ?plan.order(), "pipeline run started");

        for id in plan.order() {
            let block = plan.block(id).expect("plan holds every ordered id");
            let handler = self.resolve_handler(block)?;
            check_required_keys(handler.as_ref(), block, ctx)?;

            info!(block_id = %block.id, block_type = %block.block_type, "block started");
            let started = Instant::now();
            if let Err(e) = handler.execute(block, ctx).await {
                let wrapped = wrap_block_error(block, e);
                error!(block_id = %block.id, error = %wrapped, "block failed");
                return Err(wrapped);
            }
            info!(
                block_id = %block.id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "block finished"
            );
        }

        info!("pipeline run finished");
        Ok(())
    }

    fn resolve_handler(
        &self,
        block: &Block,
    ) -> Result<std::sync::Arc<dyn BlockHandler>, PipelineError> {
        match self.registry.resolve(&block.block_type) {
            Ok(Some(handler)) => Ok(handler),
            Ok(None) => Err(PipelineError::UnknownBlockType {
                block_id: block.id.clone(),
                block_type: block.block_type.clone(),
            }),
            Err(RegistryError::Sandbox(e)) if e.is_violation() => {
                Err(PipelineError::SandboxViolation {
                    block_id: block.id.clone(),
                    message: e.to_string(),
                })
            }
            Err(e) => Err(PipelineError::BlockExecution {
                block_id: block.id.clone(),
                block_type: block.block_type.clone(),
                message: e.to_string(),
            }),
        }
    }
}

impl Default for PipelineEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Fails fast with every missing context key, sorted for stable messages.
fn check_required_keys(
    handler: &dyn BlockHandler,
    block: &Block,
    ctx: &Context,
) -> Result<(), PipelineError> {
    let mut missing: Vec<String> = handler
        .required_keys()
        .iter()
        .filter(|key| !ctx.contains(key))
        .map(|key| key.to_string())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    missing.sort();
    Err(PipelineError::MissingInput {
        block_id: block.id.clone(),
        block_type: block.block_type.clone(),
        missing_keys: missing,
    })
}

fn wrap_block_error(block: &Block, error: BlockError) -> PipelineError {
    match error {
        BlockError::Sandbox(e) if e.is_violation() => PipelineError::SandboxViolation {
            block_id: block.id.clone(),
            message: e.to_string(),
        },
        other => PipelineError::BlockExecution {
            block_id: block.id.clone(),
            block_type: block.block_type.clone(),
            message: other.to_string(),
        },
    }
}

