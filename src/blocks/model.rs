// SPDX-License-Identifier: MIT

//! The `model` block: constructs an unfitted model and places it in the
//! context for the trainer.
//!
//! Unknown algorithms and algorithm/task mismatches fail the run here, at
//! declaration time, instead of surfacing later as a training error.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue};
use crate::errors::BlockError;
use crate::ml::{Model, Task};
use crate::pipeline::Block;

/// Block params as a JSON object, for handing to [`Model::build`].
pub(crate) fn params_as_map(block: &Block) -> Map<String, Value> {
    block
        .params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// The task this run is solving: the block's own `task` param when present,
/// otherwise whatever an upstream block recorded in the context.
pub(crate) fn resolve_task(block: &Block, ctx: &Context) -> Result<Task, BlockError> {
    if let Some(task) = block.param::<String>("task") {
        return task.parse().map_err(BlockError::Train);
    }
    if let Ok(task) = ctx.text("task") {
        return task.parse().map_err(BlockError::Train);
    }
    Err(BlockError::InvalidParams(
        "task is unknown: pass a 'task' parameter or load a dataset with a target first"
            .to_string(),
    ))
}

pub struct ModelBlock;

#[async_trait]
impl BlockHandler for ModelBlock {
    fn name(&self) -> &str {
        "model"
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let algorithm: String = block.param("algorithm").ok_or_else(|| {
            BlockError::InvalidParams("model block needs an 'algorithm' parameter".to_string())
        })?;
        let task = resolve_task(block, ctx)?;

        let model = Model::build(task, &algorithm, &params_as_map(block))?;
        info!(block_id = %block.id, algorithm = model.algorithm(), %task, "model constructed");
        ctx.insert("task", ContextValue::Text(task.to_string()));
        ctx.insert(
            "algorithm",
            ContextValue::Text(model.algorithm().to_string()),
        );
        ctx.insert("model", ContextValue::Model(model));
        Ok(())
    }
}
