// SPDX-License-Identifier: MIT

//! The `voting_ensemble` block: builds an unfitted ensemble model.
//!
//! Member models come from the `models` param (names or
//! `{algorithm, params}` objects); without it a default roster for the task
//! is used. The trainer fits the ensemble like any other model.

use async_trait::async_trait;
use tracing::info;

use crate::blocks::model::{params_as_map, resolve_task};
use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue};
use crate::errors::BlockError;
use crate::ml::Model;
use crate::pipeline::Block;

pub struct VotingEnsembleBlock;

#[async_trait]
impl BlockHandler for VotingEnsembleBlock {
    fn name(&self) -> &str {
        "voting_ensemble"
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let task = resolve_task(block, ctx)?;
        let model = Model::build(task, "voting_ensemble", &params_as_map(block))?;

        if let Model::VotingEnsemble(ensemble) = &model {
            info!(
                block_id = %block.id,
                members = ensemble.members().len(),
                %task,
                "voting ensemble constructed"
            );
        }
        ctx.insert("model", ContextValue::Model(model));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_roster() {
        let mut ctx = Context::new();
        ctx.insert("task", ContextValue::Text("classification".into()));
        let block = Block::new("ens", "voting_ensemble");
        VotingEnsembleBlock.execute(&block, &mut ctx).await.unwrap();

        match ctx.model("model").unwrap() {
            Model::VotingEnsemble(ensemble) => assert_eq!(ensemble.members().len(), 3),
            other => panic!("expected ensemble, got {}", other.algorithm()),
        }
    }

    #[tokio::test]
    async fn test_explicit_members() {
        let mut ctx = Context::new();
        let block = Block::new("ens", "voting_ensemble")
            .with_param("task", "classification")
            .with_param("voting", "soft")
            .with_param(
                "models",
                serde_json::json!(["logistic_regression", "gaussian_nb"]),
            );
        VotingEnsembleBlock.execute(&block, &mut ctx).await.unwrap();

        match ctx.model("model").unwrap() {
            Model::VotingEnsemble(ensemble) => assert_eq!(ensemble.members().len(), 2),
            other => panic!("expected ensemble, got {}", other.algorithm()),
        }
    }

    #[tokio::test]
    async fn test_bad_member_fails() {
        let mut ctx = Context::new();
        let block = Block::new("ens", "voting_ensemble")
            .with_param("task", "classification")
            .with_param("models", serde_json::json!(["nope"]));
        assert!(VotingEnsembleBlock.execute(&block, &mut ctx).await.is_err());
    }
}
