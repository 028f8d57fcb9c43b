// SPDX-License-Identifier: MIT

//! Built-in block handlers.
//!
//! A handler owns the semantics of one block type: it reads the keys it
//! needs from the shared [`Context`], does its work, and writes its outputs
//! back. `required_keys` lets the engine fail a run up front with the exact
//! missing keys instead of a confusing error from deep inside a handler.

pub mod cleaner;
pub mod dataset;
pub mod features;
pub mod merge;
pub mod metrics;
pub mod model;
pub mod split;
pub mod trainer;
pub mod voting;

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::Context;
use crate::errors::BlockError;
use crate::pipeline::Block;

#[async_trait]
pub trait BlockHandler: Send + Sync {
    /// The block type this handler implements. Borrowed, because custom
    /// block handlers carry runtime-chosen type keys.
    fn name(&self) -> &str;

    /// Context keys that must exist before this block runs.
    fn required_keys(&self) -> &'static [&'static str] {
        &[]
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError>;
}

/// Every built-in handler, in registry order.
pub fn builtin_handlers() -> Vec<Arc<dyn BlockHandler>> {
    vec![
        Arc::new(dataset::DatasetBlock),
        Arc::new(merge::DatasetMergeBlock),
        Arc::new(cleaner::DataCleanerBlock),
        Arc::new(split::SplitBlock),
        Arc::new(features::FeaturePipelineBlock),
        Arc::new(model::ModelBlock),
        Arc::new(voting::VotingEnsembleBlock),
        Arc::new(trainer::TrainerBlock),
        Arc::new(metrics::MetricsBlock),
    ]
}
