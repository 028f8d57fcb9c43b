// SPDX-License-Identifier: MIT

//! Runs a pipeline described by a JSON file.
//!
//! Usage: `trellis <pipeline.json> [custom_blocks.json]`
//!
//! The optional second argument points at a custom block store; when given,
//! user-registered block types resolve alongside the built-ins.

use anyhow::{bail, Context as _, Result};
use tracing_subscriber::EnvFilter;

use trellis::engine::PipelineEngine;
use trellis::pipeline::parse_pipeline;
use trellis::registry::{BlockRegistry, CustomBlockStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(pipeline_path) = args.get(1) else {
        bail!("usage: trellis <pipeline.json> [custom_blocks.json]");
    };

    let json = std::fs::read_to_string(pipeline_path)
        .with_context(|| format!("reading pipeline file '{pipeline_path}'"))?;
    let blocks = parse_pipeline(&json).context("parsing pipeline description")?;

    let registry = match args.get(2) {
        Some(store_path) => {
            let store = CustomBlockStore::open(store_path)
                .with_context(|| format!("opening custom block store '{store_path}'"))?;
            BlockRegistry::with_custom_store(store)
        }
        None => BlockRegistry::new(),
    };

    let engine = PipelineEngine::with_registry(registry);
    let ctx = engine.run(blocks).await?;

    if let Ok(metrics) = ctx.json("metrics") {
        println!("{}", serde_json::to_string_pretty(metrics)?);
    }
    if let Ok(path) = ctx.text("artifact_path") {
        println!("artifact saved to {path}");
    }
    Ok(())
}
