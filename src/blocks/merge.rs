// SPDX-License-Identifier: MIT

//! The `dataset_merge` block: vertically concatenates previously loaded
//! datasets over their common columns and republishes the result as `df`.

use async_trait::async_trait;
use tracing::info;

use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue};
use crate::data::DataFrame;
use crate::errors::BlockError;
use crate::pipeline::Block;

pub struct DatasetMergeBlock;

#[async_trait]
impl BlockHandler for DatasetMergeBlock {
    fn name(&self) -> &str {
        "dataset_merge"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["datasets"]
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let datasets = ctx.datasets("datasets")?.clone();
        if datasets.is_empty() {
            return Err(BlockError::Data("no datasets to merge".to_string()));
        }

        // Optional subset; default is every loaded dataset, in name order.
        let names: Vec<String> = block.param_or(
            "names",
            datasets.keys().cloned().collect::<Vec<String>>(),
        );

        let mut frames = Vec::with_capacity(names.len());
        let mut target: Option<String> = None;
        for name in &names {
            let entry = datasets.get(name).ok_or_else(|| {
                BlockError::InvalidParams(format!("dataset '{name}' was never loaded"))
            })?;
            frames.push(&entry.frame);
            match (&target, &entry.target) {
                (None, Some(t)) => target = Some(t.clone()),
                (Some(a), Some(b)) if a != b => {
                    return Err(BlockError::Data(format!(
                        "datasets disagree on the target column: '{a}' vs '{b}'"
                    )))
                }
                _ => {}
            }
        }

        let merged = DataFrame::concat(&frames).map_err(|e| BlockError::Data(e.to_string()))?;
        info!(
            block_id = %block.id,
            sources = names.len(),
            rows = merged.n_rows(),
            cols = merged.n_cols(),
            "datasets merged"
        );

        if let Some(target) = target {
            ctx.insert("target", ContextValue::Text(target));
        }
        ctx.insert("df", ContextValue::Frame(merged));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NamedDataset;
    use crate::data::Series;
    use std::collections::BTreeMap;

    fn ctx_with_datasets() -> Context {
        let mut map = BTreeMap::new();
        map.insert(
            "a".to_string(),
            NamedDataset {
                frame: DataFrame::new(vec![
                    Series::numeric("x", vec![1.0, 2.0]),
                    Series::numeric("only_a", vec![0.0, 0.0]),
                ])
                .unwrap(),
                target: Some("x".to_string()),
            },
        );
        map.insert(
            "b".to_string(),
            NamedDataset {
                frame: DataFrame::new(vec![Series::numeric("x", vec![3.0])]).unwrap(),
                target: None,
            },
        );
        let mut ctx = Context::new();
        ctx.insert("datasets", ContextValue::Datasets(map));
        ctx
    }

    #[tokio::test]
    async fn test_merges_common_columns() {
        let mut ctx = ctx_with_datasets();
        let block = Block::new("merge", "dataset_merge");
        DatasetMergeBlock.execute(&block, &mut ctx).await.unwrap();

        let df = ctx.frame("df").unwrap();
        assert_eq!(df.n_rows(), 3);
        assert_eq!(df.column_names(), vec!["x"]);
        assert_eq!(ctx.text("target").unwrap(), "x");
    }

    #[tokio::test]
    async fn test_subset_by_name() {
        let mut ctx = ctx_with_datasets();
        let block = Block::new("merge", "dataset_merge").with_param("names", vec!["a"]);
        DatasetMergeBlock.execute(&block, &mut ctx).await.unwrap();

        assert_eq!(ctx.frame("df").unwrap().n_rows(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_targets_error() {
        let mut ctx = ctx_with_datasets();
        if let Some(ContextValue::Datasets(map)) = ctx.get("datasets") {
            let mut map = map.clone();
            map.get_mut("b").unwrap().target = Some("only_a".to_string());
            ctx.insert("datasets", ContextValue::Datasets(map));
        }
        let block = Block::new("merge", "dataset_merge");
        let err = DatasetMergeBlock.execute(&block, &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("disagree"));
    }

    #[tokio::test]
    async fn test_unknown_name_errors() {
        let mut ctx = ctx_with_datasets();
        let block = Block::new("merge", "dataset_merge").with_param("names", vec!["ghost"]);
        let err = DatasetMergeBlock.execute(&block, &mut ctx).await.unwrap_err();
        assert!(matches!(err, BlockError::InvalidParams(msg) if msg.contains("ghost")));
    }
}
