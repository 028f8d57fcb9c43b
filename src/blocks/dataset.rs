// SPDX-License-Identifier: MIT

//! The `dataset` block: loads a CSV file into the context.
//!
//! Outputs:
//! - `df`: the full frame
//! - `X`, `y`, `feature_names`, `target`, `task`: when a target column is
//!   declared
//! - an entry in `datasets` so a later `dataset_merge` can combine sources

use std::collections::BTreeMap;

use async_trait::async_trait;
use ndarray::Array1;
use tracing::info;

use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue, NamedDataset};
use crate::data::{Column, DataFrame};
use crate::errors::BlockError;
use crate::ml::Task;
use crate::pipeline::Block;

/// Splits `df` into feature/target views under the conventional keys and
/// returns the task inferred from the target's type. Shared with the data
/// cleaner, which refreshes the views after mutating `df`.
pub(crate) fn publish_target_views(
    ctx: &mut Context,
    df: &DataFrame,
    target: &str,
) -> Result<Task, BlockError> {
    let target_series = df.column(target).ok_or_else(|| {
        BlockError::InvalidParams(format!("target column '{target}' not found"))
    })?;

    let features = df.drop_column(target);
    ctx.insert(
        "feature_names",
        ContextValue::StringList(features.column_names()),
    );
    ctx.insert("X", ContextValue::Frame(features));

    let task = match &target_series.data {
        Column::Categorical(values) => {
            let labels: Vec<String> = values
                .iter()
                .map(|v| {
                    v.clone().ok_or_else(|| {
                        BlockError::Data(format!("target column '{target}' has missing values"))
                    })
                })
                .collect::<Result<_, _>>()?;
            ctx.insert("y", ContextValue::StringList(labels));
            Task::Classification
        }
        Column::Numeric(values) => {
            if values.iter().any(|v| v.is_nan()) {
                return Err(BlockError::Data(format!(
                    "target column '{target}' has missing values"
                )));
            }
            ctx.insert("y", ContextValue::Vector(Array1::from_vec(values.clone())));
            Task::Regression
        }
    };
    ctx.insert("target", ContextValue::Text(target.to_string()));
    Ok(task)
}

pub struct DatasetBlock;

#[async_trait]
impl BlockHandler for DatasetBlock {
    fn name(&self) -> &str {
        "dataset"
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let file_path: String = block.param("file_path").ok_or_else(|| {
            BlockError::InvalidParams("dataset block needs a 'file_path' parameter".to_string())
        })?;
        let target: Option<String> = block.param("target");
        let name: String = block.param_or("name", block.id.clone());

        let df = DataFrame::from_csv(&file_path)
            .map_err(|e| BlockError::Data(format!("loading '{file_path}': {e}")))?;
        info!(
            block_id = %block.id,
            rows = df.n_rows(),
            cols = df.n_cols(),
            "dataset loaded"
        );

        if let Some(target) = &target {
            let inferred = publish_target_views(ctx, &df, target)?;
            // An explicit task param wins over the inferred one, so numeric
            // class ids can still drive classification.
            let task: String = block.param_or("task", inferred.to_string());
            ctx.insert("task", ContextValue::Text(task));
        }

        let mut datasets = match ctx.remove("datasets") {
            Some(ContextValue::Datasets(map)) => map,
            _ => BTreeMap::new(),
        };
        datasets.insert(
            name,
            NamedDataset {
                frame: df.clone(),
                target: target.clone(),
            },
        );
        ctx.insert("datasets", ContextValue::Datasets(datasets));
        ctx.insert("df", ContextValue::Frame(df));
        Ok(())
    }
}
