// SPDX-License-Identifier: MIT

//! The `data_cleaner` block: duplicate removal, a configurable
//! missing-value strategy, and optional outlier clipping on the working
//! frame.
//!
//! `missing_strategy` is one of `drop_rows`, `drop_cols` (columns whose
//! missing ratio exceeds `missing_threshold`), `impute_mean`,
//! `impute_median`, `impute_mode`, `impute_constant` (uses `fill_value`).
//! `clip_outliers` is `none`, `iqr` (1.5 IQR fences) or `zscore` (3 sigma).
//! When a target is already declared and left complete by the cleaning, the
//! `X`/`y` views are refreshed from the cleaned frame.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::blocks::dataset::publish_target_views;
use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue};
use crate::data::{Column, DataFrame};
use crate::errors::BlockError;
use crate::pipeline::Block;

pub struct DataCleanerBlock;

#[derive(Debug, Clone, Copy, PartialEq)]
enum MissingStrategy {
    DropRows,
    DropCols,
    Mean,
    Median,
    Mode,
    Constant,
}

impl MissingStrategy {
    fn parse(s: &str) -> Result<Self, BlockError> {
        match s {
            "drop_rows" => Ok(Self::DropRows),
            "drop_cols" => Ok(Self::DropCols),
            "impute_mean" => Ok(Self::Mean),
            "impute_median" => Ok(Self::Median),
            "impute_mode" => Ok(Self::Mode),
            "impute_constant" => Ok(Self::Constant),
            other => Err(BlockError::InvalidParams(format!(
                "unknown missing_strategy '{other}'"
            ))),
        }
    }
}

#[derive(Default)]
struct CleaningStats {
    rows_removed: usize,
    cols_dropped: usize,
    values_imputed: usize,
    values_clipped: usize,
}

#[async_trait]
impl BlockHandler for DataCleanerBlock {
    fn name(&self) -> &str {
        "data_cleaner"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["df"]
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let mut df = ctx.frame("df")?.clone();
        let mut stats = CleaningStats::default();
        let target = ctx.text("target").ok().cloned();

        if block.param_or("drop_duplicates", true) {
            let before = df.n_rows();
            df = drop_duplicate_rows(&df);
            stats.rows_removed += before - df.n_rows();
        }

        let strategy =
            MissingStrategy::parse(&block.param_or("missing_strategy", "impute_median".to_string()))?;
        match strategy {
            MissingStrategy::DropRows => {
                let before = df.n_rows();
                df = drop_rows_with_missing(&df);
                stats.rows_removed += before - df.n_rows();
            }
            MissingStrategy::DropCols => {
                let threshold: f64 = block.param_or("missing_threshold", 0.5);
                stats.cols_dropped = drop_sparse_columns(&mut df, threshold, target.as_deref());
            }
            _ => {
                let fill = block.param::<Value>("fill_value");
                stats.values_imputed = impute_missing(&mut df, strategy, fill.as_ref())?;
            }
        }

        match block.param_or("clip_outliers", "none".to_string()).as_str() {
            "none" => {}
            "iqr" => stats.values_clipped = clip_numeric(&mut df, iqr_fences),
            "zscore" => stats.values_clipped = clip_numeric(&mut df, zscore_fences),
            other => {
                return Err(BlockError::InvalidParams(format!(
                    "unknown clip_outliers mode '{other}'"
                )))
            }
        }

        info!(
            block_id = %block.id,
            rows_removed = stats.rows_removed,
            cols_dropped = stats.cols_dropped,
            values_imputed = stats.values_imputed,
            values_clipped = stats.values_clipped,
            "frame cleaned"
        );

        // Refresh the X/y views only when the target column survived with no
        // gaps; a sparse target kept under drop_cols leaves the old views
        // alone instead of failing the clean.
        if let Some(target) = &target {
            match df.column(target) {
                Some(series) if series.data.missing_count() == 0 => {
                    publish_target_views(ctx, &df, target)?;
                }
                _ => {}
            }
        }
        ctx.insert(
            "rows_removed",
            ContextValue::Number(stats.rows_removed as f64),
        );
        ctx.insert(
            "cleaning_stats",
            ContextValue::Json(json!({
                "rows_removed": stats.rows_removed,
                "cols_dropped": stats.cols_dropped,
                "values_imputed": stats.values_imputed,
                "values_clipped": stats.values_clipped,
            })),
        );
        ctx.insert("df", ContextValue::Frame(df));
        Ok(())
    }
}

fn drop_duplicate_rows(df: &DataFrame) -> DataFrame {
    let mut seen = std::collections::HashSet::new();
    let mut keep = Vec::new();
    for i in 0..df.n_rows() {
        let key: Vec<String> = df
            .columns()
            .iter()
            .map(|series| match &series.data {
                Column::Numeric(v) => {
                    // NaN compares unequal to itself, so key on the bits.
                    format!("{:x}", v[i].to_bits())
                }
                Column::Categorical(v) => format!("{:?}", v[i]),
            })
            .collect();
        if seen.insert(key) {
            keep.push(i);
        }
    }
    df.take_rows(&keep)
}

fn drop_rows_with_missing(df: &DataFrame) -> DataFrame {
    let keep: Vec<usize> = (0..df.n_rows())
        .filter(|&i| {
            df.columns().iter().all(|series| match &series.data {
                Column::Numeric(v) => !v[i].is_nan(),
                Column::Categorical(v) => v[i].is_some(),
            })
        })
        .collect();
    df.take_rows(&keep)
}

/// Drops columns whose missing ratio exceeds the threshold. The declared
/// target column is always kept: dropping it would silently break every
/// downstream block.
fn drop_sparse_columns(df: &mut DataFrame, threshold: f64, target: Option<&str>) -> usize {
    let n = df.n_rows().max(1);
    let doomed: Vec<String> = df
        .columns()
        .iter()
        .filter(|series| Some(series.name.as_str()) != target)
        .filter(|series| {
            let missing = match &series.data {
                Column::Numeric(v) => v.iter().filter(|x| x.is_nan()).count(),
                Column::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
            };
            missing as f64 / n as f64 > threshold
        })
        .map(|series| series.name.clone())
        .collect();
    for name in &doomed {
        *df = df.drop_column(name);
    }
    doomed.len()
}

fn numeric_mode(values: &[f64]) -> Option<f64> {
    let mut counts: std::collections::HashMap<u64, usize> = std::collections::HashMap::new();
    for &v in values.iter().filter(|v| !v.is_nan()) {
        *counts.entry(v.to_bits()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(bits, _)| f64::from_bits(bits))
}

fn impute_missing(
    df: &mut DataFrame,
    strategy: MissingStrategy,
    fill: Option<&Value>,
) -> Result<usize, BlockError> {
    let mut imputed = 0;
    let names = df.column_names();
    for name in names {
        let series = df.column(&name).expect("iterating own columns");
        match &series.data {
            Column::Numeric(values) => {
                let missing = values.iter().filter(|v| v.is_nan()).count();
                if missing == 0 {
                    continue;
                }
                let replacement = match strategy {
                    MissingStrategy::Mean => series.data.mean(),
                    MissingStrategy::Median => series.data.median(),
                    MissingStrategy::Mode => numeric_mode(values),
                    MissingStrategy::Constant => Some(
                        fill.and_then(Value::as_f64).ok_or_else(|| {
                            BlockError::InvalidParams(
                                "impute_constant on a numeric column needs a numeric fill_value"
                                    .to_string(),
                            )
                        })?,
                    ),
                    _ => unreachable!("drop strategies handled by the caller"),
                }
                .filter(|v| !v.is_nan())
                .ok_or_else(|| {
                    BlockError::Data(format!(
                        "column '{name}' has no observed values to impute from"
                    ))
                })?;
                let filled: Vec<f64> = values
                    .iter()
                    .map(|&v| if v.is_nan() { replacement } else { v })
                    .collect();
                df.column_mut(&name).expect("iterating own columns").data =
                    Column::Numeric(filled);
                imputed += missing;
            }
            Column::Categorical(values) => {
                let missing = values.iter().filter(|v| v.is_none()).count();
                if missing == 0 {
                    continue;
                }
                // Mean has no meaning for strings; fall through to the mode.
                let replacement = match strategy {
                    MissingStrategy::Constant => fill
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| {
                            BlockError::InvalidParams(
                                "impute_constant on a categorical column needs a string fill_value"
                                    .to_string(),
                            )
                        })?,
                    _ => series.data.mode().ok_or_else(|| {
                        BlockError::Data(format!(
                            "column '{name}' has no observed values to impute from"
                        ))
                    })?,
                };
                let filled: Vec<Option<String>> = values
                    .iter()
                    .map(|v| v.clone().or_else(|| Some(replacement.clone())))
                    .collect();
                df.column_mut(&name).expect("iterating own columns").data =
                    Column::Categorical(filled);
                imputed += missing;
            }
        }
    }
    Ok(imputed)
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

fn iqr_fences(values: &[f64]) -> Option<(f64, f64)> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.len() < 4 {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("no NaN after filter"));
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    Some((q1 - 1.5 * iqr, q3 + 1.5 * iqr))
}

fn zscore_fences(values: &[f64]) -> Option<(f64, f64)> {
    let observed: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if observed.len() < 2 {
        return None;
    }
    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let std = (observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    if std == 0.0 {
        return None;
    }
    Some((mean - 3.0 * std, mean + 3.0 * std))
}

fn clip_numeric(df: &mut DataFrame, fences: fn(&[f64]) -> Option<(f64, f64)>) -> usize {
    let mut clipped = 0;
    let names = df.column_names();
    for name in names {
        let series = df.column(&name).expect("iterating own columns");
        let Column::Numeric(values) = &series.data else {
            continue;
        };
        let Some((lo, hi)) = fences(values) else {
            continue;
        };
        let adjusted: Vec<f64> = values
            .iter()
            .map(|&v| {
                if v.is_nan() || (lo..=hi).contains(&v) {
                    v
                } else {
                    clipped += 1;
                    v.clamp(lo, hi)
                }
            })
            .collect();
        df.column_mut(&name).expect("iterating own columns").data = Column::Numeric(adjusted);
    }
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Series;

    fn dirty_frame() -> DataFrame {
        DataFrame::new(vec![
            Series::numeric("x", vec![1.0, 1.0, f64::NAN, 3.0]),
            Series::categorical(
                "c",
                vec![Some("a".into()), Some("a".into()), None, Some("b".into())],
            ),
        ])
        .unwrap()
    }

    #[tokio::test]
    async fn test_dedupes_and_imputes() {
        let mut ctx = Context::new();
        ctx.insert("df", ContextValue::Frame(dirty_frame()));
        let block = Block::new("clean", "data_cleaner");
        DataCleanerBlock.execute(&block, &mut ctx).await.unwrap();

        let df = ctx.frame("df").unwrap();
        assert_eq!(df.n_rows(), 3);
        assert_eq!(df.missing_count(), 0);
        assert_eq!(ctx.number("rows_removed").unwrap(), 1.0);

        let stats = ctx.json("cleaning_stats").unwrap();
        assert_eq!(stats["values_imputed"], 2);
    }

    #[tokio::test]
    async fn test_drop_rows_strategy() {
        let mut ctx = Context::new();
        ctx.insert("df", ContextValue::Frame(dirty_frame()));
        let block = Block::new("clean", "data_cleaner")
            .with_param("drop_duplicates", false)
            .with_param("missing_strategy", "drop_rows");
        DataCleanerBlock.execute(&block, &mut ctx).await.unwrap();

        let df = ctx.frame("df").unwrap();
        assert_eq!(df.n_rows(), 3);
        assert_eq!(df.missing_count(), 0);
    }

    #[tokio::test]
    async fn test_drop_cols_keeps_the_target() {
        let mut ctx = Context::new();
        let df = DataFrame::new(vec![
            Series::numeric("mostly_gone", vec![f64::NAN, f64::NAN, f64::NAN, 1.0]),
            Series::numeric("y", vec![f64::NAN, f64::NAN, f64::NAN, 2.0]),
            Series::numeric("fine", vec![1.0, 2.0, 3.0, 4.0]),
        ])
        .unwrap();
        ctx.insert("df", ContextValue::Frame(df));
        ctx.insert("target", ContextValue::Text("y".into()));
        let block = Block::new("clean", "data_cleaner")
            .with_param("drop_duplicates", false)
            .with_param("missing_strategy", "drop_cols");
        DataCleanerBlock.execute(&block, &mut ctx).await.unwrap();

        assert_eq!(ctx.frame("df").unwrap().column_names(), vec!["y", "fine"]);
        // The kept target still has gaps, so no X/y views are published.
        assert!(ctx.frame("X").is_err());
        assert_eq!(ctx.json("cleaning_stats").unwrap()["cols_dropped"], 1);
    }

    #[tokio::test]
    async fn test_constant_fill() {
        let mut ctx = Context::new();
        ctx.insert("df", ContextValue::Frame(dirty_frame()));
        let block = Block::new("clean", "data_cleaner")
            .with_param("missing_strategy", "impute_constant")
            .with_param("fill_value", -1);
        // -1 fills the numeric gap; the categorical column needs a string.
        let err = DataCleanerBlock.execute(&block, &mut ctx).await.unwrap_err();
        assert!(matches!(err, BlockError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_iqr_clipping() {
        let mut ctx = Context::new();
        let df = DataFrame::new(vec![Series::numeric(
            "x",
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 1000.0],
        )])
        .unwrap();
        ctx.insert("df", ContextValue::Frame(df));
        let block = Block::new("clean", "data_cleaner").with_param("clip_outliers", "iqr");
        DataCleanerBlock.execute(&block, &mut ctx).await.unwrap();

        let df = ctx.frame("df").unwrap();
        let Column::Numeric(values) = &df.column("x").unwrap().data else {
            panic!("numeric column");
        };
        assert!(values[5] < 1000.0);
        assert_eq!(ctx.json("cleaning_stats").unwrap()["values_clipped"], 1);
    }

    #[tokio::test]
    async fn test_unknown_strategy_fails() {
        let mut ctx = Context::new();
        ctx.insert("df", ContextValue::Frame(dirty_frame()));
        let block =
            Block::new("clean", "data_cleaner").with_param("missing_strategy", "wish_away");
        let err = DataCleanerBlock.execute(&block, &mut ctx).await.unwrap_err();
        assert!(matches!(err, BlockError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_refreshes_target_views() {
        let mut ctx = Context::new();
        ctx.insert("df", ContextValue::Frame(dirty_frame()));
        ctx.insert("target", ContextValue::Text("c".into()));
        let block = Block::new("clean", "data_cleaner");
        DataCleanerBlock.execute(&block, &mut ctx).await.unwrap();

        assert_eq!(ctx.frame("X").unwrap().column_names(), vec!["x"]);
        assert_eq!(ctx.string_list("y").unwrap().len(), 3);
    }
}
