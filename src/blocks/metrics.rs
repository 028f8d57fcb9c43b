// SPDX-License-Identifier: MIT

//! The `metrics` block: scores the trained model on the held-out split.
//!
//! Emits a `metrics` report (accuracy/precision/recall/F1 for
//! classification, MSE/RMSE/MAE/R² for regression) plus the predictions,
//! mapped back to original labels when a label encoder was fitted.

use async_trait::async_trait;
use ndarray::{Array1, Array2};
use serde_json::json;
use tracing::info;

use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue};
use crate::errors::BlockError;
use crate::ml::metrics::{classification_report, regression_report};
use crate::ml::preprocess::LabelEncoder;
use crate::ml::Task;
use crate::pipeline::Block;

pub struct MetricsBlock;

fn encoded_test_features(ctx: &Context) -> Result<Array2<f64>, BlockError> {
    match ctx.get("X_test") {
        Some(ContextValue::Matrix(m)) => Ok(m.clone()),
        Some(ContextValue::Frame(df)) => {
            // Raw frames replay the trainer's preprocessing.
            if let Ok(artifact) = ctx.artifact("artifact") {
                return Ok(artifact.encode(df)?);
            }
            if let Ok(pipeline) = ctx.feature_pipeline("feature_pipeline") {
                return Ok(pipeline.transform(df)?);
            }
            df.to_matrix().map_err(|e| BlockError::Data(e.to_string()))
        }
        Some(other) => Err(BlockError::Data(format!(
            "context key 'X_test' holds a {}, expected a frame or matrix",
            other.kind()
        ))),
        None => Err(BlockError::Data(
            "context key 'X_test' is missing".to_string(),
        )),
    }
}

fn label_encoder(ctx: &Context) -> Option<LabelEncoder> {
    if let Ok(encoder) = ctx.label_encoder("label_encoder") {
        return Some(encoder.clone());
    }
    ctx.artifact("artifact")
        .ok()
        .and_then(|a| a.label_encoder.clone())
}

fn encoded_test_targets(ctx: &Context) -> Result<Array1<f64>, BlockError> {
    match ctx.get("y_test") {
        Some(ContextValue::Vector(v)) => Ok(v.clone()),
        Some(ContextValue::StringList(labels)) => {
            let encoder = label_encoder(ctx).ok_or_else(|| {
                BlockError::Data(
                    "y_test holds labels but no label encoder was fitted".to_string(),
                )
            })?;
            Ok(encoder.transform(labels)?)
        }
        Some(other) => Err(BlockError::Data(format!(
            "context key 'y_test' holds a {}, expected a vector or string_list",
            other.kind()
        ))),
        None => Err(BlockError::Data(
            "context key 'y_test' is missing".to_string(),
        )),
    }
}

#[async_trait]
impl BlockHandler for MetricsBlock {
    fn name(&self) -> &str {
        "metrics"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["model", "X_test", "y_test"]
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let model = ctx.model("model")?.clone();
        let x_test = encoded_test_features(ctx)?;
        let y_actual = encoded_test_targets(ctx)?;

        let y_pred = model.predict(&x_test)?;
        let report = match model.task() {
            Task::Classification => classification_report(&y_actual, &y_pred)?,
            Task::Regression => regression_report(&y_actual, &y_pred)?,
        };
        info!(block_id = %block.id, task = %model.task(), report = %json!(report), "model evaluated");

        match label_encoder(ctx) {
            Some(encoder) => {
                ctx.insert(
                    "y_pred",
                    ContextValue::StringList(encoder.inverse_transform(&y_pred)?),
                );
                ctx.insert(
                    "y_actual",
                    ContextValue::StringList(encoder.inverse_transform(&y_actual)?),
                );
            }
            None => {
                ctx.insert("y_pred", ContextValue::Vector(y_pred));
                ctx.insert("y_actual", ContextValue::Vector(y_actual));
            }
        }
        ctx.insert("metrics", ContextValue::Json(json!(report)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::Model;
    use ndarray::array;
    use serde_json::Map;

    fn fitted_ctx() -> Context {
        let mut ctx = Context::new();
        let x = array![[0.0], [1.0], [9.0], [10.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = Model::build(Task::Classification, "knn", &Map::new()).unwrap();
        model.fit(&x, &y).unwrap();
        ctx.insert("model", ContextValue::Model(model));
        ctx.insert("X_test", ContextValue::Matrix(array![[0.5], [9.5]]));
        ctx.insert("y_test", ContextValue::Vector(array![0.0, 1.0]));
        ctx
    }

    #[tokio::test]
    async fn test_classification_metrics() {
        let mut ctx = fitted_ctx();
        let block = Block::new("eval", "metrics");
        MetricsBlock.execute(&block, &mut ctx).await.unwrap();

        let report = match ctx.get("metrics").unwrap() {
            ContextValue::Json(v) => v.clone(),
            other => panic!("expected json, got {}", other.kind()),
        };
        assert_eq!(report["accuracy"], 1.0);
        assert_eq!(ctx.vector("y_pred").unwrap(), &array![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_label_encoder_maps_predictions_back() {
        let mut ctx = fitted_ctx();
        let encoder =
            LabelEncoder::fit(&["high".to_string(), "low".to_string()]).unwrap();
        // Class ids: high=0, low=1 (sorted).
        ctx.insert(
            "y_test",
            ContextValue::StringList(vec!["high".into(), "low".into()]),
        );
        ctx.insert("label_encoder", ContextValue::LabelEncoder(encoder));

        let block = Block::new("eval", "metrics");
        MetricsBlock.execute(&block, &mut ctx).await.unwrap();

        assert_eq!(ctx.string_list("y_pred").unwrap(), &["high", "low"]);
        assert_eq!(ctx.string_list("y_actual").unwrap(), &["high", "low"]);
    }

    #[tokio::test]
    async fn test_regression_metrics() {
        let mut ctx = Context::new();
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let mut model =
            Model::build(Task::Regression, "linear_regression", &Map::new()).unwrap();
        model.fit(&x, &y).unwrap();
        ctx.insert("model", ContextValue::Model(model));
        ctx.insert("X_test", ContextValue::Matrix(array![[4.0]]));
        ctx.insert("y_test", ContextValue::Vector(array![9.0]));

        let block = Block::new("eval", "metrics");
        MetricsBlock.execute(&block, &mut ctx).await.unwrap();

        let report = match ctx.get("metrics").unwrap() {
            ContextValue::Json(v) => v.clone(),
            other => panic!("expected json, got {}", other.kind()),
        };
        assert!(report["mse"].as_f64().unwrap() < 1e-9);
    }

    #[tokio::test]
    async fn test_labels_without_encoder_fail() {
        let mut ctx = fitted_ctx();
        ctx.insert(
            "y_test",
            ContextValue::StringList(vec!["a".into(), "b".into()]),
        );
        let block = Block::new("eval", "metrics");
        assert!(MetricsBlock.execute(&block, &mut ctx).await.is_err());
    }
}
