// SPDX-License-Identifier: MIT

//! The `feature_pipeline` block: fits the column transform on the training
//! frame and replaces `X_train`/`X_test` with encoded matrices.
//!
//! Statistics come from the training rows only; the test frame is encoded
//! with the fitted transform, never refitted.

use async_trait::async_trait;
use tracing::info;

use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue};
use crate::errors::BlockError;
use crate::ml::preprocess::ColumnTransform;
use crate::pipeline::Block;

pub struct FeaturePipelineBlock;

#[async_trait]
impl BlockHandler for FeaturePipelineBlock {
    fn name(&self) -> &str {
        "feature_pipeline"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["X_train", "X_test"]
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let train = ctx.frame("X_train")?;
        let test = ctx.frame("X_test")?;

        let (transform, train_matrix) = ColumnTransform::fit_transform(train)?;
        let test_matrix = transform.transform(test)?;

        info!(
            block_id = %block.id,
            input_cols = transform.input_columns().len(),
            output_cols = transform.n_output_features(),
            "feature pipeline fitted"
        );

        ctx.insert(
            "encoded_feature_names",
            ContextValue::StringList(transform.output_feature_names()),
        );
        ctx.insert("feature_pipeline", ContextValue::FeaturePipeline(transform));
        ctx.insert("X_train", ContextValue::Matrix(train_matrix));
        ctx.insert("X_test", ContextValue::Matrix(test_matrix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataFrame, Series};

    fn ctx_with_frames() -> Context {
        let mut ctx = Context::new();
        let train = DataFrame::new(vec![
            Series::numeric("age", vec![10.0, 20.0, 30.0]),
            Series::categorical(
                "city",
                vec![Some("a".into()), Some("b".into()), Some("a".into())],
            ),
        ])
        .unwrap();
        let test = DataFrame::new(vec![
            Series::numeric("age", vec![20.0]),
            Series::categorical("city", vec![Some("b".into())]),
        ])
        .unwrap();
        ctx.insert("X_train", ContextValue::Frame(train));
        ctx.insert("X_test", ContextValue::Frame(test));
        ctx
    }

    #[tokio::test]
    async fn test_replaces_frames_with_matrices() {
        let mut ctx = ctx_with_frames();
        let block = Block::new("features", "feature_pipeline");
        FeaturePipelineBlock.execute(&block, &mut ctx).await.unwrap();

        // age + one-hot over {a, b}
        assert_eq!(ctx.matrix("X_train").unwrap().shape(), &[3, 3]);
        assert_eq!(ctx.matrix("X_test").unwrap().shape(), &[1, 3]);
        assert!(ctx.feature_pipeline("feature_pipeline").is_ok());
        assert_eq!(
            ctx.string_list("encoded_feature_names").unwrap(),
            &["age", "city=a", "city=b"]
        );
    }

    #[tokio::test]
    async fn test_test_rows_use_training_statistics() {
        let mut ctx = ctx_with_frames();
        let block = Block::new("features", "feature_pipeline");
        FeaturePipelineBlock.execute(&block, &mut ctx).await.unwrap();

        // 20.0 is the training mean of age, so it encodes to zero.
        let test = ctx.matrix("X_test").unwrap();
        assert!(test[[0, 0]].abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_matrix_input_is_rejected() {
        let mut ctx = ctx_with_frames();
        ctx.insert("X_train", ContextValue::Matrix(ndarray::Array2::zeros((2, 2))));
        let block = Block::new("features", "feature_pipeline");
        assert!(FeaturePipelineBlock.execute(&block, &mut ctx).await.is_err());
    }
}
