// SPDX-License-Identifier: MIT

//! The `trainer` block: adapts to whatever the context holds, tunes when a
//! parameter grid exists, fits, and emits a self-sufficient artifact.
//!
//! Adaptation rules:
//! - `X_train` as a frame gets a column transform fitted here when it has
//!   categorical columns or missing values; a clean numeric frame is used
//!   as-is. A matrix is used directly, with median imputation when NaNs
//!   are present.
//! - `y_train` as strings gets a label encoder; as numbers it is used as-is.
//! - a `model` in the context is trained as given; without one a default
//!   model for the task is built from the block's own params.
//!
//! Anything fitted here is also applied to the held-out split (`X_test`,
//! `y_test`) so the metrics block sees encoded data. The training split
//! itself is never mutated, so re-running the trainer on clean numeric data
//! trains the same model.

use async_trait::async_trait;
use ndarray::{Array1, Array2};
use tracing::{info, warn};

use crate::blocks::model::{params_as_map, resolve_task};
use crate::blocks::BlockHandler;
use crate::context::{Context, ContextValue};
use crate::errors::BlockError;
use crate::ml::artifact::{ArtifactStore, TrainedModelArtifact};
use crate::ml::preprocess::{ColumnTransform, Imputer, LabelEncoder};
use crate::ml::tuning::search_best_params;
use crate::ml::{Model, Task};
use crate::pipeline::Block;

const DEFAULT_ALGORITHM: &str = "random_forest";
const MIN_TUNING_SAMPLES: usize = 4;

pub struct TrainerBlock;

struct EncodedFeatures {
    matrix: Array2<f64>,
    pipeline: Option<ColumnTransform>,
    imputer: Option<Imputer>,
    names: Vec<String>,
}

struct EncodedTargets {
    y: Array1<f64>,
    encoder: Option<LabelEncoder>,
    inferred: Task,
}

fn encode_targets(ctx: &Context) -> Result<EncodedTargets, BlockError> {
    match ctx.get("y_train") {
        Some(ContextValue::Vector(v)) => Ok(EncodedTargets {
            y: v.clone(),
            encoder: None,
            inferred: Task::Regression,
        }),
        Some(ContextValue::StringList(labels)) => {
            let encoder = LabelEncoder::fit(labels)?;
            Ok(EncodedTargets {
                y: encoder.transform(labels)?,
                encoder: Some(encoder),
                inferred: Task::Classification,
            })
        }
        Some(other) => Err(BlockError::Data(format!(
            "context key 'y_train' holds a {}, expected a vector or string_list",
            other.kind()
        ))),
        None => Err(BlockError::Data(
            "context key 'y_train' is missing".to_string(),
        )),
    }
}

fn encode_features(ctx: &Context) -> Result<EncodedFeatures, BlockError> {
    match ctx.get("X_train") {
        Some(ContextValue::Frame(df)) => {
            let names = df.column_names();
            if df.categorical_column_names().is_empty() && df.missing_count() == 0 {
                // Already numeric and complete; encoding would only rescale
                // it, so leave the data alone and fit nothing.
                let matrix = df
                    .to_matrix()
                    .map_err(|e| BlockError::Data(e.to_string()))?;
                return Ok(EncodedFeatures {
                    matrix,
                    names,
                    pipeline: None,
                    imputer: None,
                });
            }
            let (pipeline, matrix) = ColumnTransform::fit_transform(df)?;
            Ok(EncodedFeatures {
                matrix,
                names,
                pipeline: Some(pipeline),
                imputer: None,
            })
        }
        Some(ContextValue::Matrix(m)) => {
            let names = ctx
                .string_list("feature_names")
                .map(Clone::clone)
                .unwrap_or_else(|_| (0..m.ncols()).map(|i| format!("f{i}")).collect());
            // An earlier feature_pipeline block leaves its transform behind;
            // carry it so the artifact can score raw rows.
            let pipeline = ctx.feature_pipeline("feature_pipeline").ok().cloned();

            if m.iter().any(|v| v.is_nan()) {
                let imputer = Imputer::fit(m)?;
                Ok(EncodedFeatures {
                    matrix: imputer.transform(m)?,
                    pipeline,
                    imputer: Some(imputer),
                    names,
                })
            } else {
                Ok(EncodedFeatures {
                    matrix: m.clone(),
                    pipeline,
                    imputer: None,
                    names,
                })
            }
        }
        Some(other) => Err(BlockError::Data(format!(
            "context key 'X_train' holds a {}, expected a frame or matrix",
            other.kind()
        ))),
        None => Err(BlockError::Data(
            "context key 'X_train' is missing".to_string(),
        )),
    }
}

/// Replays whatever was fitted on the training split onto the held-out
/// split, in place, so downstream evaluation sees encoded data. Keys that
/// are absent or already encoded are left alone.
fn encode_test_split(
    ctx: &mut Context,
    features: &EncodedFeatures,
    targets: &EncodedTargets,
) -> Result<(), BlockError> {
    if let Some(pipeline) = &features.pipeline {
        if let Some(ContextValue::Frame(df)) = ctx.get("X_test") {
            let encoded = pipeline.transform(df)?;
            ctx.insert("X_test", ContextValue::Matrix(encoded));
        }
    }
    if let Some(imputer) = &features.imputer {
        if let Some(ContextValue::Matrix(m)) = ctx.get("X_test") {
            if m.iter().any(|v| v.is_nan()) {
                let imputed = imputer.transform(m)?;
                ctx.insert("X_test", ContextValue::Matrix(imputed));
            }
        }
    }
    if let Some(encoder) = &targets.encoder {
        if let Some(ContextValue::StringList(labels)) = ctx.get("y_test") {
            let encoded = encoder.transform(labels)?;
            ctx.insert("y_test", ContextValue::Vector(encoded));
        }
    }
    Ok(())
}

#[async_trait]
impl BlockHandler for TrainerBlock {
    fn name(&self) -> &str {
        "trainer"
    }

    fn required_keys(&self) -> &'static [&'static str] {
        &["X_train", "y_train"]
    }

    async fn execute(&self, block: &Block, ctx: &mut Context) -> Result<(), BlockError> {
        let targets = encode_targets(ctx)?;
        let features = encode_features(ctx)?;
        if features.matrix.nrows() != targets.y.len() {
            return Err(BlockError::Data(format!(
                "X_train has {} rows but y_train has {}",
                features.matrix.nrows(),
                targets.y.len()
            )));
        }

        let mut model = match ctx.get("model") {
            Some(ContextValue::Model(m)) => m.clone(),
            Some(other) => {
                return Err(BlockError::Data(format!(
                    "context key 'model' holds a {}, expected a model",
                    other.kind()
                )))
            }
            None => {
                let task = resolve_task(block, ctx).unwrap_or(targets.inferred);
                let algorithm: String = block.param_or("algorithm", DEFAULT_ALGORITHM.to_string());
                Model::build(task, &algorithm, &params_as_map(block))?
            }
        };

        let task = model.task();
        if task == Task::Regression && targets.encoder.is_some() {
            return Err(BlockError::Data(
                "y_train holds class labels but the model solves a regression task".to_string(),
            ));
        }

        // Hyperparameter search, when the algorithm has a grid and there is
        // enough data to cross-validate.
        let auto_tune: bool = block.param_or("auto_tune", false);
        let cv_folds: usize = block.param_or("cv_folds", 3);
        let mut tuning = None;
        if auto_tune && features.matrix.nrows() >= MIN_TUNING_SAMPLES {
            match search_best_params(
                task,
                model.algorithm(),
                &params_as_map(block),
                &features.matrix,
                &targets.y,
                cv_folds,
            )? {
                Some(summary) => {
                    let mut params = params_as_map(block);
                    params.extend(summary.best_params.clone());
                    model = Model::build(task, model.algorithm(), &params)?;
                    info!(
                        block_id = %block.id,
                        algorithm = model.algorithm(),
                        cv_score = summary.cv_score,
                        candidates = summary.n_candidates,
                        "hyperparameter search complete"
                    );
                    tuning = Some(summary);
                }
                None => {
                    info!(
                        block_id = %block.id,
                        algorithm = model.algorithm(),
                        "no parameter grid for this algorithm, training as configured"
                    );
                }
            }
        } else if auto_tune {
            warn!(
                block_id = %block.id,
                rows = features.matrix.nrows(),
                "too few rows for cross-validation, training as configured"
            );
        }

        model.fit(&features.matrix, &targets.y)?;
        info!(
            block_id = %block.id,
            algorithm = model.algorithm(),
            %task,
            samples = features.matrix.nrows(),
            features = features.matrix.ncols(),
            "model trained"
        );

        encode_test_split(ctx, &features, &targets)?;

        let artifact = TrainedModelArtifact {
            id: TrainedModelArtifact::new_id(),
            task,
            algorithm: model.algorithm().to_string(),
            model: model.clone(),
            feature_names: features.names,
            target_name: ctx.text("target").ok().cloned(),
            trained_at: chrono::Utc::now(),
            n_samples: features.matrix.nrows(),
            n_features: features.matrix.ncols(),
            feature_pipeline: features.pipeline.clone(),
            numeric_imputer: features.imputer.clone(),
            label_encoder: targets.encoder.clone(),
            tuning,
        };

        if block.param_or("save_artifact", true) {
            let dir: String = block.param_or("artifact_dir", "artifacts".to_string());
            let path = ArtifactStore::new(dir).save(&artifact)?;
            info!(block_id = %block.id, artifact_id = %artifact.id, path = %path.display(), "artifact saved");
            ctx.insert(
                "artifact_path",
                ContextValue::Text(path.display().to_string()),
            );
        }

        if let Some(pipeline) = features.pipeline {
            ctx.insert("feature_pipeline", ContextValue::FeaturePipeline(pipeline));
        }
        if let Some(imputer) = features.imputer {
            ctx.insert("imputer", ContextValue::Imputer(imputer));
        }
        if let Some(encoder) = targets.encoder {
            ctx.insert("label_encoder", ContextValue::LabelEncoder(encoder));
        }
        ctx.insert("artifact_id", ContextValue::Text(artifact.id.clone()));
        ctx.insert("artifact", ContextValue::Artifact(artifact));
        ctx.insert("model", ContextValue::Model(model));
        Ok(())
    }
}
