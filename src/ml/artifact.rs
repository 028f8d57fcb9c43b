// SPDX-License-Identifier: MIT

//! Trained model artifacts.
//!
//! An artifact bundles a fitted model with everything needed to score raw
//! rows later: the fitted preprocessing, the label mapping, and provenance
//! (features, target, timestamp, tuning outcome). Artifacts serialize to
//! JSON files under the store's directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::data::DataFrame;
use crate::ml::preprocess::{ColumnTransform, Imputer, LabelEncoder};
use crate::ml::tuning::TuningSummary;
use crate::ml::{MlError, Model, Task};

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact '{0}' not found")]
    NotFound(String),
}

/// Predictions in the target's original domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Predictions {
    /// Classification with a fitted label encoder.
    Labels(Vec<String>),
    /// Regression, or classification over numeric labels.
    Values(Vec<f64>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainedModelArtifact {
    pub id: String,
    pub task: Task,
    pub algorithm: String,
    pub model: Model,
    /// Original frame columns the model was trained from, before encoding.
    pub feature_names: Vec<String>,
    pub target_name: Option<String>,
    pub trained_at: DateTime<Utc>,
    pub n_samples: usize,
    /// Width of the encoded training matrix.
    pub n_features: usize,
    pub feature_pipeline: Option<ColumnTransform>,
    pub numeric_imputer: Option<Imputer>,
    pub label_encoder: Option<LabelEncoder>,
    pub tuning: Option<TuningSummary>,
}

impl TrainedModelArtifact {
    pub fn new_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Scores raw rows by replaying the fitted preprocessing, then mapping
    /// class ids back through the label encoder when one was fitted.
    pub fn predict(&self, df: &DataFrame) -> Result<Predictions, MlError> {
        let matrix = self.encode(df)?;
        let raw = self.model.predict(&matrix)?;

        match &self.label_encoder {
            Some(encoder) => Ok(Predictions::Labels(encoder.inverse_transform(&raw)?)),
            None => Ok(Predictions::Values(raw.to_vec())),
        }
    }

    /// Raw-to-matrix encoding, identical to what the trainer did at fit time.
    pub fn encode(&self, df: &DataFrame) -> Result<Array2<f64>, MlError> {
        let matrix = match &self.feature_pipeline {
            Some(pipeline) => pipeline.transform(df)?,
            None => df
                .to_matrix()
                .map_err(|e| MlError::Shape(e.to_string()))?,
        };
        match &self.numeric_imputer {
            Some(imputer) => imputer.transform(&matrix),
            None => Ok(matrix),
        }
    }

    /// Scores already-encoded rows.
    pub fn predict_encoded(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        self.model.predict(x)
    }
}

/// Directory-backed artifact persistence, one JSON file per artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("artifact_{id}.json"))
    }

    pub fn save(&self, artifact: &TrainedModelArtifact) -> Result<PathBuf, ArtifactError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&artifact.id);
        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, artifact)?;
        Ok(path)
    }

    pub fn load(&self, id: &str) -> Result<TrainedModelArtifact, ArtifactError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(ArtifactError::NotFound(id.to_string()));
        }
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Ids of all stored artifacts, sorted.
    pub fn list(&self) -> Result<Vec<String>, ArtifactError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(id) = name
                .strip_prefix("artifact_")
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Series;
    use serde_json::Map;

    fn fitted_artifact() -> TrainedModelArtifact {
        let df = DataFrame::new(vec![
            Series::numeric("x", vec![0.0, 1.0, 10.0, 11.0]),
            Series::categorical(
                "label",
                vec![Some("low".into()), Some("low".into()), Some("high".into()), Some("high".into())],
            ),
        ])
        .unwrap();

        let features = df.drop_column("label");
        let (pipeline, matrix) = ColumnTransform::fit_transform(&features).unwrap();
        let labels: Vec<String> = vec!["low".into(), "low".into(), "high".into(), "high".into()];
        let encoder = LabelEncoder::fit(&labels).unwrap();
        let y = encoder.transform(&labels).unwrap();

        let mut model = Model::build(Task::Classification, "knn", &Map::new()).unwrap();
        model.fit(&matrix, &y).unwrap();

        TrainedModelArtifact {
            id: TrainedModelArtifact::new_id(),
            task: Task::Classification,
            algorithm: "knn".to_string(),
            model,
            feature_names: vec!["x".to_string()],
            target_name: Some("label".to_string()),
            trained_at: Utc::now(),
            n_samples: 4,
            n_features: pipeline.n_output_features(),
            feature_pipeline: Some(pipeline),
            numeric_imputer: None,
            label_encoder: Some(encoder),
            tuning: None,
        }
    }

    #[test]
    fn test_predict_returns_original_labels() {
        let artifact = fitted_artifact();
        let new = DataFrame::new(vec![Series::numeric("x", vec![0.5, 10.5])]).unwrap();

        match artifact.predict(&new).unwrap() {
            Predictions::Labels(labels) => assert_eq!(labels, vec!["low", "high"]),
            other => panic!("expected labels, got {other:?}"),
        }
    }

    #[test]
    fn test_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = fitted_artifact();

        let path = store.save(&artifact).unwrap();
        assert!(path.ends_with(format!("artifact_{}.json", artifact.id)));

        let restored = store.load(&artifact.id).unwrap();
        assert_eq!(restored, artifact);
        assert_eq!(store.list().unwrap(), vec![artifact.id.clone()]);
    }

    #[test]
    fn test_load_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(matches!(
            store.load("nope"),
            Err(ArtifactError::NotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_restored_artifact_predicts_identically() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let artifact = fitted_artifact();
        store.save(&artifact).unwrap();

        let restored = store.load(&artifact.id).unwrap();
        let new = DataFrame::new(vec![Series::numeric("x", vec![0.5])]).unwrap();
        assert_eq!(artifact.predict(&new).unwrap(), restored.predict(&new).unwrap());

        let encoded = artifact.encode(&new).unwrap();
        assert_eq!(
            artifact.predict_encoded(&encoded).unwrap(),
            restored.predict_encoded(&encoded).unwrap()
        );
    }
}
