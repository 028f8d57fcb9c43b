// SPDX-License-Identifier: MIT

//! Model engine: algorithms, preprocessing, tuning, evaluation, artifacts.
//!
//! Everything here operates on dense `ndarray` matrices with `f64` class ids
//! for classification targets (the label encoder owns the mapping back to
//! the original labels). Models are plain serializable values so a fitted
//! model can travel inside a saved artifact.

pub mod artifact;
pub mod forest;
pub mod knn;
pub mod linear;
pub mod metrics;
pub mod model;
pub mod naive_bayes;
pub mod preprocess;
pub mod tree;
pub mod tuning;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use model::Model;

/// The learning task a pipeline is solving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Classification,
    Regression,
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Classification => write!(f, "classification"),
            Task::Regression => write!(f, "regression"),
        }
    }
}

impl std::str::FromStr for Task {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classification" => Ok(Task::Classification),
            "regression" => Ok(Task::Regression),
            other => Err(MlError::InvalidParams(format!(
                "unknown task '{other}', expected 'classification' or 'regression'"
            ))),
        }
    }
}

#[derive(Error, Debug)]
pub enum MlError {
    #[error("unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    #[error("algorithm '{algorithm}' does not support {task} tasks")]
    TaskMismatch { algorithm: String, task: Task },

    #[error("model '{0}' has not been fitted")]
    NotFitted(&'static str),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("numerical failure: {0}")]
    Numeric(String),
}
