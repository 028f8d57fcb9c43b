// SPDX-License-Identifier: MIT

//! Shared execution context.
//!
//! Every block in a run reads from and writes to one mutable [`Context`], a
//! string-keyed map of typed values. Well-known keys ("df", "X_train",
//! "model", ...) are conventions between blocks, not a schema; any block may
//! introduce new keys.
//!
//! Custom blocks run in a WASM sandbox and only see a JSON projection of the
//! context ([`Context::sandbox_snapshot`]); values with no JSON-friendly form
//! (fitted models, transforms) are withheld. Whatever JSON object the sandbox
//! returns is merged back with [`Context::merge_json`].

use std::collections::{BTreeMap, HashMap};

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::data::{Column, DataFrame};
use crate::errors::BlockError;
use crate::ml::artifact::TrainedModelArtifact;
use crate::ml::preprocess::{ColumnTransform, Imputer, LabelEncoder};
use crate::ml::Model;

/// A dataset entry produced by the `dataset` block for later merging, with
/// the target column it was declared with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedDataset {
    pub frame: DataFrame,
    pub target: Option<String>,
}

/// One value in the shared context.
#[derive(Debug, Clone)]
pub enum ContextValue {
    Frame(DataFrame),
    Matrix(Array2<f64>),
    Vector(Array1<f64>),
    Model(Model),
    Artifact(TrainedModelArtifact),
    FeaturePipeline(ColumnTransform),
    Imputer(Imputer),
    LabelEncoder(LabelEncoder),
    Datasets(BTreeMap<String, NamedDataset>),
    StringList(Vec<String>),
    Text(String),
    Number(f64),
    Bool(bool),
    Json(Value),
}

impl ContextValue {
    /// Short type label used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ContextValue::Frame(_) => "frame",
            ContextValue::Matrix(_) => "matrix",
            ContextValue::Vector(_) => "vector",
            ContextValue::Model(_) => "model",
            ContextValue::Artifact(_) => "artifact",
            ContextValue::FeaturePipeline(_) => "feature_pipeline",
            ContextValue::Imputer(_) => "imputer",
            ContextValue::LabelEncoder(_) => "label_encoder",
            ContextValue::Datasets(_) => "datasets",
            ContextValue::StringList(_) => "string_list",
            ContextValue::Text(_) => "text",
            ContextValue::Number(_) => "number",
            ContextValue::Bool(_) => "bool",
            ContextValue::Json(_) => "json",
        }
    }

    /// Maps a JSON value coming back from a sandboxed block onto the closest
    /// typed representation. Anything without an obvious shape stays raw JSON.
    pub fn from_json(value: Value) -> ContextValue {
        match value {
            Value::Bool(b) => ContextValue::Bool(b),
            Value::Number(n) => ContextValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => ContextValue::Text(s),
            Value::Array(items) => classify_array(items),
            other => ContextValue::Json(other),
        }
    }

    /// JSON projection for the sandbox, or `None` for values that are
    /// withheld from custom blocks.
    fn to_sandbox_json(&self) -> Option<Value> {
        match self {
            ContextValue::Frame(df) => Some(frame_to_json(df)),
            ContextValue::Matrix(m) => Some(json!(m
                .rows()
                .into_iter()
                .map(|r| r.to_vec())
                .collect::<Vec<_>>())),
            ContextValue::Vector(v) => Some(json!(v.to_vec())),
            ContextValue::Datasets(map) => {
                let obj: serde_json::Map<String, Value> = map
                    .iter()
                    .map(|(name, ds)| {
                        (
                            name.clone(),
                            json!({
                                "target": ds.target,
                                "data": frame_to_json(&ds.frame),
                            }),
                        )
                    })
                    .collect();
                Some(Value::Object(obj))
            }
            ContextValue::StringList(v) => Some(json!(v)),
            ContextValue::Text(s) => Some(json!(s)),
            ContextValue::Number(n) => Some(json!(n)),
            ContextValue::Bool(b) => Some(json!(b)),
            ContextValue::Json(v) => Some(v.clone()),
            ContextValue::Model(_)
            | ContextValue::Artifact(_)
            | ContextValue::FeaturePipeline(_)
            | ContextValue::Imputer(_)
            | ContextValue::LabelEncoder(_) => None,
        }
    }
}

fn classify_array(items: Vec<Value>) -> ContextValue {
    if items.iter().all(|v| v.is_number()) {
        let values: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
        return ContextValue::Vector(Array1::from_vec(values));
    }
    if !items.is_empty() && items.iter().all(|v| v.is_string()) {
        let values = items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        return ContextValue::StringList(values);
    }
    if !items.is_empty()
        && items
            .iter()
            .all(|v| v.as_array().is_some_and(|row| row.iter().all(Value::is_number)))
    {
        let rows: Vec<Vec<f64>> = items
            .iter()
            .map(|v| {
                v.as_array()
                    .expect("checked above")
                    .iter()
                    .filter_map(Value::as_f64)
                    .collect()
            })
            .collect();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().all(|r| r.len() == width) {
            let flat: Vec<f64> = rows.iter().flatten().copied().collect();
            if let Ok(m) = Array2::from_shape_vec((rows.len(), width), flat) {
                return ContextValue::Matrix(m);
            }
        }
    }
    ContextValue::Json(Value::Array(items))
}

fn frame_to_json(df: &DataFrame) -> Value {
    let obj: serde_json::Map<String, Value> = df
        .columns()
        .iter()
        .map(|series| {
            let values = match &series.data {
                Column::Numeric(v) => json!(v
                    .iter()
                    .map(|x| if x.is_nan() { Value::Null } else { json!(x) })
                    .collect::<Vec<_>>()),
                Column::Categorical(v) => json!(v),
            };
            (series.name.clone(), values)
        })
        .collect();
    Value::Object(obj)
}

fn missing(key: &str) -> BlockError {
    BlockError::Data(format!("context key '{key}' is missing"))
}

fn ill_typed(key: &str, expected: &str, found: &ContextValue) -> BlockError {
    BlockError::Data(format!(
        "context key '{key}' holds a {}, expected a {expected}",
        found.kind()
    ))
}

/// The mutable state shared by all blocks in one run.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: HashMap<String, ContextValue>,
}

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $ty:ty, $label:literal) => {
        pub fn $name(&self, key: &str) -> Result<&$ty, BlockError> {
            match self.values.get(key) {
                Some(ContextValue::$variant(v)) => Ok(v),
                Some(other) => Err(ill_typed(key, $label, other)),
                None => Err(missing(key)),
            }
        }
    };
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ContextValue) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ContextValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    typed_getter!(frame, Frame, DataFrame, "frame");
    typed_getter!(matrix, Matrix, Array2<f64>, "matrix");
    typed_getter!(vector, Vector, Array1<f64>, "vector");
    typed_getter!(model, Model, Model, "model");
    typed_getter!(artifact, Artifact, TrainedModelArtifact, "artifact");
    typed_getter!(
        feature_pipeline,
        FeaturePipeline,
        ColumnTransform,
        "feature_pipeline"
    );
    typed_getter!(imputer, Imputer, Imputer, "imputer");
    typed_getter!(label_encoder, LabelEncoder, LabelEncoder, "label_encoder");
    typed_getter!(
        datasets,
        Datasets,
        BTreeMap<String, NamedDataset>,
        "datasets"
    );
    typed_getter!(string_list, StringList, Vec<String>, "string_list");
    typed_getter!(text, Text, String, "text");
    typed_getter!(json, Json, Value, "json");

    pub fn number(&self, key: &str) -> Result<f64, BlockError> {
        match self.values.get(key) {
            Some(ContextValue::Number(n)) => Ok(*n),
            Some(other) => Err(ill_typed(key, "number", other)),
            None => Err(missing(key)),
        }
    }

    /// JSON view of the context handed to sandboxed custom blocks. Values
    /// with no JSON-friendly form are omitted rather than erroring, so custom
    /// blocks can run at any point in a pipeline.
    pub fn sandbox_snapshot(&self) -> Value {
        let mut obj = serde_json::Map::new();
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(v) = self.values[key].to_sandbox_json() {
                obj.insert(key.clone(), v);
            }
        }
        Value::Object(obj)
    }

    /// Merges a JSON object returned by a sandboxed block back into the
    /// context. Existing keys are overwritten.
    pub fn merge_json(&mut self, output: serde_json::Map<String, Value>) {
        for (key, value) in output {
            self.values.insert(key, ContextValue::from_json(value));
        }
    }
}
