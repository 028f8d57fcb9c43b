// SPDX-License-Identifier: MIT

//! Preprocessing: column transform (impute + scale + one-hot), a standalone
//! matrix imputer, and the target label encoder.
//!
//! [`ColumnTransform`] is what turns a raw [`DataFrame`] into a model-ready
//! matrix. Fitted statistics come from the training frame only; the same
//! fitted transform is then replayed on test frames and at prediction time.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::data::{Column, DataFrame};
use crate::ml::MlError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct NumericStats {
    name: String,
    median: f64,
    mean: f64,
    std: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CategoricalStats {
    name: String,
    mode: String,
    // Sorted category list; one output column per category.
    categories: Vec<String>,
}

/// Fitted per-column preprocessing.
///
/// Numeric columns: median imputation, then standard scaling. Categorical
/// columns: most-frequent imputation, then one-hot encoding over the
/// categories seen at fit time (unseen categories encode as all zeros).
/// Output layout is all numeric columns first, then the one-hot groups, in
/// the order the columns appeared in the training frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ColumnTransform {
    numeric: Vec<NumericStats>,
    categorical: Vec<CategoricalStats>,
}

impl ColumnTransform {
    pub fn fit(df: &DataFrame) -> Result<Self, MlError> {
        if df.n_rows() == 0 {
            return Err(MlError::Shape("cannot fit on an empty frame".to_string()));
        }

        let mut numeric = Vec::new();
        let mut categorical = Vec::new();

        for series in df.columns() {
            match &series.data {
                Column::Numeric(values) => {
                    let median = series.data.median().expect("numeric column");
                    if median.is_nan() {
                        return Err(MlError::InvalidParams(format!(
                            "column '{}' has no observed values to impute from",
                            series.name
                        )));
                    }
                    let imputed: Vec<f64> = values
                        .iter()
                        .map(|&v| if v.is_nan() { median } else { v })
                        .collect();
                    let mean = imputed.iter().sum::<f64>() / imputed.len() as f64;
                    let var = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
                        / imputed.len() as f64;
                    numeric.push(NumericStats {
                        name: series.name.clone(),
                        median,
                        mean,
                        std: var.sqrt().max(1e-9),
                    });
                }
                Column::Categorical(_) => {
                    let mode = series.data.mode().ok_or_else(|| {
                        MlError::InvalidParams(format!(
                            "column '{}' has no observed values to impute from",
                            series.name
                        ))
                    })?;
                    let mut categories: Vec<String> = match &series.data {
                        Column::Categorical(v) => {
                            let mut cats: Vec<String> = v.iter().flatten().cloned().collect();
                            cats.sort();
                            cats.dedup();
                            cats
                        }
                        Column::Numeric(_) => unreachable!("matched categorical above"),
                    };
                    if categories.is_empty() {
                        categories.push(mode.clone());
                    }
                    categorical.push(CategoricalStats {
                        name: series.name.clone(),
                        mode,
                        categories,
                    });
                }
            }
        }

        Ok(Self {
            numeric,
            categorical,
        })
    }

    pub fn fit_transform(df: &DataFrame) -> Result<(Self, Array2<f64>), MlError> {
        let transform = Self::fit(df)?;
        let matrix = transform.transform(df)?;
        Ok((transform, matrix))
    }

    /// Applies the fitted statistics to a frame with the same columns.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>, MlError> {
        let n_rows = df.n_rows();
        let mut out = Array2::zeros((n_rows, self.n_output_features()));

        let mut col = 0;
        for stats in &self.numeric {
            let series = df.column(&stats.name).ok_or_else(|| {
                MlError::Shape(format!("column '{}' missing from frame", stats.name))
            })?;
            let Column::Numeric(values) = &series.data else {
                return Err(MlError::Shape(format!(
                    "column '{}' was numeric at fit time",
                    stats.name
                )));
            };
            for (i, &v) in values.iter().enumerate() {
                let v = if v.is_nan() { stats.median } else { v };
                out[[i, col]] = (v - stats.mean) / stats.std;
            }
            col += 1;
        }

        for stats in &self.categorical {
            let series = df.column(&stats.name).ok_or_else(|| {
                MlError::Shape(format!("column '{}' missing from frame", stats.name))
            })?;
            let Column::Categorical(values) = &series.data else {
                return Err(MlError::Shape(format!(
                    "column '{}' was categorical at fit time",
                    stats.name
                )));
            };
            for (i, value) in values.iter().enumerate() {
                let value = value.as_deref().unwrap_or(&stats.mode);
                if let Some(ci) = stats.categories.iter().position(|c| c == value) {
                    out[[i, col + ci]] = 1.0;
                }
                // Unseen categories stay all-zero.
            }
            col += stats.categories.len();
        }

        Ok(out)
    }

    pub fn n_output_features(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.categories.len()).sum::<usize>()
    }

    /// Names of the produced matrix columns, one-hot columns as `col=value`.
    pub fn output_feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|s| s.name.clone()).collect();
        for stats in &self.categorical {
            for cat in &stats.categories {
                names.push(format!("{}={}", stats.name, cat));
            }
        }
        names
    }

    /// Original frame columns this transform expects, numeric first.
    pub fn input_columns(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|s| s.name.clone())
            .chain(self.categorical.iter().map(|s| s.name.clone()))
            .collect()
    }
}

/// Median imputation for already-numeric matrices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Imputer {
    medians: Vec<f64>,
}

impl Imputer {
    pub fn fit(x: &Array2<f64>) -> Result<Self, MlError> {
        if x.nrows() == 0 {
            return Err(MlError::Shape("cannot fit on an empty matrix".to_string()));
        }
        let medians = (0..x.ncols())
            .map(|j| {
                let mut values: Vec<f64> =
                    x.column(j).iter().copied().filter(|v| !v.is_nan()).collect();
                if values.is_empty() {
                    return Err(MlError::InvalidParams(format!(
                        "matrix column {j} has no observed values to impute from"
                    )));
                }
                values.sort_by(|a, b| a.partial_cmp(b).expect("no NaN after filter"));
                let mid = values.len() / 2;
                Ok(if values.len() % 2 == 0 {
                    (values[mid - 1] + values[mid]) / 2.0
                } else {
                    values[mid]
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { medians })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        if x.ncols() != self.medians.len() {
            return Err(MlError::Shape(format!(
                "imputer fitted on {} columns, got {}",
                self.medians.len(),
                x.ncols()
            )));
        }
        let mut out = x.clone();
        for (j, &median) in self.medians.iter().enumerate() {
            for v in out.column_mut(j) {
                if v.is_nan() {
                    *v = median;
                }
            }
        }
        Ok(out)
    }
}

/// Maps string class labels to dense `f64` ids and back.
///
/// Classes are sorted at fit time, so the id assignment is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn fit(labels: &[String]) -> Result<Self, MlError> {
        if labels.is_empty() {
            return Err(MlError::Shape("cannot fit on empty labels".to_string()));
        }
        let mut classes = labels.to_vec();
        classes.sort();
        classes.dedup();
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn transform(&self, labels: &[String]) -> Result<Array1<f64>, MlError> {
        labels
            .iter()
            .map(|label| {
                self.classes
                    .iter()
                    .position(|c| c == label)
                    .map(|i| i as f64)
                    .ok_or_else(|| {
                        MlError::InvalidParams(format!("unseen class label '{label}'"))
                    })
            })
            .collect()
    }

    pub fn inverse_transform(&self, ids: &Array1<f64>) -> Result<Vec<String>, MlError> {
        ids.iter()
            .map(|&id| {
                let idx = id.round() as usize;
                self.classes.get(idx).cloned().ok_or_else(|| {
                    MlError::InvalidParams(format!("class id {id} out of range"))
                })
            })
            .collect()
    }
}
