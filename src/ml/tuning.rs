// SPDX-License-Identifier: MIT

//! Hyperparameter search.
//!
//! Each tunable algorithm has a fixed parameter grid. Small grids are
//! searched exhaustively; large ones are sampled (20 candidates) with a
//! seeded RNG so repeated runs pick the same candidates. Candidates are
//! scored by k-fold cross-validation: accuracy for classification, negated
//! mean squared error for regression.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ml::model::normalize_algorithm;
use crate::ml::{MlError, Model, Task};

/// Above this many candidates the search switches to random sampling.
const MAX_EXHAUSTIVE: usize = 30;
const RANDOM_SEARCH_CANDIDATES: usize = 20;
const SEARCH_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Grid,
    Randomized,
}

/// What the search found, recorded into the trained artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TuningSummary {
    pub search: SearchKind,
    pub n_candidates: usize,
    pub cv_folds: usize,
    pub best_params: Map<String, Value>,
    /// Mean CV score of the winner (accuracy, or negated MSE).
    pub cv_score: f64,
}

/// The fixed search space for an algorithm, or `None` when the algorithm is
/// not tuned (it then trains once with its given parameters).
pub fn param_grid(algorithm: &str) -> Option<Vec<(&'static str, Vec<Value>)>> {
    match normalize_algorithm(algorithm).as_str() {
        "logistic_regression" => Some(vec![
            ("c", vec![json!(0.01), json!(0.1), json!(1.0), json!(10.0)]),
            ("max_iter", vec![json!(200), json!(500), json!(1000)]),
        ]),
        "knn" | "k_nearest_neighbors" => Some(vec![
            ("n_neighbors", vec![json!(3), json!(5), json!(7), json!(11)]),
            ("weights", vec![json!("uniform"), json!("distance")]),
        ]),
        "ridge" => Some(vec![(
            "alpha",
            vec![json!(0.1), json!(1.0), json!(10.0), json!(100.0)],
        )]),
        "decision_tree" => Some(vec![
            ("max_depth", vec![json!(5), json!(10), json!(20), Value::Null]),
            ("min_samples_split", vec![json!(2), json!(5), json!(10)]),
            ("min_samples_leaf", vec![json!(1), json!(2), json!(4)]),
        ]),
        "random_forest" => Some(vec![
            ("n_estimators", vec![json!(50), json!(100), json!(200)]),
            ("max_depth", vec![json!(5), json!(10), json!(20), Value::Null]),
            ("min_samples_split", vec![json!(2), json!(5), json!(10)]),
            ("min_samples_leaf", vec![json!(1), json!(2), json!(4)]),
        ]),
        _ => None,
    }
}

/// Runs the search for one algorithm. Returns `None` when the algorithm has
/// no grid; otherwise the winning parameter overrides and their CV score.
pub fn search_best_params(
    task: Task,
    algorithm: &str,
    base_params: &Map<String, Value>,
    x: &Array2<f64>,
    y: &Array1<f64>,
    cv_folds: usize,
) -> Result<Option<TuningSummary>, MlError> {
    let Some(grid) = param_grid(algorithm) else {
        return Ok(None);
    };

    let total: usize = grid.iter().map(|(_, values)| values.len()).product();
    let mut candidate_ids: Vec<usize> = (0..total).collect();
    let search = if total > MAX_EXHAUSTIVE {
        let mut rng = StdRng::seed_from_u64(SEARCH_SEED);
        candidate_ids.shuffle(&mut rng);
        candidate_ids.truncate(RANDOM_SEARCH_CANDIDATES);
        SearchKind::Randomized
    } else {
        SearchKind::Grid
    };

    let folds = effective_folds(cv_folds, x.nrows())?;
    let fold_assignment = assign_folds(x.nrows(), folds);

    let mut best: Option<(Map<String, Value>, f64)> = None;
    for &id in &candidate_ids {
        let overrides = nth_combination(&grid, id);
        let mut params = base_params.clone();
        params.extend(overrides.clone());

        match cross_val_score(task, algorithm, &params, x, y, &fold_assignment, folds) {
            Ok(score) => {
                if best.as_ref().map_or(true, |(_, b)| score > *b) {
                    best = Some((overrides, score));
                }
            }
            Err(e) => {
                tracing::debug!(algorithm, error = %e, "candidate failed cross-validation");
            }
        }
    }

    let (best_params, cv_score) = best.ok_or_else(|| {
        MlError::Numeric(format!(
            "every tuning candidate for '{algorithm}' failed cross-validation"
        ))
    })?;

    Ok(Some(TuningSummary {
        search,
        n_candidates: candidate_ids.len(),
        cv_folds: folds,
        best_params,
        cv_score,
    }))
}

fn effective_folds(requested: usize, n_samples: usize) -> Result<usize, MlError> {
    if n_samples < 4 {
        return Err(MlError::Shape(format!(
            "cross-validation needs at least 4 samples, got {n_samples}"
        )));
    }
    Ok(requested.clamp(2, n_samples))
}

/// Shuffled fold ids, one per sample. Seeded, so identical across runs.
fn assign_folds(n_samples: usize, folds: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(SEARCH_SEED);
    indices.shuffle(&mut rng);

    let mut assignment = vec![0; n_samples];
    for (pos, &sample) in indices.iter().enumerate() {
        assignment[sample] = pos % folds;
    }
    assignment
}

/// Decodes candidate `id` into one value per grid axis (mixed-radix).
fn nth_combination(grid: &[(&'static str, Vec<Value>)], mut id: usize) -> Map<String, Value> {
    let mut out = Map::new();
    for (name, values) in grid {
        let pick = id % values.len();
        id /= values.len();
        out.insert(name.to_string(), values[pick].clone());
    }
    out
}

fn cross_val_score(
    task: Task,
    algorithm: &str,
    params: &Map<String, Value>,
    x: &Array2<f64>,
    y: &Array1<f64>,
    fold_assignment: &[usize],
    folds: usize,
) -> Result<f64, MlError> {
    let mut scores = Vec::with_capacity(folds);
    for fold in 0..folds {
        let train: Vec<usize> = (0..x.nrows())
            .filter(|&i| fold_assignment[i] != fold)
            .collect();
        let val: Vec<usize> = (0..x.nrows())
            .filter(|&i| fold_assignment[i] == fold)
            .collect();
        if train.is_empty() || val.is_empty() {
            continue;
        }

        let x_train = x.select(Axis(0), &train);
        let y_train = Array1::from_iter(train.iter().map(|&i| y[i]));
        let x_val = x.select(Axis(0), &val);
        let y_val = Array1::from_iter(val.iter().map(|&i| y[i]));

        let mut model = Model::build(task, algorithm, params)?;
        model.fit(&x_train, &y_train)?;
        let pred = model.predict(&x_val)?;
        scores.push(score(task, &y_val, &pred));
    }

    if scores.is_empty() {
        return Err(MlError::Shape("no usable cross-validation folds".to_string()));
    }
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

fn score(task: Task, actual: &Array1<f64>, predicted: &Array1<f64>) -> f64 {
    match task {
        Task::Classification => {
            let hits = actual
                .iter()
                .zip(predicted)
                .filter(|(a, p)| a == p)
                .count();
            hits as f64 / actual.len() as f64
        }
        Task::Regression => {
            let mse = actual
                .iter()
                .zip(predicted)
                .map(|(a, p)| (a - p).powi(2))
                .sum::<f64>()
                / actual.len() as f64;
            -mse
        }
    }
}
