// SPDX-License-Identifier: MIT

//! K-nearest-neighbors for classification and regression.
//!
//! Brute-force Euclidean search; fitting just stores the training set.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::ml::{MlError, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NeighborWeights {
    #[default]
    Uniform,
    Distance,
}

fn default_n_neighbors() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Knn {
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,
    pub weights: NeighborWeights,
    pub task: Task,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
    classes: Vec<f64>,
}

impl Default for Knn {
    fn default() -> Self {
        Self {
            n_neighbors: default_n_neighbors(),
            weights: NeighborWeights::Uniform,
            task: Task::Classification,
            x_train: None,
            y_train: None,
            classes: Vec::new(),
        }
    }
}

impl Knn {
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        if x.nrows() != y.len() {
            return Err(MlError::Shape(format!(
                "{} samples but {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(MlError::Shape("cannot fit on an empty matrix".to_string()));
        }
        if self.n_neighbors == 0 {
            return Err(MlError::InvalidParams(
                "n_neighbors must be at least 1".to_string(),
            ));
        }

        // More neighbors than rows degenerates to "every row"; clamp so the
        // vote count matches what the data can provide.
        self.n_neighbors = self.n_neighbors.min(x.nrows());

        if self.task == Task::Classification {
            let mut classes: Vec<f64> = y.iter().copied().collect();
            classes.sort_by(|a, b| a.partial_cmp(b).expect("class ids are finite"));
            classes.dedup();
            self.classes = classes;
        }
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Indices and weights of the k nearest training rows for one query row.
    fn neighbors(&self, row: &[f64]) -> Result<Vec<(usize, f64)>, MlError> {
        let x_train = self.x_train.as_ref().ok_or(MlError::NotFitted("knn"))?;

        let mut dists: Vec<(usize, f64)> = x_train
            .axis_iter(Axis(0))
            .enumerate()
            .map(|(i, train_row)| {
                let d2: f64 = train_row
                    .iter()
                    .zip(row)
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (i, d2.sqrt())
            })
            .collect();
        dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        dists.truncate(self.n_neighbors.min(dists.len()));

        Ok(dists
            .into_iter()
            .map(|(i, d)| {
                let w = match self.weights {
                    NeighborWeights::Uniform => 1.0,
                    NeighborWeights::Distance => 1.0 / (d + 1e-9),
                };
                (i, w)
            })
            .collect())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let y_train = self.y_train.as_ref().ok_or(MlError::NotFitted("knn"))?;

        let mut out = Vec::with_capacity(x.nrows());
        for row in x.axis_iter(Axis(0)) {
            let neighbors = self.neighbors(&row.to_vec())?;
            let value = match self.task {
                Task::Regression => {
                    let total_w: f64 = neighbors.iter().map(|(_, w)| w).sum();
                    neighbors
                        .iter()
                        .map(|&(i, w)| y_train[i] * w)
                        .sum::<f64>()
                        / total_w
                }
                Task::Classification => {
                    let mut votes: Vec<(f64, f64)> = Vec::new();
                    for &(i, w) in &neighbors {
                        match votes.iter_mut().find(|(c, _)| *c == y_train[i]) {
                            Some((_, acc)) => *acc += w,
                            None => votes.push((y_train[i], w)),
                        }
                    }
                    // Votes are inserted nearest-first; a strict comparison
                    // keeps the first maximum, so ties go to the closer class.
                    let mut best: Option<(f64, f64)> = None;
                    for &(c, w) in &votes {
                        if best.map_or(true, |(_, bw)| w > bw) {
                            best = Some((c, w));
                        }
                    }
                    best.map(|(c, _)| c).unwrap_or(f64::NAN)
                }
            };
            out.push(value);
        }
        Ok(Array1::from_vec(out))
    }

    /// Neighbor vote fractions per class, columns ordered like
    /// [`Self::classes`]. Classification only.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        let y_train = self.y_train.as_ref().ok_or(MlError::NotFitted("knn"))?;
        if self.task != Task::Classification {
            return Err(MlError::InvalidParams(
                "probability output requires a classification model".to_string(),
            ));
        }

        let mut out = Array2::zeros((x.nrows(), self.classes.len()));
        for (ri, row) in x.axis_iter(Axis(0)).enumerate() {
            let neighbors = self.neighbors(&row.to_vec())?;
            let total_w: f64 = neighbors.iter().map(|(_, w)| w).sum();
            for &(i, w) in &neighbors {
                if let Some(ci) = self.classes.iter().position(|&c| c == y_train[i]) {
                    out[[ri, ci]] += w / total_w;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_majority_vote_classification() {
        let x = array![[0.0], [0.1], [0.2], [10.0], [10.1]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0];
        let mut knn = Knn {
            n_neighbors: 3,
            ..Knn::default()
        };
        knn.fit(&x, &y).unwrap();

        let pred = knn.predict(&array![[0.05], [10.05]]).unwrap();
        assert_eq!(pred, array![0.0, 1.0]);
    }

    #[test]
    fn test_tie_goes_to_the_nearest_class() {
        // k=4 produces a 2-2 vote either way; the nearer pair must win.
        let x = array![[0.0], [0.1], [5.0], [5.1]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut knn = Knn {
            n_neighbors: 4,
            ..Knn::default()
        };
        knn.fit(&x, &y).unwrap();

        let pred = knn.predict(&array![[0.05], [5.05]]).unwrap();
        assert_eq!(pred, array![0.0, 1.0]);
    }

    #[test]
    fn test_k_larger_than_training_set_is_clamped() {
        let x = array![[0.0], [0.2], [9.0]];
        let y = array![0.0, 0.0, 1.0];
        let mut knn = Knn::default(); // k = 5 against 3 rows
        knn.fit(&x, &y).unwrap();

        assert_eq!(knn.n_neighbors, 3);
        assert_eq!(knn.predict(&array![[0.1]]).unwrap()[0], 0.0);
    }

    #[test]
    fn test_distance_weights_favor_closest() {
        // Query sits on top of a lone class-1 point with two class-0 points
        // slightly further out. Uniform k=3 votes 0; distance weighting
        // picks 1.
        let x = array![[0.0], [2.0], [2.1]];
        let y = array![1.0, 0.0, 0.0];
        let mut knn = Knn {
            n_neighbors: 3,
            weights: NeighborWeights::Distance,
            ..Knn::default()
        };
        knn.fit(&x, &y).unwrap();

        let pred = knn.predict(&array![[0.01]]).unwrap();
        assert_eq!(pred[0], 1.0);
    }

    #[test]
    fn test_regression_averages_neighbors() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![10.0, 20.0, 30.0];
        let mut knn = Knn {
            n_neighbors: 3,
            task: Task::Regression,
            ..Knn::default()
        };
        knn.fit(&x, &y).unwrap();

        let pred = knn.predict(&array![[1.0]]).unwrap();
        assert!((pred[0] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_proba_rows_sum_to_one() {
        let x = array![[0.0], [1.0], [10.0]];
        let y = array![0.0, 0.0, 1.0];
        let mut knn = Knn {
            n_neighbors: 2,
            ..Knn::default()
        };
        knn.fit(&x, &y).unwrap();

        let proba = knn.predict_proba(&array![[0.5], [9.0]]).unwrap();
        for row in proba.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }
}
