// SPDX-License-Identifier: MIT

//! Random forest over the CART trees in [`crate::ml::tree`].
//!
//! Each tree trains on a bootstrap sample with a random sqrt-sized feature
//! subset. The RNG is seeded, so a forest fitted twice on the same data is
//! identical.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::ml::tree::DecisionTree;
use crate::ml::{MlError, Task};

fn default_n_estimators() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RandomForest {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub task: Task,
    trees: Vec<DecisionTree>,
    classes: Vec<f64>,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: default_seed(),
            task: Task::Classification,
            trees: Vec::new(),
            classes: Vec::new(),
        }
    }
}

impl RandomForest {
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
        if self.n_estimators == 0 {
            return Err(MlError::InvalidParams(
                "n_estimators must be at least 1".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let n_rows = x.nrows();
        let n_features = x.ncols();
        let subset_size = ((n_features as f64).sqrt().round() as usize).clamp(1, n_features);
        let all_features: Vec<usize> = (0..n_features).collect();

        self.classes = if self.task == Task::Classification {
            let mut classes: Vec<f64> = y.iter().copied().collect();
            classes.sort_by(|a, b| a.partial_cmp(b).expect("class ids are finite"));
            classes.dedup();
            classes
        } else {
            Vec::new()
        };

        self.trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let sample: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
            let x_boot = x.select(Axis(0), &sample);
            let y_boot = Array1::from_iter(sample.iter().map(|&i| y[i]));

            let features: Vec<usize> = all_features
                .choose_multiple(&mut rng, subset_size)
                .copied()
                .collect();

            let mut tree = DecisionTree::default();
            tree.max_depth = self.max_depth;
            tree.min_samples_split = self.min_samples_split;
            tree.min_samples_leaf = self.min_samples_leaf;
            tree.task = self.task;
            tree.fit_with_features(&x_boot, &y_boot, &features)?;
            self.trees.push(tree);
        }
        Ok(())
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        if self.trees.is_empty() {
            return Err(MlError::NotFitted("random_forest"));
        }
        match self.task {
            Task::Regression => {
                let mut acc = Array1::zeros(x.nrows());
                for tree in &self.trees {
                    acc = acc + tree.predict(x)?;
                }
                Ok(acc / self.trees.len() as f64)
            }
            Task::Classification => {
                let proba = self.predict_proba(x)?;
                Ok(proba
                    .axis_iter(Axis(0))
                    .map(|row| {
                        let best = row
                            .iter()
                            .enumerate()
                            .max_by(|a, b| {
                                a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal)
                            })
                            .map(|(i, _)| i)
                            .unwrap_or(0);
                        self.classes[best]
                    })
                    .collect())
            }
        }
    }

    /// Class vote fractions across the ensemble, columns ordered like
    /// [`Self::classes`]. Classification only.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        if self.trees.is_empty() {
            return Err(MlError::NotFitted("random_forest"));
        }
        if self.task != Task::Classification {
            return Err(MlError::InvalidParams(
                "probability output requires a classification forest".to_string(),
            ));
        }

        let mut votes = Array2::zeros((x.nrows(), self.classes.len()));
        for tree in &self.trees {
            let pred = tree.predict(x)?;
            for (i, &label) in pred.iter().enumerate() {
                if let Some(ci) = self.classes.iter().position(|&c| c == label) {
                    votes[[i, ci]] += 1.0;
                }
            }
        }
        votes /= self.trees.len() as f64;
        Ok(votes)
    }
}
