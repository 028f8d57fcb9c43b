// SPDX-License-Identifier: MIT

//! CART decision trees.
//!
//! Greedy binary splits on numeric features, gini impurity for
//! classification and variance for regression. The random forest reuses the
//! same builder with a restricted feature set per tree.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::ml::{MlError, Task};

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, row: &[f64]) -> f64 {
        match self {
            Node::Leaf { value } => *value,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.predict(row)
                } else {
                    right.predict(row)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecisionTree {
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    pub task: Task,
    root: Option<Node>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            task: Task::Classification,
            root: None,
        }
    }
}

impl DecisionTree {
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        let all: Vec<usize> = (0..x.ncols()).collect();
        self.fit_with_features(x, y, &all)
    }

    /// Fits considering only the given feature columns for splits.
    pub fn fit_with_features(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        features: &[usize],
    ) -> Result<(), MlError> {
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
        if self.min_samples_split < 2 {
            return Err(MlError::InvalidParams(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }

        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build(x, y, &rows, features, 0));
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let root = self.root.as_ref().ok_or(MlError::NotFitted("decision_tree"))?;
        Ok(x.rows()
            .into_iter()
            .map(|row| root.predict(&row.to_vec()))
            .collect())
    }

    fn build(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        features: &[usize],
        depth: usize,
    ) -> Node {
        let leaf = Node::Leaf {
            value: self.leaf_value(y, rows),
        };

        if rows.len() < self.min_samples_split {
            return leaf;
        }
        if self.max_depth.is_some_and(|max| depth >= max) {
            return leaf;
        }
        if is_pure(y, rows) {
            return leaf;
        }

        let Some((feature, threshold)) = self.best_split(x, y, rows, features) else {
            return leaf;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| x[[i, feature]] <= threshold);
        if left_rows.len() < self.min_samples_leaf || right_rows.len() < self.min_samples_leaf {
            return leaf;
        }

        Node::Split {
            feature,
            threshold,
            left: Box::new(self.build(x, y, &left_rows, features, depth + 1)),
            right: Box::new(self.build(x, y, &right_rows, features, depth + 1)),
        }
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        rows: &[usize],
        features: &[usize],
    ) -> Option<(usize, f64)> {
        let parent = self.impurity(y, rows);
        let mut best: Option<(usize, f64, f64)> = None;

        for &feature in features {
            let mut values: Vec<f64> = rows.iter().map(|&i| x[[i, feature]]).collect();
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            values.dedup();

            for pair in values.windows(2) {
                let threshold = (pair[0] + pair[1]) / 2.0;
                let (left, right): (Vec<usize>, Vec<usize>) =
                    rows.iter().partition(|&&i| x[[i, feature]] <= threshold);
                if left.len() < self.min_samples_leaf || right.len() < self.min_samples_leaf {
                    continue;
                }

                let weighted = (left.len() as f64 * self.impurity(y, &left)
                    + right.len() as f64 * self.impurity(y, &right))
                    / rows.len() as f64;
                let gain = parent - weighted;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, threshold, gain));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }

    fn impurity(&self, y: &Array1<f64>, rows: &[usize]) -> f64 {
        match self.task {
            Task::Classification => gini(y, rows),
            Task::Regression => variance(y, rows),
        }
    }

    fn leaf_value(&self, y: &Array1<f64>, rows: &[usize]) -> f64 {
        match self.task {
            Task::Classification => majority(y, rows),
            Task::Regression => {
                rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len().max(1) as f64
            }
        }
    }
}

fn is_pure(y: &Array1<f64>, rows: &[usize]) -> bool {
    rows.windows(2).all(|w| y[w[0]] == y[w[1]])
}

fn gini(y: &Array1<f64>, rows: &[usize]) -> f64 {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &i in rows {
        match counts.iter_mut().find(|(c, _)| *c == y[i]) {
            Some((_, n)) => *n += 1,
            None => counts.push((y[i], 1)),
        }
    }
    let total = rows.len() as f64;
    1.0 - counts
        .iter()
        .map(|(_, n)| (*n as f64 / total).powi(2))
        .sum::<f64>()
}

fn variance(y: &Array1<f64>, rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let mean = rows.iter().map(|&i| y[i]).sum::<f64>() / rows.len() as f64;
    rows.iter().map(|&i| (y[i] - mean).powi(2)).sum::<f64>() / rows.len() as f64
}

fn majority(y: &Array1<f64>, rows: &[usize]) -> f64 {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &i in rows {
        match counts.iter_mut().find(|(c, _)| *c == y[i]) {
            Some((_, n)) => *n += 1,
            None => counts.push((y[i], 1)),
        }
    }
    counts
        .iter()
        .max_by_key(|(_, n)| *n)
        .map(|(c, _)| *c)
        .unwrap_or(f64::NAN)
}
