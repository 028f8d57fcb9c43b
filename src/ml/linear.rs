// SPDX-License-Identifier: MIT

//! Linear models: ordinary least squares, ridge, and one-vs-rest logistic
//! regression.
//!
//! The least-squares variants solve their normal equations directly with
//! Gaussian elimination; logistic regression uses batch gradient descent.
//! All of these assume fully numeric, NaN-free input (the trainer's
//! preprocessing guarantees that).

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::ml::MlError;

/// Solves `a * x = b` by Gaussian elimination with partial pivoting.
/// `a` must be square.
pub(crate) fn solve_linear_system(
    mut a: Array2<f64>,
    mut b: Array1<f64>,
) -> Result<Array1<f64>, MlError> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return Err(MlError::Shape(format!(
            "cannot solve {}x{} system with rhs of length {}",
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| {
                a[[i, col]]
                    .abs()
                    .partial_cmp(&a[[j, col]].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("non-empty range");
        if a[[pivot_row, col]].abs() < 1e-12 {
            return Err(MlError::Numeric(
                "singular design matrix in least-squares solve".to_string(),
            ));
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap([pivot_row, k], [col, k]);
            }
            b.swap(pivot_row, col);
        }

        for row in (col + 1)..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in (row + 1)..n {
            acc -= a[[row, k]] * x[k];
        }
        x[row] = acc / a[[row, row]];
    }
    Ok(x)
}

/// Appends a bias column of ones to the design matrix.
fn with_bias(x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::ones((x.nrows(), x.ncols() + 1));
    out.slice_mut(ndarray::s![.., ..x.ncols()]).assign(x);
    out
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct LinearFit {
    weights: Array1<f64>,
    intercept: f64,
}

fn fit_least_squares(
    x: &Array2<f64>,
    y: &Array1<f64>,
    l2_penalty: f64,
) -> Result<LinearFit, MlError> {
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

    let xb = with_bias(x);
    let mut gram = xb.t().dot(&xb);
    if l2_penalty > 0.0 {
        // The bias term is not penalized.
        for i in 0..x.ncols() {
            gram[[i, i]] += l2_penalty;
        }
    }
    let rhs = xb.t().dot(y);
    let solution = solve_linear_system(gram, rhs)?;

    let n_features = x.ncols();
    Ok(LinearFit {
        weights: solution.slice(ndarray::s![..n_features]).to_owned(),
        intercept: solution[n_features],
    })
}

fn predict_linear(fit: &LinearFit, x: &Array2<f64>) -> Array1<f64> {
    x.dot(&fit.weights) + fit.intercept
}

/// Ordinary least squares regression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinearRegression {
    #[serde(default)]
    fitted: Option<LinearFit>,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self { fitted: None }
    }
}

impl LinearRegression {
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        self.fitted = Some(fit_least_squares(x, y, 0.0)?);
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or(MlError::NotFitted("linear_regression"))?;
        Ok(predict_linear(fit, x))
    }
}

/// L2-regularized least squares.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Ridge {
    pub alpha: f64,
    #[serde(default)]
    fitted: Option<LinearFit>,
}

impl Default for Ridge {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            fitted: None,
        }
    }
}

impl Ridge {
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        if self.alpha < 0.0 {
            return Err(MlError::InvalidParams(format!(
                "ridge alpha must be non-negative, got {}",
                self.alpha
            )));
        }
        self.fitted = Some(fit_least_squares(x, y, self.alpha)?);
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let fit = self.fitted.as_ref().ok_or(MlError::NotFitted("ridge"))?;
        Ok(predict_linear(fit, x))
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct LogisticFit {
    classes: Vec<f64>,
    // One row of weights per class (one-vs-rest).
    weights: Array2<f64>,
    intercepts: Array1<f64>,
}

/// One-vs-rest logistic regression trained with batch gradient descent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogisticRegression {
    /// Inverse regularization strength, as in the usual `C` convention.
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    #[serde(default)]
    fitted: Option<LogisticFit>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 500,
            learning_rate: 0.1,
            fitted: None,
        }
    }
}

impl LogisticRegression {
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        if x.nrows() != y.len() {
            return Err(MlError::Shape(format!(
                "{} samples but {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if self.c <= 0.0 {
            return Err(MlError::InvalidParams(format!(
                "logistic regression c must be positive, got {}",
                self.c
            )));
        }

        let mut classes: Vec<f64> = y.iter().copied().collect();
        classes.sort_by(|a, b| a.partial_cmp(b).expect("class ids are finite"));
        classes.dedup();
        if classes.len() < 2 {
            return Err(MlError::InvalidParams(
                "logistic regression needs at least two classes".to_string(),
            ));
        }

        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();
        let penalty = 1.0 / self.c;
        let mut weights = Array2::zeros((classes.len(), n_features));
        let mut intercepts = Array1::zeros(classes.len());

        for (ci, &class) in classes.iter().enumerate() {
            let targets: Array1<f64> = y.mapv(|v| if v == class { 1.0 } else { 0.0 });
            let mut w: Array1<f64> = Array1::zeros(n_features);
            let mut b = 0.0;

            for _ in 0..self.max_iter {
                let scores = x.dot(&w) + b;
                let probs = scores.mapv(sigmoid);
                let residual = &probs - &targets;

                let grad_w = (x.t().dot(&residual) + &w * penalty) / n_samples;
                let grad_b = residual.sum() / n_samples;
                w = &w - &(grad_w * self.learning_rate);
                b -= grad_b * self.learning_rate;
            }

            weights.row_mut(ci).assign(&w);
            intercepts[ci] = b;
        }

        self.fitted = Some(LogisticFit {
            classes,
            weights,
            intercepts,
        });
        Ok(())
    }

    pub fn classes(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.classes.as_slice())
    }

    /// Per-class probabilities, columns ordered like [`Self::classes`].
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or(MlError::NotFitted("logistic_regression"))?;

        let mut scores = x.dot(&fit.weights.t());
        for mut row in scores.axis_iter_mut(Axis(0)) {
            row.zip_mut_with(&fit.intercepts, |s, b| *s = sigmoid(*s + b));
            let total: f64 = row.sum();
            if total > 0.0 {
                row.mapv_inplace(|p| p / total);
            }
        }
        Ok(scores)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or(MlError::NotFitted("logistic_regression"))?;
        let probs = self.predict_proba(x)?;
        Ok(probs
            .axis_iter(Axis(0))
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                fit.classes[best]
            })
            .collect())
    }
}
