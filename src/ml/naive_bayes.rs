// SPDX-License-Identifier: MIT

//! Gaussian naive Bayes classifier.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::ml::MlError;

fn default_var_smoothing() -> f64 {
    1e-9
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct NbFit {
    classes: Vec<f64>,
    priors: Vec<f64>,
    // Per class, per feature.
    means: Array2<f64>,
    variances: Array2<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GaussianNb {
    #[serde(default = "default_var_smoothing")]
    pub var_smoothing: f64,
    fitted: Option<NbFit>,
}

impl Default for GaussianNb {
    fn default() -> Self {
        Self {
            var_smoothing: default_var_smoothing(),
            fitted: None,
        }
    }
}

impl GaussianNb {
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

        let mut classes: Vec<f64> = y.iter().copied().collect();
        classes.sort_by(|a, b| a.partial_cmp(b).expect("class ids are finite"));
        classes.dedup();

        let n_features = x.ncols();
        let mut means = Array2::zeros((classes.len(), n_features));
        let mut variances = Array2::zeros((classes.len(), n_features));
        let mut priors = Vec::with_capacity(classes.len());

        // Smoothing floor proportional to the largest feature variance.
        let global_var = x
            .axis_iter(Axis(1))
            .map(|col| variance_of(&col.to_vec()))
            .fold(0.0_f64, f64::max);
        let floor = self.var_smoothing * global_var.max(1.0);

        for (ci, &class) in classes.iter().enumerate() {
            let rows: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, &v)| v == class)
                .map(|(i, _)| i)
                .collect();
            priors.push(rows.len() as f64 / x.nrows() as f64);

            for j in 0..n_features {
                let values: Vec<f64> = rows.iter().map(|&i| x[[i, j]]).collect();
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                means[[ci, j]] = mean;
                variances[[ci, j]] = variance_of(&values).max(floor);
            }
        }

        self.fitted = Some(NbFit {
            classes,
            priors,
            means,
            variances,
        });
        Ok(())
    }

    pub fn classes(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.classes.as_slice())
    }

    /// Normalized class posteriors, columns ordered like [`Self::classes`].
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or(MlError::NotFitted("gaussian_nb"))?;

        let mut out = Array2::zeros((x.nrows(), fit.classes.len()));
        for (ri, row) in x.axis_iter(Axis(0)).enumerate() {
            let mut log_posteriors = Vec::with_capacity(fit.classes.len());
            for ci in 0..fit.classes.len() {
                let mut lp = fit.priors[ci].ln();
                for (j, &value) in row.iter().enumerate() {
                    let mean = fit.means[[ci, j]];
                    let var = fit.variances[[ci, j]];
                    lp += -0.5 * (2.0 * std::f64::consts::PI * var).ln()
                        - (value - mean).powi(2) / (2.0 * var);
                }
                log_posteriors.push(lp);
            }

            // Log-sum-exp normalization.
            let max_lp = log_posteriors.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let total: f64 = log_posteriors.iter().map(|lp| (lp - max_lp).exp()).sum();
            for (ci, lp) in log_posteriors.iter().enumerate() {
                out[[ri, ci]] = (lp - max_lp).exp() / total;
            }
        }
        Ok(out)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let fit = self
            .fitted
            .as_ref()
            .ok_or(MlError::NotFitted("gaussian_nb"))?;
        let proba = self.predict_proba(x)?;
        Ok(proba
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

fn variance_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}
