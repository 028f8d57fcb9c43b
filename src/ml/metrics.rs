// SPDX-License-Identifier: MIT

//! Evaluation metrics.
//!
//! Classification: accuracy plus support-weighted precision, recall and F1.
//! Regression: MSE, RMSE, MAE and R². Reports come back as ordered maps so
//! they serialize into stable JSON.

use std::collections::BTreeMap;

use ndarray::Array1;

use crate::ml::MlError;

fn check_lengths(actual: &Array1<f64>, predicted: &Array1<f64>) -> Result<(), MlError> {
    if actual.len() != predicted.len() {
        return Err(MlError::Shape(format!(
            "{} actual values but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(MlError::Shape("cannot score zero predictions".to_string()));
    }
    Ok(())
}

pub fn accuracy(actual: &Array1<f64>, predicted: &Array1<f64>) -> Result<f64, MlError> {
    check_lengths(actual, predicted)?;
    let hits = actual.iter().zip(predicted).filter(|(a, p)| a == p).count();
    Ok(hits as f64 / actual.len() as f64)
}

/// Accuracy plus support-weighted precision/recall/F1 over all classes.
pub fn classification_report(
    actual: &Array1<f64>,
    predicted: &Array1<f64>,
) -> Result<BTreeMap<String, f64>, MlError> {
    check_lengths(actual, predicted)?;

    let mut classes: Vec<f64> = actual.iter().chain(predicted.iter()).copied().collect();
    classes.sort_by(|a, b| a.partial_cmp(b).expect("class ids are finite"));
    classes.dedup();

    let n = actual.len() as f64;
    let mut precision_sum = 0.0;
    let mut recall_sum = 0.0;
    let mut f1_sum = 0.0;

    for &class in &classes {
        let tp = actual
            .iter()
            .zip(predicted)
            .filter(|(&a, &p)| a == class && p == class)
            .count() as f64;
        let predicted_pos = predicted.iter().filter(|&&p| p == class).count() as f64;
        let actual_pos = actual.iter().filter(|&&a| a == class).count() as f64;

        let precision = if predicted_pos > 0.0 { tp / predicted_pos } else { 0.0 };
        let recall = if actual_pos > 0.0 { tp / actual_pos } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let weight = actual_pos / n;
        precision_sum += precision * weight;
        recall_sum += recall * weight;
        f1_sum += f1 * weight;
    }

    let mut report = BTreeMap::new();
    report.insert("accuracy".to_string(), accuracy(actual, predicted)?);
    report.insert("precision".to_string(), precision_sum);
    report.insert("recall".to_string(), recall_sum);
    report.insert("f1".to_string(), f1_sum);
    Ok(report)
}

/// MSE, RMSE, MAE and R².
pub fn regression_report(
    actual: &Array1<f64>,
    predicted: &Array1<f64>,
) -> Result<BTreeMap<String, f64>, MlError> {
    check_lengths(actual, predicted)?;

    let n = actual.len() as f64;
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / n;
    let mae = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n;

    let mean = actual.sum() / n;
    let ss_total: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    let ss_residual: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    // A constant target makes R² undefined; report 0 rather than NaN.
    let r2 = if ss_total > 0.0 {
        1.0 - ss_residual / ss_total
    } else {
        0.0
    };

    let mut report = BTreeMap::new();
    report.insert("mse".to_string(), mse);
    report.insert("rmse".to_string(), mse.sqrt());
    report.insert("mae".to_string(), mae);
    report.insert("r2".to_string(), r2);
    Ok(report)
}
