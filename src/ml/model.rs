// SPDX-License-Identifier: MIT

//! The unified model type.
//!
//! [`Model`] is a closed enum over every supported algorithm, so a fitted
//! model is an ordinary serializable value that can be queried for its
//! capabilities (task, probability output) without downcasting. New
//! algorithms register here and in [`Model::build`].

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ml::forest::RandomForest;
use crate::ml::knn::Knn;
use crate::ml::linear::{LinearRegression, LogisticRegression, Ridge};
use crate::ml::naive_bayes::GaussianNb;
use crate::ml::tree::DecisionTree;
use crate::ml::{MlError, Task};

/// Lowercases and canonicalizes an algorithm name ("Random Forest" and
/// "random-forest" both become "random_forest").
pub fn normalize_algorithm(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum Model {
    LinearRegression(LinearRegression),
    Ridge(Ridge),
    LogisticRegression(LogisticRegression),
    Knn(Knn),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
    GaussianNb(GaussianNb),
    VotingEnsemble(VotingEnsemble),
}

impl Model {
    /// Constructs an unfitted model for the given task from JSON parameters.
    ///
    /// Unknown algorithms and task mismatches are hard errors; a pipeline
    /// that asks for ridge classification fails validation here rather than
    /// silently training something else.
    pub fn build(task: Task, algorithm: &str, params: &Map<String, Value>) -> Result<Model, MlError> {
        let key = normalize_algorithm(algorithm);
        let value = Value::Object(params.clone());
        let invalid = |e: serde_json::Error| MlError::InvalidParams(e.to_string());

        let model = match key.as_str() {
            "linear_regression" => {
                require_task(&key, task, Task::Regression)?;
                Model::LinearRegression(serde_json::from_value(value).map_err(invalid)?)
            }
            "ridge" => {
                require_task(&key, task, Task::Regression)?;
                Model::Ridge(serde_json::from_value(value).map_err(invalid)?)
            }
            "logistic_regression" => {
                require_task(&key, task, Task::Classification)?;
                Model::LogisticRegression(serde_json::from_value(value).map_err(invalid)?)
            }
            "knn" | "k_nearest_neighbors" => {
                let mut knn: Knn = serde_json::from_value(value).map_err(invalid)?;
                knn.task = task;
                Model::Knn(knn)
            }
            "decision_tree" => {
                let mut tree: DecisionTree = serde_json::from_value(value).map_err(invalid)?;
                tree.task = task;
                Model::DecisionTree(tree)
            }
            "random_forest" => {
                let mut forest: RandomForest = serde_json::from_value(value).map_err(invalid)?;
                forest.task = task;
                Model::RandomForest(forest)
            }
            "gaussian_nb" | "naive_bayes" => {
                require_task(&key, task, Task::Classification)?;
                Model::GaussianNb(serde_json::from_value(value).map_err(invalid)?)
            }
            "voting_ensemble" | "voting" => {
                Model::VotingEnsemble(VotingEnsemble::from_params(task, params)?)
            }
            _ => return Err(MlError::UnknownAlgorithm(algorithm.to_string())),
        };
        Ok(model)
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Model::LinearRegression(_) => "linear_regression",
            Model::Ridge(_) => "ridge",
            Model::LogisticRegression(_) => "logistic_regression",
            Model::Knn(_) => "knn",
            Model::DecisionTree(_) => "decision_tree",
            Model::RandomForest(_) => "random_forest",
            Model::GaussianNb(_) => "gaussian_nb",
            Model::VotingEnsemble(_) => "voting_ensemble",
        }
    }

    pub fn task(&self) -> Task {
        match self {
            Model::LinearRegression(_) | Model::Ridge(_) => Task::Regression,
            Model::LogisticRegression(_) | Model::GaussianNb(_) => Task::Classification,
            Model::Knn(m) => m.task,
            Model::DecisionTree(m) => m.task,
            Model::RandomForest(m) => m.task,
            Model::VotingEnsemble(m) => m.task,
        }
    }

    /// Whether `predict_proba` works on this (fitted) model.
    pub fn supports_probability_output(&self) -> bool {
        match self {
            Model::LogisticRegression(_) | Model::GaussianNb(_) => true,
            Model::Knn(m) => m.task == Task::Classification,
            Model::RandomForest(m) => m.task == Task::Classification,
            Model::VotingEnsemble(m) => {
                m.task == Task::Classification
                    && m.members.iter().all(Model::supports_probability_output)
            }
            Model::LinearRegression(_) | Model::Ridge(_) | Model::DecisionTree(_) => false,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        match self {
            Model::LinearRegression(m) => m.fit(x, y),
            Model::Ridge(m) => m.fit(x, y),
            Model::LogisticRegression(m) => m.fit(x, y),
            Model::Knn(m) => m.fit(x, y),
            Model::DecisionTree(m) => m.fit(x, y),
            Model::RandomForest(m) => m.fit(x, y),
            Model::GaussianNb(m) => m.fit(x, y),
            Model::VotingEnsemble(m) => m.fit(x, y),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        match self {
            Model::LinearRegression(m) => m.predict(x),
            Model::Ridge(m) => m.predict(x),
            Model::LogisticRegression(m) => m.predict(x),
            Model::Knn(m) => m.predict(x),
            Model::DecisionTree(m) => m.predict(x),
            Model::RandomForest(m) => m.predict(x),
            Model::GaussianNb(m) => m.predict(x),
            Model::VotingEnsemble(m) => m.predict(x),
        }
    }

    /// Per-class probabilities for classification models that support them.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        match self {
            Model::LogisticRegression(m) => m.predict_proba(x),
            Model::GaussianNb(m) => m.predict_proba(x),
            Model::Knn(m) => m.predict_proba(x),
            Model::RandomForest(m) => m.predict_proba(x),
            Model::VotingEnsemble(m) => m.predict_proba(x),
            other => Err(MlError::InvalidParams(format!(
                "algorithm '{}' has no probability output",
                other.algorithm()
            ))),
        }
    }

    /// Sorted class ids a fitted classification model predicts over.
    pub fn classes(&self) -> Option<Vec<f64>> {
        match self {
            Model::LogisticRegression(m) => m.classes().map(<[f64]>::to_vec),
            Model::GaussianNb(m) => m.classes().map(<[f64]>::to_vec),
            Model::Knn(m) => (!m.classes().is_empty()).then(|| m.classes().to_vec()),
            Model::RandomForest(m) => (!m.classes().is_empty()).then(|| m.classes().to_vec()),
            Model::VotingEnsemble(m) => (!m.classes.is_empty()).then(|| m.classes.clone()),
            _ => None,
        }
    }
}

fn require_task(algorithm: &str, requested: Task, supported: Task) -> Result<(), MlError> {
    if requested == supported {
        Ok(())
    } else {
        Err(MlError::TaskMismatch {
            algorithm: algorithm.to_string(),
            task: requested,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voting {
    #[default]
    Hard,
    Soft,
}

/// Combines several fitted members into one model.
///
/// Classification votes (hard) or averages probabilities (soft); regression
/// averages predictions. Soft voting silently degrades to hard voting when a
/// member cannot produce probabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VotingEnsemble {
    pub voting: Voting,
    pub task: Task,
    members: Vec<Model>,
    classes: Vec<f64>,
}

impl VotingEnsemble {
    /// Builds an ensemble from block parameters. `models` may list algorithm
    /// names or `{algorithm, params}` objects; when absent a default roster
    /// for the task is used.
    pub fn from_params(task: Task, params: &Map<String, Value>) -> Result<Self, MlError> {
        let voting = match params.get("voting") {
            Some(v) => serde_json::from_value(v.clone())
                .map_err(|e| MlError::InvalidParams(format!("voting: {e}")))?,
            None => Voting::Hard,
        };

        let specs: Vec<Value> = match params.get("models") {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => {
                return Err(MlError::InvalidParams(format!(
                    "models must be an array, got {other}"
                )))
            }
            None => default_roster(task),
        };
        if specs.is_empty() {
            return Err(MlError::InvalidParams(
                "voting ensemble needs at least one member".to_string(),
            ));
        }

        let members = specs
            .iter()
            .map(|spec| member_from_spec(task, spec))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            voting,
            task,
            members,
            classes: Vec::new(),
        })
    }

    pub fn members(&self) -> &[Model] {
        &self.members
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), MlError> {
        if self.task == Task::Classification {
            let mut classes: Vec<f64> = y.iter().copied().collect();
            classes.sort_by(|a, b| a.partial_cmp(b).expect("class ids are finite"));
            classes.dedup();
            self.classes = classes;
        }
        for member in &mut self.members {
            member.fit(x, y)?;
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        if self.members.is_empty() {
            return Err(MlError::NotFitted("voting_ensemble"));
        }
        match self.task {
            Task::Regression => {
                let mut acc = Array1::zeros(x.nrows());
                for member in &self.members {
                    acc = acc + member.predict(x)?;
                }
                Ok(acc / self.members.len() as f64)
            }
            Task::Classification => {
                let soft = self.voting == Voting::Soft
                    && self.members.iter().all(Model::supports_probability_output);
                if soft {
                    let proba = self.predict_proba(x)?;
                    return Ok(proba
                        .axis_iter(Axis(0))
                        .map(|row| self.classes[argmax(&row.to_vec())])
                        .collect());
                }
                self.hard_vote(x)
            }
        }
    }

    fn hard_vote(&self, x: &Array2<f64>) -> Result<Array1<f64>, MlError> {
        let predictions: Vec<Array1<f64>> = self
            .members
            .iter()
            .map(|m| m.predict(x))
            .collect::<Result<_, _>>()?;

        Ok((0..x.nrows())
            .map(|i| {
                let mut votes: Vec<(f64, usize)> = Vec::new();
                for pred in &predictions {
                    match votes.iter_mut().find(|(c, _)| *c == pred[i]) {
                        Some((_, n)) => *n += 1,
                        None => votes.push((pred[i], 1)),
                    }
                }
                votes
                    .iter()
                    .max_by_key(|(_, n)| *n)
                    .map(|(c, _)| *c)
                    .unwrap_or(f64::NAN)
            })
            .collect())
    }

    /// Mean member probability per class. Requires every member to support
    /// probability output.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        if self.task != Task::Classification {
            return Err(MlError::InvalidParams(
                "probability output requires a classification ensemble".to_string(),
            ));
        }
        if self.classes.is_empty() {
            return Err(MlError::NotFitted("voting_ensemble"));
        }

        let mut acc = Array2::zeros((x.nrows(), self.classes.len()));
        for member in &self.members {
            let proba = member.predict_proba(x)?;
            // Member class columns line up with ours: both come from the
            // same sorted-unique pass over the training targets.
            acc = acc + proba;
        }
        Ok(acc / self.members.len() as f64)
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn default_roster(task: Task) -> Vec<Value> {
    let names: &[&str] = match task {
        Task::Classification => &["logistic_regression", "random_forest", "gaussian_nb"],
        Task::Regression => &["linear_regression", "ridge", "random_forest"],
    };
    names.iter().map(|n| Value::String(n.to_string())).collect()
}

fn member_from_spec(task: Task, spec: &Value) -> Result<Model, MlError> {
    match spec {
        Value::String(name) => Model::build(task, name, &Map::new()),
        Value::Object(obj) => {
            let algorithm = obj
                .get("algorithm")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    MlError::InvalidParams(
                        "ensemble member object needs an 'algorithm' field".to_string(),
                    )
                })?;
            let params = match obj.get("params") {
                Some(Value::Object(p)) => p.clone(),
                None => Map::new(),
                Some(other) => {
                    return Err(MlError::InvalidParams(format!(
                        "member params must be an object, got {other}"
                    )))
                }
            };
            Model::build(task, algorithm, &params)
        }
        other => Err(MlError::InvalidParams(format!(
            "ensemble member must be a name or object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params(json: &str) -> Map<String, Value> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_unknown_algorithm_is_a_hard_error() {
        let err = Model::build(Task::Classification, "quantum_svm", &Map::new()).unwrap_err();
        assert!(matches!(err, MlError::UnknownAlgorithm(name) if name == "quantum_svm"));
    }

    #[test]
    fn test_task_mismatch_is_a_hard_error() {
        let err = Model::build(Task::Classification, "ridge", &Map::new()).unwrap_err();
        assert!(matches!(err, MlError::TaskMismatch { .. }));
    }

    #[test]
    fn test_algorithm_names_are_normalized() {
        let model = Model::build(Task::Classification, "Random Forest", &Map::new()).unwrap();
        assert_eq!(model.algorithm(), "random_forest");
    }

    #[test]
    fn test_params_flow_into_the_model() {
        let model = Model::build(
            Task::Classification,
            "knn",
            &params(r#"{"n_neighbors": 3, "weights": "distance"}"#),
        )
        .unwrap();
        match model {
            Model::Knn(knn) => assert_eq!(knn.n_neighbors, 3),
            other => panic!("expected knn, got {}", other.algorithm()),
        }
    }

    #[test]
    fn test_capability_queries() {
        let logistic = Model::build(Task::Classification, "logistic_regression", &Map::new())
            .unwrap();
        assert!(logistic.supports_probability_output());

        let tree = Model::build(Task::Classification, "decision_tree", &Map::new()).unwrap();
        assert!(!tree.supports_probability_output());
    }

    fn toy_classification() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [0.0, 0.1],
            [0.1, 0.0],
            [0.2, 0.1],
            [0.1, 0.2],
            [5.0, 5.1],
            [5.1, 5.0],
            [4.9, 5.2],
            [5.2, 4.9]
        ];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_hard_voting_majority() {
        let (x, y) = toy_classification();
        let mut ensemble = Model::build(Task::Classification, "voting_ensemble", &Map::new())
            .unwrap();
        ensemble.fit(&x, &y).unwrap();

        let pred = ensemble.predict(&array![[0.0, 0.0], [5.0, 5.0]]).unwrap();
        assert_eq!(pred, array![0.0, 1.0]);
    }

    #[test]
    fn test_soft_voting_with_probability_members() {
        let (x, y) = toy_classification();
        let mut ensemble = Model::build(
            Task::Classification,
            "voting_ensemble",
            &params(r#"{"voting": "soft", "models": ["logistic_regression", "gaussian_nb"]}"#),
        )
        .unwrap();
        ensemble.fit(&x, &y).unwrap();

        let proba = ensemble.predict_proba(&array![[5.0, 5.0]]).unwrap();
        assert!(proba[[0, 1]] > proba[[0, 0]]);
    }

    #[test]
    fn test_soft_voting_falls_back_when_member_lacks_probabilities() {
        let (x, y) = toy_classification();
        // decision_tree has no probability output.
        let mut ensemble = Model::build(
            Task::Classification,
            "voting_ensemble",
            &params(r#"{"voting": "soft", "models": ["logistic_regression", "decision_tree"]}"#),
        )
        .unwrap();
        ensemble.fit(&x, &y).unwrap();

        let pred = ensemble.predict(&array![[0.0, 0.0]]).unwrap();
        assert_eq!(pred[0], 0.0);
    }

    #[test]
    fn test_regression_ensemble_averages() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let mut ensemble = Model::build(
            Task::Regression,
            "voting_ensemble",
            &params(r#"{"models": ["linear_regression", "ridge"]}"#),
        )
        .unwrap();
        ensemble.fit(&x, &y).unwrap();

        let pred = ensemble.predict(&array![[2.0]]).unwrap();
        assert!((pred[0] - 5.0).abs() < 1.0);
    }

    #[test]
    fn test_fitted_model_round_trips_through_json() {
        let (x, y) = toy_classification();
        let mut model = Model::build(Task::Classification, "gaussian_nb", &Map::new()).unwrap();
        model.fit(&x, &y).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: Model = serde_json::from_str(&json).unwrap();
        assert_eq!(
            restored.predict(&array![[0.0, 0.0]]).unwrap(),
            model.predict(&array![[0.0, 0.0]]).unwrap()
        );
    }
}
