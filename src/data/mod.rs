// SPDX-License-Identifier: MIT

//! Tabular data support for the built-in data blocks.
//!
//! A [`DataFrame`] is a list of equally sized named columns, each either
//! numeric (`f64`, with `NaN` marking missing values) or categorical
//! (`Option<String>`, with `None` marking missing values). CSV loading
//! sniffs the type of each column: a column is numeric when every non-empty
//! cell parses as a float, otherwise categorical.

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("column '{0}' not found")]
    ColumnNotFound(String),

    #[error("column '{0}' is not numeric")]
    NonNumeric(String),

    #[error("{0}")]
    Shape(String),
}

/// A single column of data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    pub fn missing_count(&self) -> usize {
        match self {
            Column::Numeric(v) => v.iter().filter(|x| x.is_nan()).count(),
            Column::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Mean of the non-missing values; `NaN` when all values are missing.
    pub fn mean(&self) -> Option<f64> {
        match self {
            Column::Numeric(v) => {
                let clean: Vec<f64> = v.iter().copied().filter(|x| !x.is_nan()).collect();
                if clean.is_empty() {
                    Some(f64::NAN)
                } else {
                    Some(clean.iter().sum::<f64>() / clean.len() as f64)
                }
            }
            Column::Categorical(_) => None,
        }
    }

    /// Median of the non-missing values; `NaN` when all values are missing.
    pub fn median(&self) -> Option<f64> {
        match self {
            Column::Numeric(v) => {
                let mut clean: Vec<f64> = v.iter().copied().filter(|x| !x.is_nan()).collect();
                if clean.is_empty() {
                    return Some(f64::NAN);
                }
                clean.sort_by(|a, b| a.partial_cmp(b).expect("no NaN after filter"));
                let mid = clean.len() / 2;
                Some(if clean.len() % 2 == 0 {
                    (clean[mid - 1] + clean[mid]) / 2.0
                } else {
                    clean[mid]
                })
            }
            Column::Categorical(_) => None,
        }
    }

    /// Most frequent non-missing value, rendered as a string for categorical
    /// columns. Ties are broken by first occurrence.
    pub fn mode(&self) -> Option<String> {
        match self {
            Column::Numeric(v) => {
                let mut counts: Vec<(f64, usize)> = Vec::new();
                for &x in v.iter().filter(|x| !x.is_nan()) {
                    match counts.iter_mut().find(|(val, _)| *val == x) {
                        Some((_, c)) => *c += 1,
                        None => counts.push((x, 1)),
                    }
                }
                counts
                    .iter()
                    .max_by_key(|(_, c)| *c)
                    .map(|(val, _)| val.to_string())
            }
            Column::Categorical(v) => {
                let mut counts: Vec<(&str, usize)> = Vec::new();
                for x in v.iter().flatten() {
                    match counts.iter_mut().find(|(val, _)| *val == x.as_str()) {
                        Some((_, c)) => *c += 1,
                        None => counts.push((x, 1)),
                    }
                }
                counts
                    .iter()
                    .max_by_key(|(_, c)| *c)
                    .map(|(val, _)| val.to_string())
            }
        }
    }

    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(indices.iter().map(|&i| v[i]).collect()),
            Column::Categorical(v) => {
                Column::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// A named column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub data: Column,
}

impl Series {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            data: Column::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: Column::Categorical(values),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An in-memory table with named, typed columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DataFrame {
    columns: Vec<Series>,
}

impl DataFrame {
    pub fn new(columns: Vec<Series>) -> Result<Self, DataError> {
        if let Some(first) = columns.first() {
            let n = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != n) {
                return Err(DataError::Shape(format!(
                    "column '{}' has {} rows, expected {}",
                    bad.name,
                    bad.len(),
                    n
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Loads a CSV file, sniffing each column as numeric or categorical.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            for (i, field) in record.iter().enumerate() {
                if i < cells.len() {
                    cells[i].push(field.trim().to_string());
                }
            }
        }

        let columns = headers
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Series {
                name,
                data: sniff_column(values),
            })
            .collect();
        Ok(Self { columns })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Series::len)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Series] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Series> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Series> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn numeric_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.data.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn categorical_column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !c.data.is_numeric())
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn missing_count(&self) -> usize {
        self.columns.iter().map(|c| c.data.missing_count()).sum()
    }

    /// Returns a copy without the named column.
    pub fn drop_column(&self, name: &str) -> DataFrame {
        DataFrame {
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
        }
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Series> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx))
    }

    /// Selects rows by index, in the given order.
    pub fn take_rows(&self, indices: &[usize]) -> DataFrame {
        DataFrame {
            columns: self
                .columns
                .iter()
                .map(|c| Series {
                    name: c.name.clone(),
                    data: c.data.take(indices),
                })
                .collect(),
        }
    }

    /// Restricts the frame to the named columns, in the given order.
    pub fn select_columns(&self, names: &[String]) -> Result<DataFrame, DataError> {
        let columns = names
            .iter()
            .map(|n| {
                self.column(n)
                    .cloned()
                    .ok_or_else(|| DataError::ColumnNotFound(n.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DataFrame { columns })
    }

    /// Converts an all-numeric frame into a dense matrix. Missing values
    /// survive as `NaN`; a categorical column is an error.
    pub fn to_matrix(&self) -> Result<Array2<f64>, DataError> {
        let n_rows = self.n_rows();
        let mut out = Array2::zeros((n_rows, self.columns.len()));
        for (j, series) in self.columns.iter().enumerate() {
            match &series.data {
                Column::Numeric(v) => {
                    for (i, &x) in v.iter().enumerate() {
                        out[[i, j]] = x;
                    }
                }
                Column::Categorical(_) => {
                    return Err(DataError::NonNumeric(series.name.clone()));
                }
            }
        }
        Ok(out)
    }

    /// Vertically concatenates frames over their common columns.
    pub fn concat(frames: &[&DataFrame]) -> Result<DataFrame, DataError> {
        let first = frames
            .first()
            .ok_or_else(|| DataError::Shape("nothing to concatenate".into()))?;

        let mut common: Vec<String> = first.column_names();
        for frame in &frames[1..] {
            common.retain(|name| frame.column(name).is_some());
        }
        if common.is_empty() {
            return Err(DataError::Shape(
                "frames share no common columns".to_string(),
            ));
        }

        let mut columns = Vec::with_capacity(common.len());
        for name in &common {
            let numeric = frames.iter().all(|f| {
                f.column(name)
                    .map(|c| c.data.is_numeric())
                    .unwrap_or(false)
            });
            let data = if numeric {
                let mut values = Vec::new();
                for frame in frames {
                    if let Column::Numeric(v) = &frame.column(name).expect("common column").data {
                        values.extend_from_slice(v);
                    }
                }
                Column::Numeric(values)
            } else {
                // Mixed-typed columns degrade to categorical.
                let mut values = Vec::new();
                for frame in frames {
                    match &frame.column(name).expect("common column").data {
                        Column::Categorical(v) => values.extend(v.iter().cloned()),
                        Column::Numeric(v) => values.extend(
                            v.iter()
                                .map(|x| if x.is_nan() { None } else { Some(x.to_string()) }),
                        ),
                    }
                }
                Column::Categorical(values)
            };
            columns.push(Series {
                name: name.clone(),
                data,
            });
        }
        Ok(DataFrame { columns })
    }
}

fn sniff_column(values: Vec<String>) -> Column {
    let numeric = values
        .iter()
        .filter(|v| !v.is_empty())
        .all(|v| v.parse::<f64>().is_ok());
    let has_data = values.iter().any(|v| !v.is_empty());

    if numeric && has_data {
        Column::Numeric(
            values
                .into_iter()
                .map(|v| v.parse::<f64>().unwrap_or(f64::NAN))
                .collect(),
        )
    } else {
        Column::Categorical(
            values
                .into_iter()
                .map(|v| if v.is_empty() { None } else { Some(v) })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_csv_type_sniffing() {
        let file = write_csv("age,city,score\n34,Oslo,1.5\n28,Bergen,2.0\n41,Oslo,0.5\n");
        let df = DataFrame::from_csv(file.path()).unwrap();

        assert_eq!(df.n_rows(), 3);
        assert_eq!(df.numeric_column_names(), vec!["age", "score"]);
        assert_eq!(df.categorical_column_names(), vec!["city"]);
    }

    #[test]
    fn test_csv_empty_cells_become_missing() {
        let file = write_csv("a,b\n1,x\n,y\n3,\n");
        let df = DataFrame::from_csv(file.path()).unwrap();

        assert_eq!(df.missing_count(), 2);
        match &df.column("a").unwrap().data {
            Column::Numeric(v) => assert!(v[1].is_nan()),
            _ => panic!("column 'a' should be numeric"),
        }
    }

    #[test]
    fn test_median_ignores_missing() {
        let col = Column::Numeric(vec![1.0, f64::NAN, 3.0, 2.0]);
        assert_eq!(col.median(), Some(2.0));
    }

    #[test]
    fn test_mode_picks_most_frequent() {
        let col = Column::Categorical(vec![
            Some("red".into()),
            Some("blue".into()),
            Some("red".into()),
            None,
        ]);
        assert_eq!(col.mode(), Some("red".to_string()));
    }

    #[test]
    fn test_to_matrix_rejects_categorical() {
        let df = DataFrame::new(vec![
            Series::numeric("a", vec![1.0, 2.0]),
            Series::categorical("b", vec![Some("x".into()), Some("y".into())]),
        ])
        .unwrap();
        assert!(matches!(df.to_matrix(), Err(DataError::NonNumeric(name)) if name == "b"));
    }

    #[test]
    fn test_take_rows_preserves_order() {
        let df = DataFrame::new(vec![Series::numeric("a", vec![10.0, 20.0, 30.0])]).unwrap();
        let picked = df.take_rows(&[2, 0]);
        assert_eq!(
            picked.column("a").unwrap().data,
            Column::Numeric(vec![30.0, 10.0])
        );
    }

    #[test]
    fn test_concat_intersects_columns() {
        let left = DataFrame::new(vec![
            Series::numeric("a", vec![1.0]),
            Series::numeric("only_left", vec![9.0]),
        ])
        .unwrap();
        let right = DataFrame::new(vec![Series::numeric("a", vec![2.0])]).unwrap();

        let merged = DataFrame::concat(&[&left, &right]).unwrap();
        assert_eq!(merged.n_rows(), 2);
        assert_eq!(merged.column_names(), vec!["a"]);
    }

    #[test]
    fn test_new_rejects_ragged_columns() {
        let result = DataFrame::new(vec![
            Series::numeric("a", vec![1.0, 2.0]),
            Series::numeric("b", vec![1.0]),
        ]);
        assert!(result.is_err());
    }
}
