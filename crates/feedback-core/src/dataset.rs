//! Tabular training data and feature preprocessing.
//!
//! A [`Table`] is the row-oriented shape feedback arrives in. Splitting off
//! the target column yields a numeric [`Dataset`]; the [`DataProcessor`]
//! standardizes its features and returns the [`FeatureScaler`] that must be
//! reused at prediction time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::error::UpdateError;

/// Scales below this are treated as a constant column.
const MIN_SCALE: f64 = 1e-12;

/// Row-oriented records keyed by column name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Map<String, Value>>,
}

impl Table {
    pub fn new(rows: Vec<Map<String, Value>>) -> Self {
        Self { rows }
    }

    /// Parse a JSON array of objects.
    pub fn from_value(value: &Value) -> Result<Self, UpdateError> {
        let items = value.as_array().ok_or_else(|| {
            UpdateError::MalformedData("expected an array of row objects".to_string())
        })?;
        let mut rows = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::Object(map) => rows.push(map.clone()),
                other => {
                    return Err(UpdateError::MalformedData(format!(
                        "row {i} is not an object: {other}"
                    )))
                }
            }
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    /// Column names of the first row, in sorted order.
    pub fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| {
                let mut cols: Vec<String> = row.keys().cloned().collect();
                cols.sort();
                cols
            })
            .unwrap_or_default()
    }

    /// Separate `target` from the feature columns and convert to numbers.
    ///
    /// Every row must carry the same column set and every cell must be
    /// numeric. Feature columns are ordered by name.
    pub fn split_target(&self, target: &str) -> Result<Dataset, UpdateError> {
        if self.rows.is_empty() {
            return Err(UpdateError::InsufficientData("dataset is empty".to_string()));
        }

        let columns = self.columns();
        if !columns.iter().any(|c| c == target) {
            return Err(UpdateError::MissingTarget(target.to_string()));
        }
        let feature_names: Vec<String> = columns.iter().filter(|c| *c != target).cloned().collect();
        if feature_names.is_empty() {
            return Err(UpdateError::MalformedData(
                "no feature columns besides the target".to_string(),
            ));
        }

        let mut features = Vec::with_capacity(self.rows.len());
        let mut targets = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            if row.len() != columns.len() || !columns.iter().all(|c| row.contains_key(c)) {
                return Err(UpdateError::MalformedData(format!(
                    "row {i} does not match columns [{}]",
                    columns.join(", ")
                )));
            }
            let mut x = Vec::with_capacity(feature_names.len());
            for name in &feature_names {
                x.push(numeric_cell(row, name, i)?);
            }
            features.push(x);
            targets.push(numeric_cell(row, target, i)?);
        }

        Ok(Dataset {
            feature_names,
            features,
            target: targets,
        })
    }
}

fn numeric_cell(row: &Map<String, Value>, column: &str, index: usize) -> Result<f64, UpdateError> {
    row.get(column)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            UpdateError::MalformedData(format!("row {index} column '{column}' is not numeric"))
        })
}

/// Numeric features and target, ready for fitting.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Vec<Vec<f64>>,
    pub target: Vec<f64>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

/// Per-feature z-score parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl FeatureScaler {
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (mean, scale))| (x - mean) / scale)
            .collect()
    }
}

/// Feature preprocessing applied before every fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataProcessor;

impl DataProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Standardize each feature column to zero mean and unit variance.
    ///
    /// Constant columns keep a scale of 1 and become all zeros.
    pub fn preprocess(&self, dataset: &Dataset) -> (FeatureScaler, Vec<Vec<f64>>) {
        let width = dataset.feature_names.len();
        let n = dataset.features.len().max(1) as f64;

        let mut means = vec![0.0; width];
        for row in &dataset.features {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x / n;
            }
        }

        let mut scales = vec![0.0; width];
        for row in &dataset.features {
            for ((s, x), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (x - m).powi(2) / n;
            }
        }
        for s in scales.iter_mut() {
            *s = s.sqrt();
            if *s < MIN_SCALE {
                *s = 1.0;
            }
        }

        let scaler = FeatureScaler { means, scales };
        let transformed = dataset
            .features
            .iter()
            .map(|row| scaler.transform(row))
            .collect();
        (scaler, transformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(value: Value) -> Table {
        Table::from_value(&value).unwrap()
    }

    #[test]
    fn test_split_target_orders_features() {
        let t = table(json!([
            {"volume": 10, "price": 1.5, "y": 3},
            {"volume": 20, "price": 2.5, "y": 5}
        ]));
        let ds = t.split_target("y").unwrap();
        assert_eq!(ds.feature_names, vec!["price", "volume"]);
        assert_eq!(ds.features[1], vec![2.5, 20.0]);
        assert_eq!(ds.target, vec![3.0, 5.0]);
    }

    #[test]
    fn test_empty_table_is_insufficient() {
        let err = Table::default().split_target("y").unwrap_err();
        assert!(matches!(err, UpdateError::InsufficientData(_)));
    }

    #[test]
    fn test_missing_target() {
        let t = table(json!([{"x": 1, "z": 2}]));
        let err = t.split_target("y").unwrap_err();
        assert!(matches!(err, UpdateError::MissingTarget(ref c) if c == "y"));
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let t = table(json!([{"x": 1, "y": 2}, {"x": 1}]));
        assert!(matches!(
            t.split_target("y").unwrap_err(),
            UpdateError::MalformedData(_)
        ));
    }

    #[test]
    fn test_non_numeric_cell_rejected() {
        let t = table(json!([{"x": "one", "y": 2}]));
        assert!(matches!(
            t.split_target("y").unwrap_err(),
            UpdateError::MalformedData(_)
        ));
    }

    #[test]
    fn test_from_value_rejects_non_array() {
        assert!(Table::from_value(&json!({"x": 1})).is_err());
        assert!(Table::from_value(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_preprocess_standardizes() {
        let ds = Dataset {
            feature_names: vec!["a".into(), "b".into()],
            features: vec![vec![1.0, 5.0], vec![3.0, 5.0]],
            target: vec![0.0, 1.0],
        };
        let (scaler, x) = DataProcessor::new().preprocess(&ds);
        assert_eq!(scaler.means, vec![2.0, 5.0]);
        assert_eq!(scaler.scales, vec![1.0, 1.0]);
        assert_eq!(x, vec![vec![-1.0, 0.0], vec![1.0, 0.0]]);
    }
}
