//! Model-fitting collaborator.
//!
//! The loop only depends on [`ModelFitter`]: given preprocessed features and a
//! target series, produce a model plus its held-out score. The shipped
//! [`LinearRegressionFitter`] does ordinary least squares with an intercept
//! and scores with R² on a deterministic test split.

use async_trait::async_trait;
use nalgebra::{DMatrix, DVector, SVD};
use serde::{Deserialize, Serialize};

use crate::domain::error::{FitError, UpdateError};

/// Singular values at or below this fraction of the largest one count as
/// zero when ranking the normal matrix.
const RANK_TOLERANCE: f64 = 1e-9;

/// A fitted linear model over standardized features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearModel {
    pub fn predict(&self, x: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x)
                .map(|(w, v)| w * v)
                .sum::<f64>()
    }
}

/// What a fitter hands back: the model and its held-out score.
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub model: LinearModel,
    pub score: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// External model-fitting interface: `fit(X, y) -> (model, score)`.
#[async_trait]
pub trait ModelFitter: Send + Sync {
    async fn fit(&self, features: &[Vec<f64>], target: &[f64]) -> Result<FitOutcome, UpdateError>;
}

/// Ordinary least squares with a deterministic train/test split.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegressionFitter {
    test_fraction: f64,
    ridge: f64,
}

impl Default for LinearRegressionFitter {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            ridge: 0.0,
        }
    }
}

impl LinearRegressionFitter {
    pub fn new(test_fraction: f64) -> Self {
        Self {
            test_fraction,
            ..Self::default()
        }
    }

    /// Add an L2 penalty to the coefficient diagonal (not the intercept).
    pub fn with_ridge(mut self, ridge: f64) -> Self {
        self.ridge = ridge;
        self
    }

    fn test_count(&self, n: usize) -> usize {
        ((n as f64 * self.test_fraction).ceil() as usize).max(2)
    }

    /// Fit synchronously. The async trait method delegates here.
    pub fn fit_blocking(&self, features: &[Vec<f64>], target: &[f64]) -> Result<FitOutcome, UpdateError> {
        let n = features.len();
        if n != target.len() {
            return Err(FitError::DimensionMismatch {
                rows: n,
                targets: target.len(),
            }
            .into());
        }
        let width = features.first().map(Vec::len).unwrap_or(0);
        if features.iter().any(|row| row.len() != width) {
            return Err(UpdateError::MalformedData(
                "feature rows have inconsistent widths".to_string(),
            ));
        }
        if features.iter().flatten().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite("features").into());
        }
        if target.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite("target").into());
        }

        let n_test = self.test_count(n);
        let required = width + 1 + n_test;
        if n < required {
            return Err(FitError::NotEnoughRows {
                required,
                actual: n,
            }
            .into());
        }

        let test_mask = spread_mask(n, n_test);
        let mut train_x = Vec::with_capacity(n - n_test);
        let mut train_y = Vec::with_capacity(n - n_test);
        let mut test_x = Vec::with_capacity(n_test);
        let mut test_y = Vec::with_capacity(n_test);
        for (i, held_out) in test_mask.iter().enumerate() {
            if *held_out {
                test_x.push(features[i].as_slice());
                test_y.push(target[i]);
            } else {
                train_x.push(features[i].as_slice());
                train_y.push(target[i]);
            }
        }

        let model = least_squares(&train_x, &train_y, self.ridge)?;
        let score = r_squared(&model, &test_x, &test_y)?;

        Ok(FitOutcome {
            model,
            score,
            train_rows: train_y.len(),
            test_rows: test_y.len(),
        })
    }
}

#[async_trait]
impl ModelFitter for LinearRegressionFitter {
    async fn fit(&self, features: &[Vec<f64>], target: &[f64]) -> Result<FitOutcome, UpdateError> {
        self.fit_blocking(features, target)
    }
}

/// Spread `k` held-out rows evenly across `n` rows.
fn spread_mask(n: usize, k: usize) -> Vec<bool> {
    (0..n).map(|i| (i + 1) * k / n > i * k / n).collect()
}

/// Solve the normal equations over `[1, x...]` through an SVD of the normal
/// matrix. Rank deficiency is reported as [`FitError::Singular`].
fn least_squares(x: &[&[f64]], y: &[f64], ridge: f64) -> Result<LinearModel, FitError> {
    let width = x.first().map(|r| r.len()).unwrap_or(0);
    let design = DMatrix::from_fn(x.len(), width + 1, |i, j| if j == 0 { 1.0 } else { x[i][j - 1] });
    let targets = DVector::from_column_slice(y);

    let mut normal = design.transpose() * &design;
    for i in 1..=width {
        normal[(i, i)] += ridge;
    }
    let rhs = design.transpose() * targets;

    let svd = SVD::new(normal, true, true);
    let tolerance = RANK_TOLERANCE * svd.singular_values.max();
    if !tolerance.is_finite() {
        return Err(FitError::NonFinite("normal equations"));
    }
    if svd.rank(tolerance) <= width {
        return Err(FitError::Singular);
    }
    let solution = svd.solve(&rhs, tolerance).map_err(|_| FitError::Singular)?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite("solution"));
    }
    Ok(LinearModel {
        intercept: solution[0],
        coefficients: solution.iter().skip(1).copied().collect(),
    })
}

fn r_squared(model: &LinearModel, x: &[&[f64]], y: &[f64]) -> Result<f64, UpdateError> {
    if y.len() < 2 {
        return Err(UpdateError::ScoreUnavailable(
            "fewer than two held-out rows".to_string(),
        ));
    }
    let mean = y.iter().sum::<f64>() / y.len() as f64;
    let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    if ss_tot <= f64::EPSILON {
        return Err(UpdateError::ScoreUnavailable(
            "held-out target has zero variance".to_string(),
        ));
    }
    let ss_res: f64 = x
        .iter()
        .zip(y)
        .map(|(row, v)| (v - model.predict(row)).powi(2))
        .sum();
    let score = 1.0 - ss_res / ss_tot;
    if !score.is_finite() {
        return Err(UpdateError::ScoreUnavailable(format!("score is {score}")));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_rows(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![i as f64, ((i * i) % 7) as f64])
            .collect();
        let y = x.iter().map(|r| 2.0 * r[0] + 3.0 * r[1] + 1.0).collect();
        (x, y)
    }

    #[test]
    fn test_spread_mask_counts() {
        let mask = spread_mask(10, 2);
        assert_eq!(mask.iter().filter(|m| **m).count(), 2);
        let mask = spread_mask(7, 3);
        assert_eq!(mask.iter().filter(|m| **m).count(), 3);
    }

    #[test]
    fn test_recovers_exact_linear_relation() {
        let (x, y) = linear_rows(20);
        let out = LinearRegressionFitter::default().fit_blocking(&x, &y).unwrap();
        assert!((out.model.intercept - 1.0).abs() < 1e-6);
        assert!((out.model.coefficients[0] - 2.0).abs() < 1e-6);
        assert!((out.model.coefficients[1] - 3.0).abs() < 1e-6);
        assert!(out.score > 0.999);
        assert_eq!(out.train_rows + out.test_rows, 20);
        assert_eq!(out.test_rows, 4);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = linear_rows(15);
        let fitter = LinearRegressionFitter::default();
        let a = fitter.fit_blocking(&x, &y).unwrap();
        let b = fitter.fit_blocking(&x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_rows() {
        let (x, y) = linear_rows(4);
        let err = LinearRegressionFitter::default().fit_blocking(&x, &y).unwrap_err();
        assert!(matches!(err, UpdateError::Fit(FitError::NotEnoughRows { .. })));
    }

    #[test]
    fn test_collinear_features_are_singular() {
        let x: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let err = LinearRegressionFitter::default().fit_blocking(&x, &y).unwrap_err();
        assert!(matches!(err, UpdateError::Fit(FitError::Singular)));
    }

    #[test]
    fn test_constant_feature_is_singular() {
        // A constant column duplicates the intercept.
        let x: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64, 5.0]).collect();
        let y: Vec<f64> = (0..12).map(|i| 3.0 * i as f64).collect();
        let err = LinearRegressionFitter::default().fit_blocking(&x, &y).unwrap_err();
        assert!(matches!(err, UpdateError::Fit(FitError::Singular)));
    }

    #[test]
    fn test_least_squares_averages_noisy_targets() {
        // y = 1 + 2x, with alternating +/-0.5 noise that cancels in pairs.
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![(i / 2) as f64]).collect();
        let y: Vec<f64> = (0..8)
            .map(|i| 1.0 + 2.0 * (i / 2) as f64 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let rows: Vec<&[f64]> = x.iter().map(Vec::as_slice).collect();
        let model = least_squares(&rows, &y, 0.0).unwrap();
        assert!((model.intercept - 1.0).abs() < 1e-9);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_ridge_handles_collinear_features() {
        let x: Vec<Vec<f64>> = (0..12).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let out = LinearRegressionFitter::default()
            .with_ridge(0.1)
            .fit_blocking(&x, &y)
            .unwrap();
        assert!(out.score > 0.99);
    }

    #[test]
    fn test_flat_target_has_no_score() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y = vec![4.0; 10];
        let err = LinearRegressionFitter::default().fit_blocking(&x, &y).unwrap_err();
        assert!(matches!(err, UpdateError::ScoreUnavailable(_)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let x = vec![vec![1.0]; 5];
        let y = vec![1.0; 4];
        let err = LinearRegressionFitter::default().fit_blocking(&x, &y).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Fit(FitError::DimensionMismatch { rows: 5, targets: 4 })
        ));
    }
}
