//! Regression metrics.

use crate::error::BoostError;

fn check(y_true: &[f64], y_pred: &[f64]) -> Result<(), BoostError> {
    if y_true.len() != y_pred.len() {
        return Err(BoostError::MetricLengthMismatch {
            n_true: y_true.len(),
            n_pred: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(BoostError::EmptyMetricInput);
    }
    Ok(())
}

/// Mean squared error.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`BoostError::EmptyMetricInput`] | no values |
/// | [`BoostError::MetricLengthMismatch`] | slices differ in length |
pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64, BoostError> {
    check(y_true, y_pred)?;
    let sse: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    Ok(sse / y_true.len() as f64)
}

/// Root mean squared error.
///
/// # Errors
///
/// See [`mean_squared_error`].
pub fn root_mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64, BoostError> {
    mean_squared_error(y_true, y_pred).map(f64::sqrt)
}

/// Mean absolute error.
///
/// # Errors
///
/// See [`mean_squared_error`].
pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64, BoostError> {
    check(y_true, y_pred)?;
    let total: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    Ok(total / y_true.len() as f64)
}

/// Coefficient of determination, `1 - SS_res / SS_tot`.
///
/// When the true values have zero variance, returns 1.0 if every prediction
/// is exact and 0.0 otherwise.
///
/// # Errors
///
/// See [`mean_squared_error`].
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64, BoostError> {
    check(y_true, y_pred)?;
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// R², MSE, RMSE and MAE of one set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RegressionMetrics {
    /// Coefficient of determination.
    pub r2: f64,
    /// Mean squared error.
    pub mse: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
}

impl RegressionMetrics {
    /// Compute every metric.
    ///
    /// # Errors
    ///
    /// See [`mean_squared_error`].
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Result<Self, BoostError> {
        let mse = mean_squared_error(y_true, y_pred)?;
        Ok(Self {
            r2: r2_score(y_true, y_pred)?,
            mse,
            rmse: mse.sqrt(),
            mae: mean_absolute_error(y_true, y_pred)?,
        })
    }
}
