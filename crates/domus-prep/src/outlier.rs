//! Outlier removal by interquartile range or z-score, and rare-level filtering.

use std::collections::HashMap;

use domus_io::{Column, ListingTable};
use tracing::{info, instrument, warn};

use crate::error::PrepError;

/// Quantile of `values` by linear interpolation between closest ranks.
///
/// `q` is clamped to [0.0, 1.0]. Returns `None` for an empty slice.
#[must_use]
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = pos - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Arithmetic mean and sample standard deviation (n - 1 denominator).
///
/// Returns `None` with fewer than two values.
#[must_use]
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance.sqrt()))
}

/// Rule deciding which rows are outliers on a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum OutlierRule {
    /// Keep every row.
    None,
    /// Keep rows within `[Q_lo - factor * IQR, Q_hi + factor * IQR]`,
    /// where `IQR = Q_hi - Q_lo`.
    Iqr {
        /// Quantile used as the lower quartile.
        lower_quantile: f64,
        /// Quantile used as the upper quartile.
        upper_quantile: f64,
        /// IQR multiplier.
        factor: f64,
    },
    /// Keep rows within `mean ± threshold * std`.
    ZScore {
        /// Number of standard deviations.
        threshold: f64,
    },
}

impl OutlierRule {
    /// The classic Tukey fences: quartiles 0.25 / 0.75, factor 1.5.
    #[must_use]
    pub fn iqr() -> Self {
        OutlierRule::Iqr {
            lower_quantile: 0.25,
            upper_quantile: 0.75,
            factor: 1.5,
        }
    }

    /// Three standard deviations around the mean.
    #[must_use]
    pub fn z_score() -> Self {
        OutlierRule::ZScore { threshold: 3.0 }
    }

    /// Check the rule's parameters.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`PrepError::InvalidQuantiles`] | quantiles outside [0, 1] or not increasing |
    /// | [`PrepError::InvalidOutlierParameter`] | negative or non-finite factor/threshold |
    pub fn validate(&self) -> Result<(), PrepError> {
        match *self {
            OutlierRule::None => Ok(()),
            OutlierRule::Iqr {
                lower_quantile,
                upper_quantile,
                factor,
            } => {
                if !(0.0..=1.0).contains(&lower_quantile)
                    || !(0.0..=1.0).contains(&upper_quantile)
                    || lower_quantile >= upper_quantile
                {
                    return Err(PrepError::InvalidQuantiles {
                        lower: lower_quantile,
                        upper: upper_quantile,
                    });
                }
                check_non_negative("factor", factor)
            }
            OutlierRule::ZScore { threshold } => check_non_negative("threshold", threshold),
        }
    }

    /// Compute the inclusive `(lower, upper)` bounds over the present values.
    ///
    /// Returns `None` for [`OutlierRule::None`] and when there are too few
    /// values (none for IQR, fewer than two for z-score).
    #[must_use]
    pub fn bounds(&self, values: &[Option<f64>]) -> Option<(f64, f64)> {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        match *self {
            OutlierRule::None => None,
            OutlierRule::Iqr {
                lower_quantile,
                upper_quantile,
                factor,
            } => {
                let q_lo = quantile(&present, lower_quantile)?;
                let q_hi = quantile(&present, upper_quantile)?;
                let iqr = q_hi - q_lo;
                Some((q_lo - factor * iqr, q_hi + factor * iqr))
            }
            OutlierRule::ZScore { threshold } => {
                let (mean, std) = mean_and_std(&present)?;
                Some((mean - threshold * std, mean + threshold * std))
            }
        }
    }
}

fn check_non_negative(name: &'static str, value: f64) -> Result<(), PrepError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PrepError::InvalidOutlierParameter { name, value })
    }
}

/// Drop rows whose value in `column` falls outside the rule's bounds.
///
/// Bounds are computed on `column` and rows are filtered on the same column.
/// A row with a missing value is dropped whenever bounds exist. Returns the
/// number of rows removed.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`PrepError::Table`] | `column` is absent or not numeric |
/// | rule errors | see [`OutlierRule::validate`] |
#[instrument(skip(table), fields(n_rows = table.n_rows()))]
pub fn remove_outliers(
    table: &mut ListingTable,
    column: &str,
    rule: OutlierRule,
) -> Result<usize, PrepError> {
    rule.validate()?;
    if rule == OutlierRule::None {
        return Ok(0);
    }
    let values = table.numeric(column)?;
    let Some((lower, upper)) = rule.bounds(values) else {
        warn!(column, "too few values to compute outlier bounds, nothing removed");
        return Ok(0);
    };
    let mask: Vec<bool> = values
        .iter()
        .map(|v| v.is_some_and(|x| x >= lower && x <= upper))
        .collect();
    let removed = table.retain_rows(&mask)?;
    info!(column, lower, upper, removed, "outliers removed");
    Ok(removed)
}

/// Keep only rows whose value in `column` occurs at least `min_count` times.
///
/// Works on numeric and text columns; rows with a missing value are dropped.
/// Returns the number of rows removed.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`PrepError::InvalidMinCount`] | `min_count` is zero |
/// | [`PrepError::Table`] | `column` is absent |
#[instrument(skip(table), fields(n_rows = table.n_rows()))]
pub fn drop_rare(table: &mut ListingTable, column: &str, min_count: usize) -> Result<usize, PrepError> {
    if min_count == 0 {
        return Err(PrepError::InvalidMinCount { min_count });
    }
    let keys = level_keys(table, column)?;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys.iter().flatten() {
        *counts.entry(key.as_str()).or_default() += 1;
    }
    let mask: Vec<bool> = keys
        .iter()
        .map(|k| k.as_deref().is_some_and(|k| counts[k] >= min_count))
        .collect();
    let removed = table.retain_rows(&mask)?;
    info!(column, min_count, removed, "rare levels dropped");
    Ok(removed)
}

/// String key per row for grouping on a numeric or text column.
///
/// Numbers use their shortest display form, so `1000.0` keys as `"1000"`.
pub(crate) fn level_keys(table: &ListingTable, column: &str) -> Result<Vec<Option<String>>, PrepError> {
    match table.column(column) {
        Some(Column::Numeric(values)) => Ok(values.iter().map(|v| v.map(|x| x.to_string())).collect()),
        Some(Column::Text(values)) => Ok(values.to_vec()),
        None => Err(domus_io::IoError::MissingColumn {
            name: column.to_string(),
        }
        .into()),
    }
}
