//! Accuracy metrics between a forecast and a truth array.
//!
//! Only pairs where both values are finite take part. Given the `N` valid
//! pairs $(f_i, t_i)$:
//!
//! $$MAE = \frac{1}{N}\sum |f_i - t_i|$$
//!
//! $$RMSE = \sqrt{\frac{1}{N}\sum (f_i - t_i)^2}$$
//!
//! $$R^2 = 1 - \frac{\sum (f_i - t_i)^2}{\sum (t_i - \bar{t})^2}$$
//!
//! # Degenerate cases
//!
//! - `N = 0` is an error ([`VerifyError::InsufficientData`]).
//! - If every truth value is identical the $R^2$ denominator is zero. $R^2$ is
//!   then NaN, except when every forecast value equals the truth exactly, in
//!   which case it is 1.
//! - Deviations are rescaled before squaring, so $R^2$ stays defined for
//!   truth values whose squared deviations would underflow.

use crate::dataset::GriddedField;
use crate::errors::{VerifyError, VerifyResult};
use ndarray::{ArrayView, Dimension, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three verification metrics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Mae,
    Rmse,
    R2,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Mae, Metric::Rmse, Metric::R2];

    /// Short label as used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Mae => "MAE",
            Metric::Rmse => "RMSE",
            Metric::R2 => "R²",
        }
    }

    /// Whether the metric carries the unit of the verified variable.
    pub fn has_unit(&self) -> bool {
        !matches!(self, Metric::R2)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metrics for one model at one valid time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    /// Number of valid (unmasked) point pairs.
    pub n_valid: usize,
}

impl MetricRecord {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Mae => self.mae,
            Metric::Rmse => self.rmse,
            Metric::R2 => self.r2,
        }
    }
}

/// Compute MAE, RMSE and R² over the finite pairs of two equally shaped arrays.
///
/// ```rust
/// use fcverify_core::metrics::compute;
/// use ndarray::array;
///
/// let record = compute(array![1.0, 2.0, 4.0].view(), array![1.0, 2.0, 3.0].view()).unwrap();
/// assert!((record.mae - 1.0 / 3.0).abs() < 1e-12);
/// assert_eq!(record.n_valid, 3);
/// ```
pub fn compute<D: Dimension>(
    forecast: ArrayView<f64, D>,
    truth: ArrayView<f64, D>,
) -> VerifyResult<MetricRecord> {
    if forecast.shape() != truth.shape() {
        return Err(VerifyError::Alignment(format!(
            "forecast shape {:?} does not match truth shape {:?}",
            forecast.shape(),
            truth.shape()
        )));
    }

    let mut f_valid = Vec::with_capacity(forecast.len());
    let mut t_valid = Vec::with_capacity(truth.len());
    Zip::from(&forecast).and(&truth).for_each(|&f, &t| {
        if f.is_finite() && t.is_finite() {
            f_valid.push(f);
            t_valid.push(t);
        }
    });

    let n = t_valid.len();
    if n == 0 {
        return Err(VerifyError::InsufficientData(format!(
            "no valid forecast/truth pairs among {} points",
            forecast.len()
        )));
    }
    let n_f = n as f64;

    let (abs_sum, sq_sum) = f_valid
        .iter()
        .zip(&t_valid)
        .fold((0.0, 0.0), |(abs_sum, sq_sum), (f, t)| {
            let d = f - t;
            (abs_sum + d.abs(), sq_sum + d * d)
        });

    let mae = abs_sum / n_f;
    let rmse = (sq_sum / n_f).sqrt();
    let r2 = coefficient_of_determination(&f_valid, &t_valid);

    Ok(MetricRecord {
        mae,
        rmse,
        r2,
        n_valid: n,
    })
}

/// Compute metrics between two fields on the same grid.
pub fn compute_fields(forecast: &GriddedField, truth: &GriddedField) -> VerifyResult<MetricRecord> {
    compute(forecast.values().view(), truth.values().view())
}

fn coefficient_of_determination(forecast: &[f64], truth: &[f64]) -> f64 {
    let perfect_or_nan = || {
        let perfect = forecast.iter().zip(truth).all(|(f, t)| f == t);
        if perfect {
            1.0
        } else {
            f64::NAN
        }
    };

    // Zero variance is detected exactly; the computed mean of a constant
    // series is not always bit-identical to its elements.
    let first = truth[0];
    if truth.iter().all(|&t| t == first) {
        return perfect_or_nan();
    }

    // Deviations are scaled by their largest magnitude before squaring so
    // that tiny or huge values neither underflow nor overflow. The ratio of
    // the two sums is unchanged.
    let mean = truth.iter().sum::<f64>() / truth.len() as f64;
    let scale = forecast
        .iter()
        .zip(truth)
        .map(|(f, t)| (f - t).abs().max((t - mean).abs()))
        .fold(0.0, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return perfect_or_nan();
    }

    let (ss_res, ss_tot) = forecast
        .iter()
        .zip(truth)
        .fold((0.0, 0.0), |(res, tot), (f, t)| {
            let r = (f - t) / scale;
            let d = (t - mean) / scale;
            (res + r * r, tot + d * d)
        });
    if ss_tot == 0.0 {
        return perfect_or_nan();
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;
    use ndarray::{array, Array1};

    #[test]
    fn test_identical_arrays() {
        let x = array![[280.0, 281.5], [279.0, 283.25]];
        let record = compute(x.view(), x.view()).unwrap();

        assert_eq!(record.mae, 0.0);
        assert_eq!(record.rmse, 0.0);
        assert_eq!(record.r2, 1.0);
        assert_eq!(record.n_valid, 4);
    }

    #[test]
    fn test_symmetric_masking() {
        let forecast = array![1.0, f64::NAN, 3.0];
        let truth = array![1.0, 2.0, f64::NAN];
        let record = compute(forecast.view(), truth.view()).unwrap();

        assert_eq!(record.n_valid, 1);
        assert_eq!(record.mae, 0.0);
        assert_eq!(record.rmse, 0.0);
        // single pair: zero truth variance with a perfect match
        assert_eq!(record.r2, 1.0);
    }

    #[test]
    fn test_infinite_values_are_masked() {
        let forecast = array![1.0, f64::INFINITY, 2.0, 5.0];
        let truth = array![2.0, 0.0, f64::NEG_INFINITY, 3.0];
        let record = compute(forecast.view(), truth.view()).unwrap();

        assert_eq!(record.n_valid, 2);
        assert!(is_close!(record.mae, 1.5));
        assert!(is_close!(record.rmse, (2.5f64).sqrt()));
        // truth [2, 3], mean 2.5, ss_tot 0.5, ss_res 1 + 4
        assert!(is_close!(record.r2, 1.0 - 5.0 / 0.5));
    }

    #[test]
    fn test_all_masked_is_error() {
        let forecast = array![f64::NAN, 1.0];
        let truth = array![2.0, f64::NAN];
        let err = compute(forecast.view(), truth.view()).unwrap_err();
        assert!(matches!(err, VerifyError::InsufficientData(_)));

        let empty = Array1::<f64>::zeros(0);
        assert!(compute(empty.view(), empty.view()).is_err());
    }

    #[test]
    fn test_constant_truth_with_error_is_nan() {
        let forecast = array![1.0, 2.0, 3.0];
        let truth = array![0.1, 0.1, 0.1];
        let record = compute(forecast.view(), truth.view()).unwrap();

        assert!(record.r2.is_nan());
        assert!(record.mae > 0.0);
    }

    #[test]
    fn test_constant_truth_perfect_match() {
        let x = array![0.1, 0.1, 0.1];
        let record = compute(x.view(), x.view()).unwrap();
        assert_eq!(record.r2, 1.0);
    }

    #[test]
    fn test_reference_values() {
        let forecast = array![[10.0, 12.0], [11.0, 9.0]];
        let truth = array![[10.0, 13.0], [11.0, 10.0]];
        let record = compute(forecast.view(), truth.view()).unwrap();

        assert!(is_close!(record.mae, 0.5));
        assert!(is_close!(record.rmse, (0.5f64).sqrt()));
        // truth mean 11, ss_tot 1 + 4 + 0 + 1 = 6, ss_res 2
        assert!(is_close!(record.r2, 1.0 - 2.0 / 6.0));
    }

    #[test]
    fn test_tiny_truth_variance_is_resolved() {
        let forecast = array![1e-200, 3e-200];
        let truth = array![1e-200, 1.5e-200];
        let record = compute(forecast.view(), truth.view()).unwrap();

        // ss_tot = 2 * (0.25e-200)^2, ss_res = (1.5e-200)^2
        assert!(is_close!(record.r2, -17.0));

        let record = compute(truth.view(), truth.view()).unwrap();
        assert_eq!(record.r2, 1.0);
    }

    #[test]
    fn test_worse_than_mean_is_negative() {
        let forecast = array![3.0, 1.0];
        let truth = array![1.0, 3.0];
        let record = compute(forecast.view(), truth.view()).unwrap();
        assert!(is_close!(record.r2, -3.0));
    }

    #[test]
    fn test_shape_mismatch() {
        let forecast = array![[1.0, 2.0]];
        let truth = array![[1.0], [2.0]];
        let err = compute(forecast.view(), truth.view()).unwrap_err();
        assert!(matches!(err, VerifyError::Alignment(_)));
    }

    #[test]
    fn test_record_accessor() {
        let record = MetricRecord {
            mae: 1.0,
            rmse: 2.0,
            r2: 0.5,
            n_valid: 10,
        };
        let values: Vec<f64> = Metric::ALL.iter().map(|m| record.get(*m)).collect();
        assert_eq!(values, vec![1.0, 2.0, 0.5]);
        assert_eq!(Metric::R2.to_string(), "R²");
    }
}
