//! Summary statistics over a verification run.
//!
//! Each metric series is reduced to its mean and population standard
//! deviation ($\sigma = \sqrt{\frac{1}{N}\sum (x_i - \bar{x})^2}$).

use crate::errors::{VerifyError, VerifyResult};
use crate::metrics::{Metric, MetricRecord};
use crate::pipeline::{ModelId, VerificationResult};
use serde::{Deserialize, Serialize};

/// Mean and population standard deviation of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
}

impl MetricSummary {
    fn from_values(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: variance.sqrt(),
        }
    }
}

/// Summary of all three metrics for one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistic {
    pub mae: MetricSummary,
    pub rmse: MetricSummary,
    pub r2: MetricSummary,
    /// Number of valid times summarised.
    pub count: usize,
}

impl SummaryStatistic {
    pub fn get(&self, metric: Metric) -> MetricSummary {
        match metric {
            Metric::Mae => self.mae,
            Metric::Rmse => self.rmse,
            Metric::R2 => self.r2,
        }
    }
}

/// Summaries of both models over the same times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub primary: SummaryStatistic,
    pub alternate: SummaryStatistic,
}

impl ComparisonSummary {
    pub fn get(&self, model: ModelId) -> &SummaryStatistic {
        match model {
            ModelId::Primary => &self.primary,
            ModelId::Alternate => &self.alternate,
        }
    }
}

/// Reduce per-time records to mean and population std per metric.
///
/// Non-finite values (an undefined R²) propagate into the summary. Fails with
/// [`VerifyError::InsufficientData`] on empty input.
pub fn reduce(records: &[MetricRecord]) -> VerifyResult<SummaryStatistic> {
    if records.is_empty() {
        return Err(VerifyError::InsufficientData(
            "cannot summarise an empty verification result".to_string(),
        ));
    }
    let summarise = |metric: Metric| {
        let values: Vec<f64> = records.iter().map(|r| r.get(metric)).collect();
        MetricSummary::from_values(&values)
    };
    Ok(SummaryStatistic {
        mae: summarise(Metric::Mae),
        rmse: summarise(Metric::Rmse),
        r2: summarise(Metric::R2),
        count: records.len(),
    })
}

/// Like [`reduce`], but ignores non-finite values of each metric.
///
/// Fails if any metric has no finite value left. `count` is the number of
/// records, not the number of finite values.
pub fn reduce_finite(records: &[MetricRecord]) -> VerifyResult<SummaryStatistic> {
    if records.is_empty() {
        return Err(VerifyError::InsufficientData(
            "cannot summarise an empty verification result".to_string(),
        ));
    }
    let summarise = |metric: Metric| -> VerifyResult<MetricSummary> {
        let values: Vec<f64> = records
            .iter()
            .map(|r| r.get(metric))
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return Err(VerifyError::InsufficientData(format!(
                "no finite {metric} values to summarise"
            )));
        }
        Ok(MetricSummary::from_values(&values))
    };
    Ok(SummaryStatistic {
        mae: summarise(Metric::Mae)?,
        rmse: summarise(Metric::Rmse)?,
        r2: summarise(Metric::R2)?,
        count: records.len(),
    })
}

/// Reduce both models of a verification result.
pub fn summarize(result: &VerificationResult) -> VerifyResult<ComparisonSummary> {
    Ok(ComparisonSummary {
        primary: reduce(result.records(ModelId::Primary))?,
        alternate: reduce(result.records(ModelId::Alternate))?,
    })
}
