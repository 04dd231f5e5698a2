//! Verification pipeline
//!
//! Ties the components together:
//!
//! 1. [`PreparedSources::prepare`] resolves the time axis and the canonical
//!    variable of each dataset once.
//! 2. [`VerificationPipeline::run`] walks the ascending overlap of the two
//!    forecast models and, for each time and model, extracts the forecast slice,
//!    finds the nearest truth slice within tolerance, aligns truth onto the
//!    forecast grid and computes the metric triple.
//!
//! `run` is fail-fast: the first failing slice (in time order, primary before
//! alternate) aborts the run. [`VerificationPipeline::run_resilient`] instead
//! records a typed outcome per slice so one bad time does not discard the
//! others.
//!
//! With `workers > 1` the per-time work runs on a bounded rayon pool. Results
//! are gathered by index, so the output is identical to a sequential run.

use crate::align::GridAligner;
use crate::config::PipelineConfig;
use crate::dataset::{GriddedDataset, GriddedField, TimeLabel};
use crate::errors::{VerifyError, VerifyResult};
use crate::metrics::{compute_fields, Metric, MetricRecord};
use crate::series::{resolve_variable, ForecastSeries, TruthSeries};
use crate::time_index::{compute_overlap, resolve_axis};
use chrono::TimeDelta;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two competing forecast models.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelId {
    Primary,
    Alternate,
}

impl ModelId {
    pub const ALL: [ModelId; 2] = [ModelId::Primary, ModelId::Alternate];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Primary => "primary",
            ModelId::Alternate => "alternate",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forecast and truth series, resolved once from the raw datasets.
#[derive(Debug, Clone)]
pub struct PreparedSources {
    primary: ForecastSeries,
    alternate: ForecastSeries,
    truth: TruthSeries,
}

impl PreparedSources {
    /// Resolve time axes and variable names of all three datasets.
    pub fn prepare(
        primary: &GriddedDataset,
        alternate: &GriddedDataset,
        truth: &GriddedDataset,
        config: &PipelineConfig,
    ) -> VerifyResult<Self> {
        let forecast = |model: ModelId, dataset: &GriddedDataset| -> VerifyResult<ForecastSeries> {
            let axis = resolve_axis(dataset)?;
            let variable = resolve_variable(dataset, &config.variable_aliases)?;
            debug!(
                "{model} forecast {}: axis {}, variable {variable}, {} times",
                dataset.name(),
                axis.name(),
                axis.len()
            );
            ForecastSeries::from_dataset(model, dataset, axis, &variable)
        };

        let primary = forecast(ModelId::Primary, primary)?;
        let alternate = forecast(ModelId::Alternate, alternate)?;

        let truth_axis = resolve_axis(truth)?;
        let truth_variable = resolve_variable(truth, config.truth_aliases())?;
        debug!(
            "truth {}: axis {}, variable {truth_variable}, {} times",
            truth.name(),
            truth_axis.name(),
            truth_axis.len()
        );
        let truth = TruthSeries::from_dataset(truth, truth_axis, &truth_variable)?;

        Ok(Self::from_series(primary, alternate, truth))
    }

    pub fn from_series(
        primary: ForecastSeries,
        alternate: ForecastSeries,
        truth: TruthSeries,
    ) -> Self {
        Self {
            primary,
            alternate,
            truth,
        }
    }

    pub fn forecast(&self, model: ModelId) -> &ForecastSeries {
        match model {
            ModelId::Primary => &self.primary,
            ModelId::Alternate => &self.alternate,
        }
    }

    pub fn truth(&self) -> &TruthSeries {
        &self.truth
    }

    /// Ascending valid times shared by both forecast models.
    pub fn overlap(&self) -> Vec<TimeLabel> {
        compute_overlap(self.primary.axis(), self.alternate.axis())
    }
}

/// Per-model metric sequences aligned with one ascending time sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    times: Vec<TimeLabel>,
    primary: Vec<MetricRecord>,
    alternate: Vec<MetricRecord>,
}

impl VerificationResult {
    fn with_capacity(n: usize) -> Self {
        Self {
            times: Vec::with_capacity(n),
            primary: Vec::with_capacity(n),
            alternate: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, time: TimeLabel, primary: MetricRecord, alternate: MetricRecord) {
        debug_assert!(self.times.last().map_or(true, |last| *last < time));
        self.times.push(time);
        self.primary.push(primary);
        self.alternate.push(alternate);
    }

    pub fn times(&self) -> &[TimeLabel] {
        &self.times
    }

    pub fn records(&self, model: ModelId) -> &[MetricRecord] {
        match model {
            ModelId::Primary => &self.primary,
            ModelId::Alternate => &self.alternate,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// `(time, value)` points of one metric for one model, for plotting.
    pub fn series(&self, model: ModelId, metric: Metric) -> Vec<(TimeLabel, f64)> {
        self.times
            .iter()
            .zip(self.records(model))
            .map(|(t, r)| (*t, r.get(metric)))
            .collect()
    }
}

/// Outcome of both models at one valid time.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeOutcome {
    pub time: TimeLabel,
    pub primary: VerifyResult<MetricRecord>,
    pub alternate: VerifyResult<MetricRecord>,
}

impl TimeOutcome {
    pub fn get(&self, model: ModelId) -> &VerifyResult<MetricRecord> {
        match model {
            ModelId::Primary => &self.primary,
            ModelId::Alternate => &self.alternate,
        }
    }
}

/// Per-slice outcomes of a resilient run, in ascending time order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResilientResult {
    outcomes: Vec<TimeOutcome>,
}

impl ResilientResult {
    pub fn outcomes(&self) -> &[TimeOutcome] {
        &self.outcomes
    }

    /// Times at which both models verified successfully.
    pub fn successful(&self) -> VerificationResult {
        let mut result = VerificationResult::with_capacity(self.outcomes.len());
        for outcome in &self.outcomes {
            if let (Ok(p), Ok(a)) = (&outcome.primary, &outcome.alternate) {
                result.push(outcome.time, *p, *a);
            }
        }
        result
    }

    /// Every failed slice, in time order.
    pub fn failures(&self) -> impl Iterator<Item = (ModelId, TimeLabel, &VerifyError)> + '_ {
        self.outcomes.iter().flat_map(|outcome| {
            ModelId::ALL.into_iter().filter_map(move |model| {
                outcome
                    .get(model)
                    .as_ref()
                    .err()
                    .map(|err| (model, outcome.time, err))
            })
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

/// Verifies two forecast models against truth over their shared valid times.
#[derive(Debug, Clone)]
pub struct VerificationPipeline {
    sources: PreparedSources,
    aligner: GridAligner,
    tolerance: TimeDelta,
    workers: usize,
}

impl VerificationPipeline {
    pub fn new(sources: PreparedSources, config: &PipelineConfig) -> VerifyResult<Self> {
        config.validate()?;
        Ok(Self {
            sources,
            aligner: GridAligner::new(config.interpolation),
            tolerance: config.truth_tolerance()?,
            workers: config.workers,
        })
    }

    /// Prepare the raw datasets and build a pipeline over them.
    pub fn from_datasets(
        primary: &GriddedDataset,
        alternate: &GriddedDataset,
        truth: &GriddedDataset,
        config: &PipelineConfig,
    ) -> VerifyResult<Self> {
        config.validate()?;
        let sources = PreparedSources::prepare(primary, alternate, truth, config)?;
        Self::new(sources, config)
    }

    pub fn sources(&self) -> &PreparedSources {
        &self.sources
    }

    pub fn overlap(&self) -> Vec<TimeLabel> {
        self.sources.overlap()
    }

    /// Verify both models at every overlapping valid time, stopping at the
    /// first failure.
    pub fn run(&self) -> VerifyResult<VerificationResult> {
        self.run_over(&self.overlap())
    }

    /// Verify both models at the given strictly ascending times, stopping at
    /// the first failure.
    pub fn run_over(&self, times: &[TimeLabel]) -> VerifyResult<VerificationResult> {
        check_ascending(times)?;
        if times.is_empty() {
            warn!("No overlapping valid times between the primary and alternate forecasts");
            return Ok(VerificationResult::default());
        }
        info!(
            "Verifying {} valid times from {} to {}",
            times.len(),
            times[0],
            times[times.len() - 1]
        );

        let outcomes = self.evaluate(times)?;
        let mut result = VerificationResult::with_capacity(times.len());
        for outcome in outcomes {
            let time = outcome.time;
            let primary = outcome
                .primary
                .map_err(|e| e.at_slice(ModelId::Primary, time))?;
            let alternate = outcome
                .alternate
                .map_err(|e| e.at_slice(ModelId::Alternate, time))?;
            result.push(time, primary, alternate);
        }

        info!("Verified {} valid times", result.len());
        Ok(result)
    }

    /// Verify every overlapping time, keeping a typed outcome per slice.
    pub fn run_resilient(&self) -> VerifyResult<ResilientResult> {
        self.run_resilient_over(&self.overlap())
    }

    pub fn run_resilient_over(&self, times: &[TimeLabel]) -> VerifyResult<ResilientResult> {
        check_ascending(times)?;
        if times.is_empty() {
            warn!("No overlapping valid times between the primary and alternate forecasts");
        }
        let result = ResilientResult {
            outcomes: self.evaluate(times)?,
        };
        let failed = result.failure_count();
        if failed > 0 {
            warn!(
                "{failed} of {} slices failed verification",
                times.len() * ModelId::ALL.len()
            );
        }
        Ok(result)
    }

    fn evaluate(&self, times: &[TimeLabel]) -> VerifyResult<Vec<TimeOutcome>> {
        if self.workers <= 1 || times.len() <= 1 {
            return Ok(times.iter().map(|t| self.verify_time(*t)).collect());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| VerifyError::Configuration(format!("could not start worker pool: {e}")))?;
        // Indexed collect keeps the input order.
        Ok(pool.install(|| {
            times
                .par_iter()
                .map(|t| self.verify_time(*t))
                .collect::<Vec<_>>()
        }))
    }

    fn verify_time(&self, time: TimeLabel) -> TimeOutcome {
        let truth = self.sources.truth().nearest(time, self.tolerance).cloned();

        let primary_field = self.forecast_slice(ModelId::Primary, time);
        let primary_aligned = match (&truth, &primary_field) {
            (Ok(truth), Ok(field)) => Some(self.aligner.align(truth, field)),
            _ => None,
        };
        let primary = self.verify_slice(&primary_field, &truth, primary_aligned.clone());

        let alternate_field = self.forecast_slice(ModelId::Alternate, time);
        let alternate_aligned = match (&truth, &alternate_field) {
            // Both forecasts on one grid: reuse the primary alignment.
            (Ok(_), Ok(alt)) if matches!(&primary_field, Ok(p) if p.same_grid_as(alt)) => {
                primary_aligned
            }
            (Ok(truth), Ok(field)) => Some(self.aligner.align(truth, field)),
            _ => None,
        };
        let alternate = self.verify_slice(&alternate_field, &truth, alternate_aligned);

        if let (Ok(p), Ok(a)) = (&primary, &alternate) {
            debug!(
                "{time}: primary MAE {:.2} RMSE {:.2} R² {:.3} | alternate MAE {:.2} RMSE {:.2} R² {:.3}",
                p.mae, p.rmse, p.r2, a.mae, a.rmse, a.r2
            );
        }

        TimeOutcome {
            time,
            primary,
            alternate,
        }
    }

    fn forecast_slice(&self, model: ModelId, time: TimeLabel) -> VerifyResult<GriddedField> {
        self.sources
            .forecast(model)
            .slice_at(time)
            .cloned()
            .ok_or(VerifyError::MissingSlice { model, time })
    }

    /// Metrics for one model, reporting the first failing step in
    /// extraction order: forecast slice, truth slice, alignment, metrics.
    fn verify_slice(
        &self,
        forecast: &VerifyResult<GriddedField>,
        truth: &VerifyResult<GriddedField>,
        aligned: Option<VerifyResult<GriddedField>>,
    ) -> VerifyResult<MetricRecord> {
        let forecast = forecast.as_ref().map_err(|e| e.clone())?;
        truth.as_ref().map_err(|e| e.clone())?;
        let aligned = aligned.ok_or_else(|| {
            VerifyError::Alignment("truth was not aligned to the forecast grid".to_string())
        })??;
        compute_fields(forecast, &aligned)
    }
}

fn check_ascending(times: &[TimeLabel]) -> VerifyResult<()> {
    match times.windows(2).find(|w| w[0] >= w[1]) {
        Some(w) => Err(VerifyError::Configuration(format!(
            "verification times must be strictly ascending, got {} before {}",
            w[0], w[1]
        ))),
        None => Ok(()),
    }
}
