//! Forecast and truth series.
//!
//! A series is built once from a [`GriddedDataset`], a resolved [`TimeAxis`]
//! and a canonical variable name, and then queried per valid time:
//!
//! - [`ForecastSeries::slice_at`] matches a label exactly
//! - [`TruthSeries::nearest`] matches the closest label within a tolerance

use crate::dataset::{GriddedDataset, GriddedField, TimeLabel};
use crate::errors::{VerifyError, VerifyResult};
use crate::pipeline::ModelId;
use crate::time_index::TimeAxis;
use chrono::TimeDelta;
use log::warn;
use std::collections::BTreeMap;

/// Pick the first alias present as a data variable in `dataset`.
///
/// Different producers name the same quantity differently (e.g. `t2m` and
/// `2t` for two-metre temperature). This resolves the name once so that
/// later steps use a single canonical reference.
pub fn resolve_variable(dataset: &GriddedDataset, aliases: &[String]) -> VerifyResult<String> {
    aliases
        .iter()
        .find(|alias| dataset.has_variable(alias))
        .cloned()
        .ok_or_else(|| {
            let found: Vec<&str> = dataset.variable_names().collect();
            VerifyError::Configuration(format!(
                "none of the variables {:?} exist in dataset {} (found {:?})",
                aliases,
                dataset.name(),
                found
            ))
        })
}

/// Split one variable of a dataset into per-time fields, sorted by time.
fn split_fields(
    dataset: &GriddedDataset,
    axis: &TimeAxis,
    variable: &str,
) -> VerifyResult<BTreeMap<TimeLabel, GriddedField>> {
    let cube = dataset.variable(variable).ok_or_else(|| {
        VerifyError::Configuration(format!(
            "variable {variable} does not exist in dataset {}",
            dataset.name()
        ))
    })?;
    let n_time = cube.dim().0;
    if n_time != axis.len() {
        return Err(VerifyError::Configuration(format!(
            "variable {variable} in dataset {} has {n_time} time steps but the {} axis has {}",
            dataset.name(),
            axis.name(),
            axis.len()
        )));
    }

    let mut fields = BTreeMap::new();
    for (index, label) in axis.labels().iter().enumerate() {
        let values = cube.index_axis(ndarray::Axis(0), index).to_owned();
        let field = GriddedField::new(*label, dataset.coordinates().clone(), values)?;
        if fields.insert(*label, field).is_some() {
            return Err(VerifyError::Configuration(format!(
                "duplicate time {label} on the {} axis of dataset {}",
                axis.name(),
                dataset.name()
            )));
        }
    }
    Ok(fields)
}

/// Time-ordered fields of one forecast model.
#[derive(Debug, Clone)]
pub struct ForecastSeries {
    model: ModelId,
    axis: TimeAxis,
    variable: String,
    fields: BTreeMap<TimeLabel, GriddedField>,
}

impl ForecastSeries {
    pub fn from_dataset(
        model: ModelId,
        dataset: &GriddedDataset,
        axis: TimeAxis,
        variable: &str,
    ) -> VerifyResult<Self> {
        let fields = split_fields(dataset, &axis, variable)?;
        Ok(Self {
            model,
            axis,
            variable: variable.to_string(),
            fields,
        })
    }

    /// Build a series directly from fields. Duplicate times are rejected.
    pub fn from_fields(
        model: ModelId,
        axis: TimeAxis,
        variable: &str,
        fields: Vec<GriddedField>,
    ) -> VerifyResult<Self> {
        Ok(Self {
            model,
            axis,
            variable: variable.to_string(),
            fields: collect_unique(fields)?,
        })
    }

    pub fn model(&self) -> ModelId {
        self.model
    }

    pub fn axis(&self) -> &TimeAxis {
        &self.axis
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Times in ascending order.
    pub fn times(&self) -> impl Iterator<Item = TimeLabel> + '_ {
        self.fields.keys().copied()
    }

    /// The field at exactly `time`, if any.
    pub fn slice_at(&self, time: TimeLabel) -> Option<&GriddedField> {
        self.fields.get(&time)
    }
}

/// Reanalysis fields queried by nearest time.
#[derive(Debug, Clone)]
pub struct TruthSeries {
    axis: TimeAxis,
    variable: String,
    fields: BTreeMap<TimeLabel, GriddedField>,
}

impl TruthSeries {
    pub fn from_dataset(
        dataset: &GriddedDataset,
        axis: TimeAxis,
        variable: &str,
    ) -> VerifyResult<Self> {
        let fields = split_fields(dataset, &axis, variable)?;
        Ok(Self {
            axis,
            variable: variable.to_string(),
            fields,
        })
    }

    pub fn from_fields(
        axis: TimeAxis,
        variable: &str,
        fields: Vec<GriddedField>,
    ) -> VerifyResult<Self> {
        Ok(Self {
            axis,
            variable: variable.to_string(),
            fields: collect_unique(fields)?,
        })
    }

    pub fn axis(&self) -> &TimeAxis {
        &self.axis
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The label closest to `time`, regardless of distance.
    ///
    /// On an exact tie the earlier label wins.
    pub fn nearest_time(&self, time: TimeLabel) -> Option<TimeLabel> {
        let before = self.fields.range(..=time).next_back().map(|(t, _)| *t);
        let after = self.fields.range(time..).next().map(|(t, _)| *t);
        match (before, after) {
            (Some(b), Some(a)) => {
                if a.distance(&time) < b.distance(&time) {
                    Some(a)
                } else {
                    Some(b)
                }
            }
            (b, a) => b.or(a),
        }
    }

    /// The field closest to `time`, provided it lies within `tolerance`.
    ///
    /// Returns [`VerifyError::TruthOutOfTolerance`] when the series is empty or
    /// the closest field is further away than `tolerance`.
    pub fn nearest(&self, time: TimeLabel, tolerance: TimeDelta) -> VerifyResult<&GriddedField> {
        let nearest = self.nearest_time(time);
        match nearest {
            Some(found) if found.distance(&time) <= tolerance => {
                if found != time {
                    warn!(
                        "Using truth at {found} for valid time {time} ({}s apart)",
                        found.distance(&time).num_seconds()
                    );
                }
                self.fields.get(&found).ok_or(VerifyError::TruthOutOfTolerance {
                    time,
                    nearest,
                    tolerance_seconds: tolerance.num_seconds(),
                })
            }
            _ => Err(VerifyError::TruthOutOfTolerance {
                time,
                nearest,
                tolerance_seconds: tolerance.num_seconds(),
            }),
        }
    }
}

fn collect_unique(fields: Vec<GriddedField>) -> VerifyResult<BTreeMap<TimeLabel, GriddedField>> {
    let mut map = BTreeMap::new();
    for field in fields {
        let time = field.time();
        if map.insert(time, field).is_some() {
            return Err(VerifyError::Configuration(format!("duplicate field at {time}")));
        }
    }
    Ok(map)
}
