//! Valid-time axis resolution and overlap computation.
//!
//! Sources name their valid-time coordinate either `time` or `valid_time`.
//! The choice is made once per source by [`resolve_axis`]; downstream steps
//! receive the resulting [`TimeAxis`] and never look the name up again.

use crate::dataset::{GriddedDataset, TimeLabel};
use crate::errors::{VerifyError, VerifyResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The admissible identities of a valid-time coordinate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAxisName {
    Time,
    ValidTime,
}

impl TimeAxisName {
    /// Resolution order: `time` takes precedence over `valid_time`.
    pub const CANDIDATES: [TimeAxisName; 2] = [TimeAxisName::Time, TimeAxisName::ValidTime];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeAxisName::Time => "time",
            TimeAxisName::ValidTime => "valid_time",
        }
    }
}

impl fmt::Display for TimeAxisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved valid-time axis of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeAxis {
    name: TimeAxisName,
    labels: Vec<TimeLabel>,
}

impl TimeAxis {
    pub fn new(name: TimeAxisName, labels: Vec<TimeLabel>) -> Self {
        Self { name, labels }
    }

    pub fn name(&self) -> TimeAxisName {
        self.name
    }

    /// Labels in source order (not necessarily sorted).
    pub fn labels(&self) -> &[TimeLabel] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Identify which valid-time coordinate a dataset exposes.
///
/// Returns [`VerifyError::Configuration`] if the dataset has neither `time`
/// nor `valid_time`.
pub fn resolve_axis(dataset: &GriddedDataset) -> VerifyResult<TimeAxis> {
    TimeAxisName::CANDIDATES
        .iter()
        .find_map(|name| {
            dataset
                .time_coordinate(name.as_str())
                .map(|labels| TimeAxis::new(*name, labels.to_vec()))
        })
        .ok_or_else(|| {
            let found: Vec<&str> = dataset.time_coordinate_names().collect();
            VerifyError::Configuration(format!(
                "could not find a time coordinate in dataset {} (expected one of time, valid_time; found {:?})",
                dataset.name(),
                found
            ))
        })
}

/// Ascending labels present in both axes.
///
/// Uses exact equality; duplicates collapse. An empty result is a valid
/// outcome, not an error.
pub fn compute_overlap(a: &TimeAxis, b: &TimeAxis) -> Vec<TimeLabel> {
    let left: BTreeSet<TimeLabel> = a.labels().iter().copied().collect();
    let right: BTreeSet<TimeLabel> = b.labels().iter().copied().collect();
    left.intersection(&right).copied().collect()
}

/// Ascending labels present in every axis. No axes gives an empty overlap.
pub fn compute_overlap_all(axes: &[&TimeAxis]) -> Vec<TimeLabel> {
    let Some((first, rest)) = axes.split_first() else {
        return Vec::new();
    };
    let mut shared: BTreeSet<TimeLabel> = first.labels().iter().copied().collect();
    for axis in rest {
        let other: BTreeSet<TimeLabel> = axis.labels().iter().copied().collect();
        shared.retain(|label| other.contains(label));
    }
    shared.into_iter().collect()
}
