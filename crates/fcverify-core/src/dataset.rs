//! In-memory gridded sources
//!
//! This module provides the values the loading collaborator hands over to the
//! verification core:
//!
//! - [`TimeLabel`]: an exactly comparable valid time
//! - [`Coordinates`]: the latitude/longitude axes of a rectilinear grid
//! - [`GriddedField`]: one 2-D slice of values at one valid time
//! - [`GriddedDataset`]: a named collection of `(time, lat, lon)` variables with
//!   one or more named time coordinates
//!
//! Missing values are encoded as non-finite numbers (NaN).
//!
//! # Examples
//!
//! ```rust
//! use fcverify_core::dataset::{GriddedDataset, TimeLabel};
//! use ndarray::Array3;
//!
//! let t0 = TimeLabel::from_ymd_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let dataset = GriddedDataset::builder("IFS")
//!     .time_coordinate("valid_time", vec![t0])
//!     .latitude(vec![50.0, 49.0])
//!     .longitude(vec![0.0, 1.0, 2.0])
//!     .variable("t2m", Array3::from_elem((1, 2, 3), 280.0))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(dataset.grid_shape(), (2, 3));
//! assert!(dataset.has_variable("t2m"));
//! ```

use crate::errors::{VerifyError, VerifyResult};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A valid time, compared exactly.
///
/// Stored as a naive UTC timestamp. Two labels are equal only if they denote
/// the same instant; no tolerance is applied by `==` or by hashing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeLabel(NaiveDateTime);

impl TimeLabel {
    pub fn new(datetime: NaiveDateTime) -> Self {
        Self(datetime)
    }

    /// Build a label from calendar components, returning `None` for invalid dates.
    pub fn from_ymd_hms(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(hour, min, sec)
            .map(Self)
    }

    /// Build a label from seconds since the Unix epoch.
    pub fn from_unix_seconds(seconds: i64) -> Option<Self> {
        chrono::DateTime::from_timestamp(seconds, 0).map(|dt| Self(dt.naive_utc()))
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }

    /// Signed offset `self - other`.
    pub fn offset_from(&self, other: &TimeLabel) -> TimeDelta {
        self.0 - other.0
    }

    /// Absolute distance between two labels.
    pub fn distance(&self, other: &TimeLabel) -> TimeDelta {
        self.offset_from(other).abs()
    }

    /// The label shifted by `delta`, or `None` on overflow.
    pub fn shifted(&self, delta: TimeDelta) -> Option<Self> {
        self.0.checked_add_signed(delta).map(Self)
    }
}

impl fmt::Display for TimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S"))
    }
}

impl From<NaiveDateTime> for TimeLabel {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

/// Latitude and longitude axes of a rectilinear grid, in degrees.
///
/// Axes may be ascending or descending; monotonicity is only enforced when a
/// grid is used as the source of a resampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    latitude: Array1<f64>,
    longitude: Array1<f64>,
}

impl Coordinates {
    pub fn new(latitude: Array1<f64>, longitude: Array1<f64>) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn latitude(&self) -> &Array1<f64> {
        &self.latitude
    }

    pub fn longitude(&self) -> &Array1<f64> {
        &self.longitude
    }

    /// Grid shape as `(n_lat, n_lon)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.latitude.len(), self.longitude.len())
    }
}

/// One 2-D slice of a variable at a single valid time.
///
/// Fields are immutable. Cloning shares the underlying coordinate and value
/// storage.
#[derive(Debug, Clone, PartialEq)]
pub struct GriddedField {
    time: TimeLabel,
    coords: Arc<Coordinates>,
    values: Arc<Array2<f64>>,
}

impl GriddedField {
    /// Create a field, checking that `values` is laid out as `(n_lat, n_lon)`.
    pub fn new(
        time: TimeLabel,
        coords: Arc<Coordinates>,
        values: Array2<f64>,
    ) -> VerifyResult<Self> {
        if values.dim() != coords.shape() {
            return Err(VerifyError::Configuration(format!(
                "field values have shape {:?} but the coordinates describe {:?}",
                values.dim(),
                coords.shape()
            )));
        }
        Ok(Self {
            time,
            coords,
            values: Arc::new(values),
        })
    }

    pub fn time(&self) -> TimeLabel {
        self.time
    }

    pub fn coordinates(&self) -> &Arc<Coordinates> {
        &self.coords
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// True if both fields point at the same value buffer.
    pub fn shares_values_with(&self, other: &GriddedField) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    /// True if both fields are defined on identical coordinates.
    pub fn same_grid_as(&self, other: &GriddedField) -> bool {
        Arc::ptr_eq(&self.coords, &other.coords) || self.coords == other.coords
    }
}

/// A named gridded source as produced by the loading collaborator.
///
/// Every data variable is stored as a `(time, lat, lon)` cube sharing the
/// dataset's spatial coordinates. A dataset may carry more than one time
/// coordinate (e.g. both an issue `time` and a `valid_time`); which one is the
/// valid-time axis is decided once by
/// [`resolve_axis`](crate::time_index::resolve_axis).
#[derive(Debug, Clone)]
pub struct GriddedDataset {
    name: String,
    time_coords: BTreeMap<String, Vec<TimeLabel>>,
    coords: Arc<Coordinates>,
    variables: BTreeMap<String, Array3<f64>>,
}

impl GriddedDataset {
    pub fn builder(name: &str) -> GriddedDatasetBuilder {
        GriddedDatasetBuilder {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn time_coordinate(&self, name: &str) -> Option<&[TimeLabel]> {
        self.time_coords.get(name).map(|v| v.as_slice())
    }

    pub fn time_coordinate_names(&self) -> impl Iterator<Item = &str> {
        self.time_coords.keys().map(|k| k.as_str())
    }

    pub fn coordinates(&self) -> &Arc<Coordinates> {
        &self.coords
    }

    pub fn grid_shape(&self) -> (usize, usize) {
        self.coords.shape()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Array3<f64>> {
        self.variables.get(name)
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }
}

/// Builder for [`GriddedDataset`].
#[derive(Debug, Default)]
pub struct GriddedDatasetBuilder {
    name: String,
    time_coords: BTreeMap<String, Vec<TimeLabel>>,
    latitude: Option<Vec<f64>>,
    longitude: Option<Vec<f64>>,
    variables: BTreeMap<String, Array3<f64>>,
}

impl GriddedDatasetBuilder {
    pub fn time_coordinate(mut self, name: &str, labels: Vec<TimeLabel>) -> Self {
        self.time_coords.insert(name.to_string(), labels);
        self
    }

    pub fn latitude(mut self, values: Vec<f64>) -> Self {
        self.latitude = Some(values);
        self
    }

    pub fn longitude(mut self, values: Vec<f64>) -> Self {
        self.longitude = Some(values);
        self
    }

    pub fn variable(mut self, name: &str, values: Array3<f64>) -> Self {
        self.variables.insert(name.to_string(), values);
        self
    }

    /// Validate the spatial layout and build the dataset.
    ///
    /// Each variable's trailing dimensions must match `(n_lat, n_lon)`. The
    /// leading (time) dimension is checked later against the resolved time
    /// axis.
    pub fn build(self) -> VerifyResult<GriddedDataset> {
        let latitude = self.latitude.ok_or_else(|| {
            VerifyError::Configuration(format!("dataset {} has no latitude coordinate", self.name))
        })?;
        let longitude = self.longitude.ok_or_else(|| {
            VerifyError::Configuration(format!(
                "dataset {} has no longitude coordinate",
                self.name
            ))
        })?;
        let coords = Coordinates::new(Array1::from(latitude), Array1::from(longitude));
        let shape = coords.shape();

        for (name, values) in &self.variables {
            let (_, n_lat, n_lon) = values.dim();
            if (n_lat, n_lon) != shape {
                return Err(VerifyError::Configuration(format!(
                    "variable {name} in dataset {} has spatial shape {:?}, expected {:?}",
                    self.name,
                    (n_lat, n_lon),
                    shape
                )));
            }
        }

        Ok(GriddedDataset {
            name: self.name,
            time_coords: self.time_coords,
            coords: Arc::new(coords),
            variables: self.variables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_time_label_exact_equality() {
        let a = TimeLabel::from_ymd_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let b = TimeLabel::from_ymd_hms(2024, 3, 1, 12, 0, 1).unwrap();

        assert_ne!(a, b);
        assert!(a < b);
        assert_eq!(b.distance(&a), TimeDelta::seconds(1));
        assert_eq!(a.distance(&b), TimeDelta::seconds(1));
        assert_eq!(a.to_string(), "2024-03-01T12:00:00");
    }

    #[test]
    fn test_time_label_from_unix_seconds() {
        let label = TimeLabel::from_unix_seconds(86_400).unwrap();
        assert_eq!(label, TimeLabel::from_ymd_hms(1970, 1, 2, 0, 0, 0).unwrap());
        assert!(TimeLabel::from_ymd_hms(2024, 2, 30, 0, 0, 0).is_none());
    }

    #[test]
    fn test_field_rejects_mismatched_values() {
        let coords = Arc::new(Coordinates::new(array![1.0, 2.0], array![1.0, 2.0, 3.0]));
        let time = TimeLabel::from_ymd_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let err = GriddedField::new(time, coords.clone(), Array2::zeros((3, 2))).unwrap_err();
        assert!(matches!(err, VerifyError::Configuration(_)));

        let field = GriddedField::new(time, coords, Array2::zeros((2, 3))).unwrap();
        assert_eq!(field.shape(), (2, 3));
    }

    #[test]
    fn test_clone_shares_storage() {
        let coords = Arc::new(Coordinates::new(array![1.0], array![1.0]));
        let time = TimeLabel::from_ymd_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let field = GriddedField::new(time, coords, array![[1.0]]).unwrap();
        let copy = field.clone();

        assert!(field.shares_values_with(&copy));
        assert!(field.same_grid_as(&copy));
    }

    #[test]
    fn test_builder_validates_spatial_shape() {
        let t0 = TimeLabel::from_ymd_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let err = GriddedDataset::builder("ERA5")
            .time_coordinate("time", vec![t0])
            .latitude(vec![1.0, 2.0])
            .longitude(vec![1.0])
            .variable("t2m", Array3::zeros((1, 1, 2)))
            .build()
            .unwrap_err();
        assert!(matches!(err, VerifyError::Configuration(_)));

        let err = GriddedDataset::builder("ERA5")
            .longitude(vec![1.0])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("latitude"));
    }
}
