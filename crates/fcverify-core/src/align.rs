//! Spatial footprint reconciliation
//!
//! A truth field and a forecast field frequently live on different grids
//! (different resolution, domain, or latitude ordering). [`GridAligner`]
//! resamples the truth field onto the forecast's coordinates so that both can
//! be compared point by point.
//!
//! Reference points outside the truth field's envelope become NaN. They are
//! never imputed, so they drop out in the metric masking step.
//!
//! # Examples
//!
//! ```rust
//! use fcverify_core::align::{GridAligner, Interpolation};
//! use fcverify_core::dataset::{Coordinates, GriddedField, TimeLabel};
//! use ndarray::array;
//! use std::sync::Arc;
//!
//! let t = TimeLabel::from_ymd_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let truth = GriddedField::new(
//!     t,
//!     Arc::new(Coordinates::new(array![0.0, 1.0], array![0.0, 1.0])),
//!     array![[0.0, 1.0], [2.0, 3.0]],
//! )
//! .unwrap();
//! let reference = GriddedField::new(
//!     t,
//!     Arc::new(Coordinates::new(array![0.5], array![0.5])),
//!     array![[0.0]],
//! )
//! .unwrap();
//!
//! let aligned = GridAligner::new(Interpolation::Bilinear)
//!     .align(&truth, &reference)
//!     .unwrap();
//! assert_eq!(aligned.values()[[0, 0]], 1.5);
//! ```

use crate::dataset::{Coordinates, GriddedField};
use crate::errors::{VerifyError, VerifyResult};
use log::debug;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Spatial interpolation method used when resampling.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Value of the closest source grid point (ties go to the lower index).
    Nearest,
    /// Weighted average of the four surrounding source grid points.
    #[default]
    Bilinear,
}

/// Position of a coordinate value between two neighbouring axis points.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bracket {
    lower: usize,
    upper: usize,
    /// Fractional distance from `lower` towards `upper`, in `[0, 1]`.
    weight: f64,
}

impl Bracket {
    fn nearest(&self) -> usize {
        if self.weight <= 0.5 {
            self.lower
        } else {
            self.upper
        }
    }
}

/// A strictly monotonic source axis.
struct SourceAxis<'a> {
    coords: &'a Array1<f64>,
    descending: bool,
}

impl<'a> SourceAxis<'a> {
    fn new(coords: &'a Array1<f64>, name: &str) -> VerifyResult<Self> {
        let n = coords.len();
        if n < 2 {
            return Err(VerifyError::Alignment(format!(
                "source {name} axis has {n} point(s); at least 2 are required to resample"
            )));
        }
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(VerifyError::Alignment(format!(
                "source {name} axis contains non-finite coordinates"
            )));
        }
        let descending = coords[1] < coords[0];
        let monotonic = coords
            .windows(2)
            .into_iter()
            .all(|w| if descending { w[1] < w[0] } else { w[1] > w[0] });
        if !monotonic {
            return Err(VerifyError::Alignment(format!(
                "source {name} axis is not strictly monotonic"
            )));
        }
        Ok(Self { coords, descending })
    }

    fn precedes_or_equals(&self, value: f64, target: f64) -> bool {
        if self.descending {
            value >= target
        } else {
            value <= target
        }
    }

    /// Locate `x` on the axis; `None` if it lies outside the envelope.
    fn bracket(&self, x: f64) -> Option<Bracket> {
        let c = self.coords;
        let n = c.len();
        let (lo_bound, hi_bound) = if self.descending {
            (c[n - 1], c[0])
        } else {
            (c[0], c[n - 1])
        };
        if !x.is_finite() || x < lo_bound || x > hi_bound {
            return None;
        }

        let mut lower = 0;
        let mut upper = n - 1;
        while upper - lower > 1 {
            let mid = (lower + upper) / 2;
            if self.precedes_or_equals(c[mid], x) {
                lower = mid;
            } else {
                upper = mid;
            }
        }
        let weight = (x - c[lower]) / (c[upper] - c[lower]);
        Some(Bracket {
            lower,
            upper,
            weight: weight.clamp(0.0, 1.0),
        })
    }
}

/// Resamples truth fields onto reference footprints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridAligner {
    method: Interpolation,
}

impl GridAligner {
    pub fn new(method: Interpolation) -> Self {
        Self { method }
    }

    pub fn method(&self) -> Interpolation {
        self.method
    }

    /// Bring `truth` onto the grid of `reference`.
    ///
    /// If the two shapes already match, `truth` is returned unchanged (the
    /// returned field shares its storage). Otherwise the truth values are
    /// resampled at every reference coordinate; the result keeps the truth
    /// field's time label and takes the reference's coordinates.
    ///
    /// Fails with [`VerifyError::Alignment`] if a truth axis has fewer than two
    /// points or is not strictly monotonic.
    pub fn align(
        &self,
        truth: &GriddedField,
        reference: &GriddedField,
    ) -> VerifyResult<GriddedField> {
        if truth.shape() == reference.shape() {
            return Ok(truth.clone());
        }
        debug!(
            "Resampling truth {:?} onto reference {:?} ({:?})",
            truth.shape(),
            reference.shape(),
            self.method
        );

        let source = truth.coordinates();
        let lat_axis = SourceAxis::new(source.latitude(), "latitude")?;
        let lon_axis = SourceAxis::new(source.longitude(), "longitude")?;
        let target: &Coordinates = reference.coordinates();

        let lat_brackets: Vec<Option<Bracket>> =
            target.latitude().iter().map(|&y| lat_axis.bracket(y)).collect();
        let lon_brackets: Vec<Option<Bracket>> =
            target.longitude().iter().map(|&x| lon_axis.bracket(x)).collect();

        let values = truth.values();
        let resampled = Array2::from_shape_fn(target.shape(), |(i, j)| {
            match (lat_brackets[i], lon_brackets[j]) {
                (Some(by), Some(bx)) => match self.method {
                    Interpolation::Nearest => values[[by.nearest(), bx.nearest()]],
                    Interpolation::Bilinear => bilinear(values, by, bx),
                },
                _ => f64::NAN,
            }
        });

        GriddedField::new(truth.time(), reference.coordinates().clone(), resampled)
    }
}

/// Bilinear interpolation between four corners.
///
/// Corners with zero weight are ignored, so a point that falls exactly on a
/// source node only depends on that node. A missing corner with non-zero
/// weight makes the result missing.
fn bilinear(values: &Array2<f64>, by: Bracket, bx: Bracket) -> f64 {
    let corners = [
        (by.lower, bx.lower, (1.0 - by.weight) * (1.0 - bx.weight)),
        (by.lower, bx.upper, (1.0 - by.weight) * bx.weight),
        (by.upper, bx.lower, by.weight * (1.0 - bx.weight)),
        (by.upper, bx.upper, by.weight * bx.weight),
    ];

    corners
        .iter()
        .filter(|(_, _, w)| *w > 0.0)
        .map(|&(i, j, w)| w * values[[i, j]])
        .sum()
}
