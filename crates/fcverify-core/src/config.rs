//! Pipeline configuration
//!
//! [`PipelineConfig`] is a plain serde struct so it can be embedded in a larger
//! configuration file or loaded on its own from TOML:
//!
//! ```toml
//! truth_tolerance_seconds = 3600
//! interpolation = "nearest"
//! variable_aliases = ["t2m", "2t"]
//! workers = 4
//! ```
//!
//! The truth tolerance has no default. Pairing a forecast with a truth field
//! an arbitrary distance away in time would silently compare unrelated
//! states, so every configuration must choose a bound.

use crate::align::Interpolation;
use crate::errors::{VerifyError, VerifyResult};
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_variable_aliases() -> Vec<String> {
    vec!["t2m".to_string(), "2t".to_string()]
}

fn default_workers() -> usize {
    1
}

fn default_units() -> String {
    "K".to_string()
}

fn default_primary_name() -> String {
    "IFS".to_string()
}

fn default_alternate_name() -> String {
    "AIFS".to_string()
}

/// Settings for a [`VerificationPipeline`](crate::pipeline::VerificationPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum distance between a forecast valid time and the truth time it
    /// is paired with, in seconds.
    pub truth_tolerance_seconds: i64,

    /// Resampling method used when truth and forecast grids differ.
    ///
    /// Default: bilinear
    #[serde(default)]
    pub interpolation: Interpolation,

    /// Accepted names of the verified variable in the forecast datasets, in
    /// order of preference.
    ///
    /// Default: `["t2m", "2t"]`
    #[serde(default = "default_variable_aliases")]
    pub variable_aliases: Vec<String>,

    /// Accepted variable names in the truth dataset. Falls back to
    /// `variable_aliases` when unset.
    #[serde(default)]
    pub truth_variable_aliases: Option<Vec<String>>,

    /// Size of the worker pool for per-time verification. `1` runs
    /// sequentially on the calling thread.
    ///
    /// Default: 1
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Unit of the verified variable, used for reporting.
    ///
    /// Default: `"K"`
    #[serde(default = "default_units")]
    pub units: String,

    /// Display name of the primary forecast model.
    ///
    /// Default: `"IFS"`
    #[serde(default = "default_primary_name")]
    pub primary_name: String,

    /// Display name of the alternate forecast model.
    ///
    /// Default: `"AIFS"`
    #[serde(default = "default_alternate_name")]
    pub alternate_name: String,
}

impl PipelineConfig {
    /// Configuration with the given truth tolerance and defaults elsewhere.
    pub fn new(truth_tolerance: TimeDelta) -> Self {
        Self {
            truth_tolerance_seconds: truth_tolerance.num_seconds(),
            interpolation: Interpolation::default(),
            variable_aliases: default_variable_aliases(),
            truth_variable_aliases: None,
            workers: default_workers(),
            units: default_units(),
            primary_name: default_primary_name(),
            alternate_name: default_alternate_name(),
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_variable_aliases(mut self, aliases: &[&str]) -> Self {
        self.variable_aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_truth_variable_aliases(mut self, aliases: &[&str]) -> Self {
        self.truth_variable_aliases = Some(aliases.iter().map(|a| a.to_string()).collect());
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> VerifyResult<Self> {
        let config: PipelineConfig = toml::from_str(source)
            .map_err(|e| VerifyError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> VerifyResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            VerifyError::Configuration(format!("could not read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> VerifyResult<String> {
        toml::to_string(self).map_err(|e| {
            VerifyError::Configuration(format!("could not serialise configuration: {e}"))
        })
    }

    pub fn validate(&self) -> VerifyResult<()> {
        if self.truth_tolerance_seconds < 0 {
            return Err(VerifyError::Configuration(format!(
                "truth_tolerance_seconds must not be negative, got {}",
                self.truth_tolerance_seconds
            )));
        }
        self.truth_tolerance()?;
        if self.workers == 0 {
            return Err(VerifyError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.variable_aliases.is_empty() {
            return Err(VerifyError::Configuration(
                "variable_aliases must name at least one variable".to_string(),
            ));
        }
        if matches!(&self.truth_variable_aliases, Some(aliases) if aliases.is_empty()) {
            return Err(VerifyError::Configuration(
                "truth_variable_aliases must name at least one variable".to_string(),
            ));
        }
        Ok(())
    }

    /// The truth tolerance as a duration. Fails if it is out of range.
    pub fn truth_tolerance(&self) -> VerifyResult<TimeDelta> {
        TimeDelta::try_seconds(self.truth_tolerance_seconds).ok_or_else(|| {
            VerifyError::Configuration(format!(
                "truth_tolerance_seconds {} is out of range",
                self.truth_tolerance_seconds
            ))
        })
    }

    /// Aliases used to resolve the truth variable.
    pub fn truth_aliases(&self) -> &[String] {
        self.truth_variable_aliases
            .as_deref()
            .unwrap_or(&self.variable_aliases)
    }
}
