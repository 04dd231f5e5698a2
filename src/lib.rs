//! Verification of two competing gridded forecasts against reanalysis truth.
//!
//! This crate re-exports the verification core and adds the textual
//! [`report`] of a run.
//!
//! ```rust,ignore
//! use fcverify::{summary::summarize, PipelineConfig, VerificationPipeline};
//!
//! let config = PipelineConfig::from_path("verification.toml")?;
//! let pipeline = VerificationPipeline::from_datasets(&ifs, &aifs, &era5, &config)?;
//! let result = pipeline.run()?;
//! let labels = fcverify::report::ReportLabels::from_config(&config);
//! println!("{}", fcverify::report::render_summary(&summarize(&result)?, &labels));
//! ```

pub mod report;

pub use fcverify_core::*;
