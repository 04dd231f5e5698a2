//! Core of the forecast verification pipeline.
//!
//! Two competing gridded forecasts are compared against reanalysis truth:
//! valid times shared by both forecasts are resolved ([`time_index`]), the
//! truth field is brought onto each forecast's grid ([`align`]), MAE, RMSE and
//! R² are computed over the valid points ([`metrics`]), and the per-time
//! results are reduced to summary statistics ([`summary`]).
//!
//! All inputs are in-memory [`dataset::GriddedDataset`]s supplied by a loading
//! collaborator; nothing in this crate performs I/O apart from reading an
//! optional configuration file.

pub mod align;
pub mod config;
pub mod dataset;
pub mod metrics;
pub mod pipeline;
pub mod series;
pub mod summary;
pub mod time_index;

pub mod errors;

pub use config::PipelineConfig;
pub use errors::{VerifyError, VerifyResult};
pub use pipeline::{ModelId, VerificationPipeline, VerificationResult};
