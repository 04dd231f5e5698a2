//! End-to-end verification tests.
//!
//! These tests build in-memory datasets the way a loading collaborator would
//! and run the full pipeline: time resolution, regridding, metrics and
//! summaries.

use approx::assert_relative_eq;
use chrono::TimeDelta;
use fcverify_core::align::Interpolation;
use fcverify_core::dataset::{Coordinates, GriddedDataset, GriddedField, TimeLabel};
use fcverify_core::metrics::{compute_fields, Metric};
use fcverify_core::summary::summarize;
use fcverify_core::{ModelId, PipelineConfig, VerificationPipeline, VerifyError};
use ndarray::{array, Array3};
use std::sync::Arc;

fn at(day: u32, hour: u32) -> TimeLabel {
    TimeLabel::from_ymd_hms(2024, 6, day, hour, 0, 0).unwrap()
}

const TRUTH_LAT: [f64; 5] = [51.0, 50.5, 50.0, 49.5, 49.0];
const TRUTH_LON: [f64; 6] = [-1.0, -0.5, 0.0, 0.5, 1.0, 1.5];
const FORECAST_LAT: [f64; 2] = [50.0, 49.0];
const FORECAST_LON: [f64; 3] = [0.0, 1.0, 2.0];

/// Analytic temperature field shared by truth and forecasts.
fn temperature(lat: f64, lon: f64, time: TimeLabel) -> f64 {
    let hour = time.datetime().and_utc().timestamp() as f64 / 3600.0;
    280.0 + 2.0 * lat - 0.5 * lon + (hour % 24.0) * 0.25
}

/// Hourly ERA5-like truth on a larger, descending-latitude grid.
fn truth_dataset() -> GriddedDataset {
    let times: Vec<TimeLabel> = (0..24).map(|h| at(1, h)).chain([at(2, 0)]).collect();
    let cube = Array3::from_shape_fn((times.len(), TRUTH_LAT.len(), TRUTH_LON.len()), |(t, i, j)| {
        temperature(TRUTH_LAT[i], TRUTH_LON[j], times[t])
    });
    GriddedDataset::builder("ERA5")
        .time_coordinate("valid_time", times)
        .latitude(TRUTH_LAT.to_vec())
        .longitude(TRUTH_LON.to_vec())
        .variable("t2m", cube)
        .build()
        .unwrap()
}

fn forecast_dataset(name: &str, variable: &str, times: Vec<TimeLabel>, bias: f64) -> GriddedDataset {
    let cube = Array3::from_shape_fn(
        (times.len(), FORECAST_LAT.len(), FORECAST_LON.len()),
        |(t, i, j)| temperature(FORECAST_LAT[i], FORECAST_LON[j], times[t]) + bias,
    );
    GriddedDataset::builder(name)
        .time_coordinate("time", times)
        .latitude(FORECAST_LAT.to_vec())
        .longitude(FORECAST_LON.to_vec())
        .variable(variable, cube)
        .build()
        .unwrap()
}

#[test]
fn test_two_models_against_reanalysis() {
    let primary = forecast_dataset("IFS", "t2m", vec![at(1, 0), at(1, 6), at(1, 12), at(1, 18)], 0.0);
    let alternate = forecast_dataset("AIFS", "2t", vec![at(1, 6), at(1, 12), at(1, 18), at(2, 0)], 0.5);
    let truth = truth_dataset();

    let config = PipelineConfig::new(TimeDelta::minutes(30));
    let pipeline = VerificationPipeline::from_datasets(&primary, &alternate, &truth, &config).unwrap();
    let result = pipeline.run().unwrap();

    assert_eq!(result.times(), &[at(1, 6), at(1, 12), at(1, 18)]);
    for record in result.records(ModelId::Primary) {
        // the lon = 2.0 column lies outside the truth envelope
        assert_eq!(record.n_valid, 4);
        assert_relative_eq!(record.mae, 0.0, epsilon = 1e-9);
        assert_relative_eq!(record.r2, 1.0, epsilon = 1e-9);
    }
    for record in result.records(ModelId::Alternate) {
        assert_eq!(record.n_valid, 4);
        assert_relative_eq!(record.mae, 0.5, epsilon = 1e-9);
        assert_relative_eq!(record.rmse, 0.5, epsilon = 1e-9);
        assert!(record.r2 < 1.0);
    }

    let summary = summarize(&result).unwrap();
    assert_eq!(summary.primary.count, 3);
    assert_relative_eq!(summary.alternate.mae.mean, 0.5, epsilon = 1e-9);
    assert_relative_eq!(summary.alternate.mae.std, 0.0, epsilon = 1e-9);
    assert_relative_eq!(summary.get(ModelId::Primary).rmse.mean, 0.0, epsilon = 1e-9);

    let plotted = result.series(ModelId::Alternate, Metric::Rmse);
    assert_eq!(plotted.len(), 3);
    assert_eq!(plotted[0].0, at(1, 6));
}

#[test]
fn test_parallel_nearest_matches_sequential() {
    let times: Vec<TimeLabel> = (0..24).map(|h| at(1, h)).collect();
    let primary = forecast_dataset("IFS", "t2m", times.clone(), 1.0);
    let alternate = forecast_dataset("AIFS", "t2m", times, -1.0);
    let truth = truth_dataset();

    let base = PipelineConfig::new(TimeDelta::zero()).with_interpolation(Interpolation::Nearest);
    let sequential = VerificationPipeline::from_datasets(&primary, &alternate, &truth, &base)
        .unwrap()
        .run()
        .unwrap();
    let parallel =
        VerificationPipeline::from_datasets(&primary, &alternate, &truth, &base.with_workers(3))
            .unwrap()
            .run()
            .unwrap();

    assert_eq!(sequential, parallel);
    assert_eq!(parallel.len(), 24);
}

#[test]
fn test_truth_tolerance_is_enforced() {
    // forecast valid at 00:30, truth is hourly
    let half_past = at(1, 0).shifted(TimeDelta::minutes(30)).unwrap();
    let primary = forecast_dataset("IFS", "t2m", vec![half_past], 0.0);
    let alternate = forecast_dataset("AIFS", "t2m", vec![half_past], 0.0);
    let truth = truth_dataset();

    let strict = PipelineConfig::new(TimeDelta::minutes(10));
    let err = VerificationPipeline::from_datasets(&primary, &alternate, &truth, &strict)
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err.root(), VerifyError::TruthOutOfTolerance { .. }));

    let relaxed = PipelineConfig::new(TimeDelta::minutes(30));
    let result = VerificationPipeline::from_datasets(&primary, &alternate, &truth, &relaxed)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(result.len(), 1);
}

#[test]
fn test_missing_slice_raised_for_declared_time() {
    let primary = forecast_dataset("IFS", "t2m", vec![at(1, 0), at(1, 12)], 0.0);
    let alternate = forecast_dataset("AIFS", "t2m", vec![at(1, 0), at(1, 6), at(1, 12)], 0.0);
    let truth = truth_dataset();
    let config = PipelineConfig::new(TimeDelta::zero());

    let pipeline = VerificationPipeline::from_datasets(&primary, &alternate, &truth, &config).unwrap();
    let err = pipeline.run_over(&[at(1, 0), at(1, 6), at(1, 12)]).unwrap_err();

    assert_eq!(
        err.root(),
        &VerifyError::MissingSlice {
            model: ModelId::Primary,
            time: at(1, 6),
        }
    );
}

#[test]
fn test_unidentifiable_sources_fail_configuration() {
    let truth = truth_dataset();
    let primary = GriddedDataset::builder("IFS")
        .time_coordinate("step", vec![at(1, 0)])
        .latitude(FORECAST_LAT.to_vec())
        .longitude(FORECAST_LON.to_vec())
        .variable("t2m", Array3::zeros((1, 2, 3)))
        .build()
        .unwrap();
    let alternate = forecast_dataset("AIFS", "t2m", vec![at(1, 0)], 0.0);
    let config = PipelineConfig::new(TimeDelta::zero());

    let err = VerificationPipeline::from_datasets(&primary, &alternate, &truth, &config).unwrap_err();
    assert!(matches!(err, VerifyError::Configuration(_)));

    let renamed = forecast_dataset("AIFS", "tas", vec![at(1, 0)], 0.0);
    let err = VerificationPipeline::from_datasets(&alternate, &renamed, &truth, &config).unwrap_err();
    assert!(err.to_string().contains("tas"));
}

#[test]
fn test_reference_grids() {
    let time = at(1, 0);
    let coords = Arc::new(Coordinates::new(array![50.0, 49.0], array![0.0, 1.0]));
    let forecast = GriddedField::new(time, coords.clone(), array![[10.0, 12.0], [11.0, 9.0]]).unwrap();

    // Differences 0, -1, 0, -1
    let truth = GriddedField::new(time, coords.clone(), array![[10.0, 13.0], [11.0, 10.0]]).unwrap();
    let record = compute_fields(&forecast, &truth).unwrap();
    assert_relative_eq!(record.mae, 0.5);
    assert_relative_eq!(record.rmse, 0.5f64.sqrt());

    // Differences 0, -1, -1, -1
    let truth = GriddedField::new(time, coords, array![[10.0, 13.0], [12.0, 10.0]]).unwrap();
    let record = compute_fields(&forecast, &truth).unwrap();
    assert_relative_eq!(record.mae, 0.75);
    assert_relative_eq!(record.rmse, 0.866, epsilon = 1e-3);
}
