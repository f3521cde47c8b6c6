// Calibration module - control-well series to a partition threshold
//
// This module provides the calibration pipeline:
// 1. stats: population mean / standard deviation of the positive control
// 2. kmeans: two-means clustering of the mixed-positive control
// 3. refinement: false-positive-rate guard over the negative control
// 4. calibrator: name resolution, extraction and the stages above
//
// The calibration workflow:
// 1. Build a ThresholdCalibrator from AppConfig
// 2. Call calibrate() with the export path, well names and control roles
// 3. Use the returned threshold, or calibrate_report() for every stage value

pub mod calibrator;
pub mod kmeans;
pub mod refinement;
pub mod report;
pub mod stats;

pub use calibrator::{
    calibrate, resolve_control_wells, CsvSeriesSource, SeriesSource, ThresholdCalibrator,
};
pub use kmeans::{fit_two_means, TwoMeans};
pub use refinement::{false_positive_rate, FprGuard, GuardOutcome};
pub use report::{CalibrationReport, ReadingCounts, ResolvedControls};
