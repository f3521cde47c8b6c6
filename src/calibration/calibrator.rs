// ThresholdCalibrator - control wells to a single decision threshold
//
// Stages, each depending on the previous:
// 1. Resolve the three control display names to well identifiers
// 2. Extract the three RFU series in one pass over the export
// 3. initial = mean(pc) + k * std(pc)
// 4. refined = max(initial, upper two-means center of mixpc)
// 5. Raise refined until the negative-control false-positive rate is within
//    the limit
//
// Name resolution happens before any file access. No state is kept between
// calls.

use std::collections::HashMap;
use std::path::Path;

use crate::calibration::kmeans::fit_two_means;
use crate::calibration::refinement::FprGuard;
use crate::calibration::report::{CalibrationReport, ReadingCounts, ResolvedControls};
use crate::calibration::stats::{distinct_count, mean_plus_k_sigma};
use crate::cancel::CancelFlag;
use crate::config::{AppConfig, CalibrationConfig, ExtractionConfig};
use crate::error::{log_calibration_error, CalibrationError, ExtractionError};
use crate::extraction::{ExtractedSeries, SeriesExtractor};
use crate::plate::{ControlRole, ControlRoles, WellNameMap};

/// Source of per-well RFU series
///
/// The calibrator reads control data only through this seam.
pub trait SeriesSource {
    /// Collect the series of each well in `wells` from `path`
    fn extract(
        &self,
        path: &Path,
        wells: &[String],
        cancel: &CancelFlag,
    ) -> Result<ExtractedSeries, ExtractionError>;
}

/// Streams series from a partition export on disk
#[derive(Debug, Clone, Default)]
pub struct CsvSeriesSource {
    config: ExtractionConfig,
}

impl CsvSeriesSource {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }
}

impl SeriesSource for CsvSeriesSource {
    fn extract(
        &self,
        path: &Path,
        wells: &[String],
        cancel: &CancelFlag,
    ) -> Result<ExtractedSeries, ExtractionError> {
        SeriesExtractor::new(self.config.clone())
            .with_cancel(cancel.clone())
            .extract(path, wells.iter().cloned())
    }
}

/// Resolve control display names to well identifiers
///
/// Lookup is by exact match against the mapping's values. A name carried by
/// no well or by several wells is rejected.
pub fn resolve_control_wells(
    names: &WellNameMap,
    roles: &ControlRoles,
) -> Result<ResolvedControls, CalibrationError> {
    let mut resolved: [String; 3] = Default::default();
    for (slot, (role, name)) in resolved.iter_mut().zip(roles.iter()) {
        let wells = names.wells_named(name);
        *slot = match wells.as_slice() {
            [] => {
                return Err(CalibrationError::UnknownControlName {
                    role,
                    name: name.to_string(),
                })
            }
            [well] => well.to_string(),
            _ => {
                return Err(CalibrationError::AmbiguousControlName {
                    role,
                    name: name.to_string(),
                    wells: wells.iter().map(|w| w.to_string()).collect(),
                })
            }
        };
    }

    let [positive, mix_positive, negative] = resolved;
    Ok(ResolvedControls {
        positive,
        mix_positive,
        negative,
    })
}

/// Threshold calibration over a pluggable series source
#[derive(Debug, Clone)]
pub struct ThresholdCalibrator<S = CsvSeriesSource> {
    config: CalibrationConfig,
    source: S,
    cancel: CancelFlag,
}

impl ThresholdCalibrator<CsvSeriesSource> {
    /// Calibrator reading partition exports from disk
    pub fn new(config: &AppConfig) -> Self {
        Self::with_source(
            config.calibration.clone(),
            CsvSeriesSource::new(config.extraction.clone()),
        )
    }
}

impl Default for ThresholdCalibrator<CsvSeriesSource> {
    fn default() -> Self {
        Self::new(&AppConfig::default())
    }
}

impl<S: SeriesSource> ThresholdCalibrator<S> {
    pub fn with_source(config: CalibrationConfig, source: S) -> Self {
        Self {
            config,
            source,
            cancel: CancelFlag::new(),
        }
    }

    /// Abort extraction and refinement once `cancel` is set
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Calibrated threshold for the export at `path`
    ///
    /// # Arguments
    /// * `path` - Partition-level export
    /// * `names` - Well identifier to display name mapping
    /// * `roles` - Display names of the positive, mixed-positive and negative
    ///   control wells
    pub fn calibrate<P: AsRef<Path>>(
        &self,
        path: P,
        names: &WellNameMap,
        roles: &ControlRoles,
    ) -> Result<f64, CalibrationError> {
        self.calibrate_report(path, names, roles)
            .map(|report| report.threshold)
    }

    /// Run a calibration and keep every intermediate value
    pub fn calibrate_report<P: AsRef<Path>>(
        &self,
        path: P,
        names: &WellNameMap,
        roles: &ControlRoles,
    ) -> Result<CalibrationReport, CalibrationError> {
        let path = path.as_ref();
        self.run(path, names, roles)
            .inspect_err(|err| log_calibration_error(err, &format!("calibrate {}", path.display())))
    }

    fn run(
        &self,
        path: &Path,
        names: &WellNameMap,
        roles: &ControlRoles,
    ) -> Result<CalibrationReport, CalibrationError> {
        let guard = self.validated_guard()?;
        let controls = resolve_control_wells(names, roles)?;
        tracing::info!(
            "[Calibrator] Controls resolved: positive={} mix_positive={} negative={}",
            controls.positive,
            controls.mix_positive,
            controls.negative
        );

        let extracted = self
            .source
            .extract(path, &controls.distinct_wells(), &self.cancel)?;
        let mut series = extracted.series;
        let pc = take_series(&mut series, &controls, ControlRole::Positive);
        let mix = take_series(&mut series, &controls, ControlRole::MixPositive);
        let nc = take_series(&mut series, &controls, ControlRole::Negative);

        let mut report = self.estimate_with_guard(&guard, &controls, &pc, &mix, &nc)?;
        report.extraction = Some(extracted.stats);
        Ok(report)
    }

    /// Threshold from already-extracted control series
    ///
    /// `controls` only labels errors and the report; no file is read.
    pub fn estimate(
        &self,
        controls: &ResolvedControls,
        pc: &[f64],
        mix: &[f64],
        nc: &[f64],
    ) -> Result<CalibrationReport, CalibrationError> {
        let guard = self.validated_guard()?;
        self.estimate_with_guard(&guard, controls, pc, mix, nc)
    }

    fn estimate_with_guard(
        &self,
        guard: &FprGuard,
        controls: &ResolvedControls,
        pc: &[f64],
        mix: &[f64],
        nc: &[f64],
    ) -> Result<CalibrationReport, CalibrationError> {
        for (role, values) in ControlRole::ALL.into_iter().zip([pc, mix, nc]) {
            if values.is_empty() {
                return Err(CalibrationError::NoValidReadings {
                    role,
                    well: controls.well(role).to_string(),
                });
            }
        }

        let initial = mean_plus_k_sigma(pc, self.config.std_multiplier);
        ensure_finite(initial, "positive-control initial threshold")?;
        tracing::info!(
            "[Calibrator] Initial threshold {} from {} positive readings",
            initial,
            pc.len()
        );

        let fit = fit_two_means(mix, &self.config.kmeans).ok_or_else(|| {
            CalibrationError::DegenerateMixedControl {
                well: controls.mix_positive.clone(),
                distinct: distinct_count(mix),
            }
        })?;
        ensure_finite(fit.lower(), "mixed-control clustering")?;
        ensure_finite(fit.upper(), "mixed-control clustering")?;
        let refined = initial.max(fit.upper());
        tracing::info!(
            "[Calibrator] Mixed-control centers [{}, {}] after {} iterations; refined {}",
            fit.lower(),
            fit.upper(),
            fit.iterations,
            refined
        );

        let outcome = guard.apply(nc, refined, &self.cancel)?;
        ensure_finite(outcome.threshold, "false-positive guard")?;
        tracing::info!(
            "[Calibrator] Threshold {} after {} guard steps (FPR {} over {} negatives)",
            outcome.threshold,
            outcome.steps,
            outcome.false_positive_rate,
            nc.len()
        );

        Ok(CalibrationReport {
            wells: controls.clone(),
            readings: ReadingCounts {
                positive: pc.len(),
                mix_positive: mix.len(),
                negative: nc.len(),
            },
            initial,
            centers: fit.centers,
            refined_before_guard: refined,
            threshold: outcome.threshold,
            refinement_steps: outcome.steps,
            false_positive_rate: outcome.false_positive_rate,
            extraction: None,
        })
    }

    fn validated_guard(&self) -> Result<FprGuard, CalibrationError> {
        if !self.config.std_multiplier.is_finite() {
            return Err(CalibrationError::InvalidConfig {
                reason: format!(
                    "std_multiplier must be finite, got {}",
                    self.config.std_multiplier
                ),
            });
        }
        FprGuard::from_config(&self.config)
    }
}

/// Remove a role's series from the extraction result
///
/// Roles sharing a well get a copy of the same series.
fn take_series(
    series: &mut HashMap<String, Vec<f64>>,
    controls: &ResolvedControls,
    role: ControlRole,
) -> Vec<f64> {
    let well = controls.well(role);
    let shared = ControlRole::ALL
        .into_iter()
        .skip_while(|other| *other != role)
        .skip(1)
        .any(|other| controls.well(other) == well);
    if shared {
        series.get(well).cloned().unwrap_or_default()
    } else {
        series.remove(well).unwrap_or_default()
    }
}

fn ensure_finite(value: f64, stage: &str) -> Result<(), CalibrationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CalibrationError::NonFiniteStatistic {
            stage: stage.to_string(),
        })
    }
}

/// Calibrate with the default configuration
pub fn calibrate<P: AsRef<Path>>(
    path: P,
    names: &WellNameMap,
    roles: &ControlRoles,
) -> Result<f64, CalibrationError> {
    ThresholdCalibrator::default().calibrate(path, names, roles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts extraction calls and serves fixed series
    struct SpySource {
        calls: AtomicUsize,
        series: HashMap<String, Vec<f64>>,
    }

    impl SpySource {
        fn new(series: &[(&str, Vec<f64>)]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                series: series
                    .iter()
                    .map(|(well, values)| (well.to_string(), values.clone()))
                    .collect(),
            }
        }
    }

    impl SeriesSource for SpySource {
        fn extract(
            &self,
            _path: &Path,
            wells: &[String],
            _cancel: &CancelFlag,
        ) -> Result<ExtractedSeries, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let series = wells
                .iter()
                .map(|w| (w.clone(), self.series.get(w).cloned().unwrap_or_default()))
                .collect();
            Ok(ExtractedSeries {
                series,
                stats: Default::default(),
            })
        }
    }

    fn plate_names() -> WellNameMap {
        [("A1", "PC"), ("B1", "MIX"), ("C1", "NC"), ("D1", "Sample")]
            .into_iter()
            .collect()
    }

    fn roles() -> ControlRoles {
        ControlRoles::new("PC", "MIX", "NC")
    }

    fn scenario_series() -> Vec<(&'static str, Vec<f64>)> {
        vec![
            ("A1", vec![100.0, 102.0, 98.0, 101.0, 99.0]),
            ("B1", vec![10.0, 12.0, 11.0, 9.0, 200.0, 205.0, 198.0, 210.0]),
            ("C1", (0..1000).map(|i| 4.0 + (i % 3) as f64).collect()),
        ]
    }

    fn spy_calibrator(series: &[(&str, Vec<f64>)]) -> ThresholdCalibrator<SpySource> {
        ThresholdCalibrator::with_source(CalibrationConfig::default(), SpySource::new(series))
    }

    #[test]
    fn test_resolve_control_wells() {
        let resolved = resolve_control_wells(&plate_names(), &roles()).unwrap();
        assert_eq!(resolved.positive, "A1");
        assert_eq!(resolved.mix_positive, "B1");
        assert_eq!(resolved.negative, "C1");
    }

    #[test]
    fn test_resolution_is_exact_match() {
        let err = resolve_control_wells(&plate_names(), &ControlRoles::new("pc", "MIX", "NC"))
            .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::UnknownControlName {
                role: ControlRole::Positive,
                name: "pc".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_display_name_rejected() {
        let mut names = plate_names();
        names.insert("E1", "NC");
        let err = resolve_control_wells(&names, &roles()).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::AmbiguousControlName {
                role: ControlRole::Negative,
                name: "NC".to_string(),
                wells: vec!["C1".to_string(), "E1".to_string()],
            }
        );
    }

    #[test]
    fn test_unknown_name_never_reaches_source() {
        let calibrator = spy_calibrator(&scenario_series());
        let err = calibrator
            .calibrate(
                "unused.csv",
                &plate_names(),
                &ControlRoles::new("PositiveCtrl", "MIX", "NC"),
            )
            .unwrap_err();

        assert!(matches!(err, CalibrationError::UnknownControlName { .. }));
        assert!(err.to_string().contains("PositiveCtrl"));
        assert_eq!(calibrator.source().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_threshold_from_upper_mixed_center() {
        let calibrator = spy_calibrator(&scenario_series());
        let report = calibrator
            .calibrate_report("unused.csv", &plate_names(), &roles())
            .unwrap();

        assert!((report.initial - 102.828_427_124_746_19).abs() < 1e-9);
        assert_eq!(report.centers, [10.5, 203.25]);
        assert_eq!(report.threshold, 203.25);
        assert_eq!(report.refinement_steps, 0);
        assert_eq!(report.readings.negative, 1000);
        assert_eq!(calibrator.source().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_initial_floor_when_mixed_centers_are_low() {
        let mut series = scenario_series();
        series[1].1 = vec![1.0, 2.0, 3.0, 50.0, 51.0];
        let calibrator = spy_calibrator(&series);
        let report = calibrator
            .calibrate_report("unused.csv", &plate_names(), &roles())
            .unwrap();
        assert_eq!(report.refined_before_guard, report.initial);
        assert!(report.threshold >= report.initial);
    }

    #[test]
    fn test_empty_negative_series_names_well() {
        let mut series = scenario_series();
        series[2].1.clear();
        let err = spy_calibrator(&series)
            .calibrate("unused.csv", &plate_names(), &roles())
            .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::NoValidReadings {
                role: ControlRole::Negative,
                well: "C1".to_string(),
            }
        );
    }

    #[test]
    fn test_constant_mixed_control_is_degenerate() {
        let mut series = scenario_series();
        series[1].1 = vec![7.0; 20];
        let err = spy_calibrator(&series)
            .calibrate("unused.csv", &plate_names(), &roles())
            .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::DegenerateMixedControl {
                well: "B1".to_string(),
                distinct: 1,
            }
        );
    }

    #[test]
    fn test_shared_well_feeds_both_roles() {
        let names: WellNameMap = [("A1", "PC"), ("B1", "CTRL")].into_iter().collect();
        let series = vec![
            ("A1", vec![100.0, 102.0, 98.0, 101.0, 99.0]),
            ("B1", vec![1.0, 2.0, 3.0, 300.0]),
        ];
        let report = spy_calibrator(&series)
            .calibrate_report("unused.csv", &names, &ControlRoles::new("PC", "CTRL", "CTRL"))
            .unwrap();
        assert_eq!(report.readings.mix_positive, 4);
        assert_eq!(report.readings.negative, 4);
        assert!(report.threshold > 300.0);
    }

    #[test]
    fn test_invalid_config_rejected_before_extraction() {
        let config = CalibrationConfig {
            step: 0.0,
            ..CalibrationConfig::default()
        };
        let calibrator =
            ThresholdCalibrator::with_source(config, SpySource::new(&scenario_series()));
        let err = calibrator
            .calibrate("unused.csv", &plate_names(), &roles())
            .unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidConfig { .. }));
        assert_eq!(calibrator.source().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_overflowing_positive_control_is_non_finite() {
        let controls = resolve_control_wells(&plate_names(), &roles()).unwrap();
        let err = spy_calibrator(&[])
            .estimate(&controls, &[f64::MAX, f64::MAX], &[1.0, 2.0], &[0.0])
            .unwrap_err();
        assert!(matches!(err, CalibrationError::NonFiniteStatistic { .. }));
    }
}
