// CalibrationReport - intermediate values of one calibration run
//
// The threshold is the only output the calibration contract requires; the
// report keeps every stage's value alongside it so a run can be audited or
// serialized next to the plate export.

use serde::{Deserialize, Serialize};

use crate::extraction::ExtractionStats;
use crate::plate::ControlRole;

/// Well identifiers resolved for the three control roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedControls {
    pub positive: String,
    pub mix_positive: String,
    pub negative: String,
}

impl ResolvedControls {
    pub fn well(&self, role: ControlRole) -> &str {
        match role {
            ControlRole::Positive => &self.positive,
            ControlRole::MixPositive => &self.mix_positive,
            ControlRole::Negative => &self.negative,
        }
    }

    /// Distinct identifiers in role order
    ///
    /// Two roles may name the same well; the well is then read once.
    pub fn distinct_wells(&self) -> Vec<String> {
        let mut wells: Vec<String> = Vec::with_capacity(3);
        for role in ControlRole::ALL {
            let well = self.well(role);
            if !wells.iter().any(|w| w == well) {
                wells.push(well.to_string());
            }
        }
        wells
    }
}

/// Valid readings per control series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingCounts {
    pub positive: usize,
    pub mix_positive: usize,
    pub negative: usize,
}

/// Full record of a calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub wells: ResolvedControls,
    pub readings: ReadingCounts,
    /// `mean(pc) + k * std(pc)`
    pub initial: f64,
    /// Two-means centers of the mixed-positive control, ascending
    pub centers: [f64; 2],
    /// `max(initial, centers[1])`
    pub refined_before_guard: f64,
    /// Calibrated threshold
    pub threshold: f64,
    /// Increments applied by the false-positive guard
    pub refinement_steps: u64,
    /// Negative-control false-positive rate at `threshold`
    pub false_positive_rate: f64,
    /// Extraction pass statistics, when the series were read from a file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionStats>,
}
