// Calibration error types and constants

use crate::error::{ErrorCode, ExtractionError};
use crate::plate::ControlRole;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// These constants provide a single source of truth for error codes
/// reported by the CLI and recorded in job status entries.
///
/// Error code range: 2001-2012
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Control role name is not a known well name
    pub const UNKNOWN_CONTROL_NAME: i32 = 2001;

    /// Control role name maps to more than one well identifier
    pub const AMBIGUOUS_CONTROL_NAME: i32 = 2002;

    /// Control well yielded no valid RFU readings
    pub const NO_VALID_READINGS: i32 = 2003;

    /// Partition file could not be streamed
    pub const EXTRACTION: i32 = 2004;

    /// Mixed-positive control has fewer than two distinct values
    pub const DEGENERATE_MIXED_CONTROL: i32 = 2005;

    /// Negative control series is empty at the FPR guard
    pub const EMPTY_NEGATIVE_CONTROL: i32 = 2006;

    /// FPR guard did not converge within the step budget
    pub const REFINEMENT_LIMIT_EXCEEDED: i32 = 2007;

    /// A statistic evaluated to NaN or infinity
    pub const NON_FINITE_STATISTIC: i32 = 2008;

    /// Calibration cancelled by caller
    pub const CANCELLED: i32 = 2009;

    /// Job table lock was poisoned
    pub const STATE_POISONED: i32 = 2010;

    /// Calibration parameters are unusable
    pub const INVALID_CONFIG: i32 = 2011;

    /// Job worker ended without delivering a result
    pub const JOB_LOST: i32 = 2012;
}

/// Log a calibration error with structured context
///
/// This function logs calibration errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=ThresholdCalibrator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// Every error is terminal for the calibration call that produced it; the
/// caller re-invokes with corrected inputs.
///
/// Error code ranges: 2001-2012
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Role name does not appear among the well-name mapping's values
    UnknownControlName { role: ControlRole, name: String },

    /// Role name is shared by several well identifiers
    AmbiguousControlName {
        role: ControlRole,
        name: String,
        wells: Vec<String>,
    },

    /// Resolved control well has zero valid readings
    NoValidReadings { role: ControlRole, well: String },

    /// Streaming the partition file failed
    Extraction(ExtractionError),

    /// Two-means clustering is undefined on this input
    DegenerateMixedControl { well: String, distinct: usize },

    /// FPR denominator is zero
    EmptyNegativeControl,

    /// Step budget exhausted before the FPR target was met
    RefinementLimitExceeded { steps: u64, threshold: f64 },

    /// Mean, deviation or cluster center is not finite
    NonFiniteStatistic { stage: String },

    /// Cancellation flag observed
    Cancelled,

    /// Job table Mutex was poisoned
    StatePoisoned,

    /// Non-positive step, negative FPR limit or similar
    InvalidConfig { reason: String },

    /// Worker dropped its result channel
    JobLost,
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::UnknownControlName { .. } => {
                CalibrationErrorCodes::UNKNOWN_CONTROL_NAME
            }
            CalibrationError::AmbiguousControlName { .. } => {
                CalibrationErrorCodes::AMBIGUOUS_CONTROL_NAME
            }
            CalibrationError::NoValidReadings { .. } => CalibrationErrorCodes::NO_VALID_READINGS,
            CalibrationError::Extraction(_) => CalibrationErrorCodes::EXTRACTION,
            CalibrationError::DegenerateMixedControl { .. } => {
                CalibrationErrorCodes::DEGENERATE_MIXED_CONTROL
            }
            CalibrationError::EmptyNegativeControl => CalibrationErrorCodes::EMPTY_NEGATIVE_CONTROL,
            CalibrationError::RefinementLimitExceeded { .. } => {
                CalibrationErrorCodes::REFINEMENT_LIMIT_EXCEEDED
            }
            CalibrationError::NonFiniteStatistic { .. } => {
                CalibrationErrorCodes::NON_FINITE_STATISTIC
            }
            CalibrationError::Cancelled => CalibrationErrorCodes::CANCELLED,
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
            CalibrationError::InvalidConfig { .. } => CalibrationErrorCodes::INVALID_CONFIG,
            CalibrationError::JobLost => CalibrationErrorCodes::JOB_LOST,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::UnknownControlName { role, name } => format!(
                "{} control well name '{}' is not in the list of provided well names",
                role.display_name(),
                name
            ),
            CalibrationError::AmbiguousControlName { role, name, wells } => format!(
                "{} control well name '{}' is assigned to several wells ({})",
                role.display_name(),
                name,
                wells.join(", ")
            ),
            CalibrationError::NoValidReadings { role, well } => format!(
                "{} control well {} has no valid RFU readings",
                role.display_name(),
                well
            ),
            CalibrationError::Extraction(err) => err.message(),
            CalibrationError::DegenerateMixedControl { well, distinct } => format!(
                "Mixed positive control well {} has {} distinct RFU value(s); two clusters need at least 2",
                well, distinct
            ),
            CalibrationError::EmptyNegativeControl => {
                "Negative control series is empty; false-positive rate is undefined".to_string()
            }
            CalibrationError::RefinementLimitExceeded { steps, threshold } => format!(
                "False-positive guard did not converge after {} steps (threshold reached {})",
                steps, threshold
            ),
            CalibrationError::NonFiniteStatistic { stage } => {
                format!("Non-finite value produced during {}", stage)
            }
            CalibrationError::Cancelled => "Calibration cancelled".to_string(),
            CalibrationError::StatePoisoned => "Calibration job table lock poisoned".to_string(),
            CalibrationError::InvalidConfig { reason } => {
                format!("Invalid calibration config: {}", reason)
            }
            CalibrationError::JobLost => {
                "Calibration job ended without reporting a result".to_string()
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CalibrationError::Extraction(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ExtractionError> for CalibrationError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::Cancelled => CalibrationError::Cancelled,
            other => CalibrationError::Extraction(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_error_codes() {
        assert_eq!(
            CalibrationError::UnknownControlName {
                role: ControlRole::Positive,
                name: "PC".to_string()
            }
            .code(),
            CalibrationErrorCodes::UNKNOWN_CONTROL_NAME
        );
        assert_eq!(
            CalibrationError::NoValidReadings {
                role: ControlRole::Negative,
                well: "C1".to_string()
            }
            .code(),
            CalibrationErrorCodes::NO_VALID_READINGS
        );
        assert_eq!(
            CalibrationError::EmptyNegativeControl.code(),
            CalibrationErrorCodes::EMPTY_NEGATIVE_CONTROL
        );
        assert_eq!(
            CalibrationError::Cancelled.code(),
            CalibrationErrorCodes::CANCELLED
        );
        assert_eq!(
            CalibrationError::StatePoisoned.code(),
            CalibrationErrorCodes::STATE_POISONED
        );
    }

    #[test]
    fn test_calibration_error_messages() {
        let err = CalibrationError::UnknownControlName {
            role: ControlRole::Positive,
            name: "PositiveCtrl".to_string(),
        };
        assert_eq!(
            err.message(),
            "Positive control well name 'PositiveCtrl' is not in the list of provided well names"
        );

        let err = CalibrationError::NoValidReadings {
            role: ControlRole::Negative,
            well: "H3".to_string(),
        };
        assert!(err.message().contains("Negative"));
        assert!(err.message().contains("H3"));

        let err = CalibrationError::AmbiguousControlName {
            role: ControlRole::MixPositive,
            name: "mix".to_string(),
            wells: vec!["A1".to_string(), "B1".to_string()],
        };
        assert!(err.message().contains("A1, B1"));
    }

    #[test]
    fn test_extraction_errors_convert() {
        let err: CalibrationError = ExtractionError::UnrecognizedLayout {
            reason: "no RFU column".to_string(),
        }
        .into();
        assert_eq!(err.code(), CalibrationErrorCodes::EXTRACTION);
        assert!(std::error::Error::source(&err).is_some());

        let err: CalibrationError = ExtractionError::Cancelled.into();
        assert_eq!(err, CalibrationError::Cancelled);
    }

    #[test]
    fn test_calibration_error_display() {
        let err = CalibrationError::EmptyNegativeControl;
        let display = format!("{}", err);
        assert!(display.contains("CalibrationError"));
        assert!(display.contains(&err.code().to_string()));
    }
}
