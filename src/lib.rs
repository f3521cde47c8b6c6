// dPCR Threshold Calibration Core
// Streaming partition extraction and control-well threshold calibration

// Module declarations
pub mod calibration;
pub mod cancel;
pub mod classification;
pub mod config;
pub mod error;
pub mod extraction;
pub mod managers;
pub mod plate;

// Re-exports for convenience
pub use calibration::{calibrate, CalibrationReport, ThresholdCalibrator};
pub use cancel::CancelFlag;
pub use classification::{classify_wells, WellClassification};
pub use config::AppConfig;
pub use error::{CalibrationError, ErrorCode, ExtractionError};
pub use extraction::{extract_series, ExtractionStats};
pub use managers::{CalibrationJob, CalibrationJobManager, CalibrationRequest, JobId, JobStatus};
pub use plate::{ControlRole, ControlRoles, WellNameMap};

/// Install a `tracing` fmt subscriber at `level`, writing to stderr
///
/// `log` records are forwarded to the same subscriber. Calling this more than
/// once is harmless; only the first subscriber is kept.
pub fn init_logging(level: tracing::Level) {
    if tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
    {
        log::debug!("[Logging] Initialized at {}", level);
    }
}
