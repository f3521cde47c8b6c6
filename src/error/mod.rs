// Error types for the dPCR threshold calibrator
//
// This module defines custom error types for partition extraction and threshold
// calibration, providing structured error handling with stable numeric codes
// suitable for CLI exit reporting and job status tables.

mod calibration;
mod extraction;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use extraction::{log_extraction_error, ExtractionError, ExtractionErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the library, the job manager and the CLI.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
