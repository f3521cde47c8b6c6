// Extraction error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Extraction error code constants
///
/// Error code range: 1001-1004
pub struct ExtractionErrorCodes {}

impl ExtractionErrorCodes {
    /// Partition file could not be opened
    pub const FILE_OPEN: i32 = 1001;

    /// Partition file could not be read mid-stream
    pub const READ: i32 = 1002;

    /// Header does not expose a well column and an RFU column
    pub const UNRECOGNIZED_LAYOUT: i32 = 1003;

    /// Extraction was cancelled between batches
    pub const CANCELLED: i32 = 1004;
}

/// Log an extraction error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_extraction_error(err: &ExtractionError, context: &str) {
    error!(
        "Extraction error in {}: code={}, component=PartitionReader, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while streaming a partition-level export
///
/// Row-level problems (blank or non-numeric RFU, short rows) are not errors;
/// the reader skips them and counts them in its statistics.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionError {
    /// File missing or not readable
    FileOpen { path: String, details: String },

    /// I/O failure after the file was opened
    Read {
        path: String,
        line: usize,
        details: String,
    },

    /// No usable well or RFU column in the header
    UnrecognizedLayout { reason: String },

    /// Cancellation flag observed between batches
    Cancelled,
}

impl ErrorCode for ExtractionError {
    fn code(&self) -> i32 {
        match self {
            ExtractionError::FileOpen { .. } => ExtractionErrorCodes::FILE_OPEN,
            ExtractionError::Read { .. } => ExtractionErrorCodes::READ,
            ExtractionError::UnrecognizedLayout { .. } => {
                ExtractionErrorCodes::UNRECOGNIZED_LAYOUT
            }
            ExtractionError::Cancelled => ExtractionErrorCodes::CANCELLED,
        }
    }

    fn message(&self) -> String {
        match self {
            ExtractionError::FileOpen { path, details } => {
                format!("Cannot open partition file {}: {}", path, details)
            }
            ExtractionError::Read {
                path,
                line,
                details,
            } => format!("Failed reading {} at line {}: {}", path, line, details),
            ExtractionError::UnrecognizedLayout { reason } => {
                format!("Unrecognized column layout: {}", reason)
            }
            ExtractionError::Cancelled => "Extraction cancelled".to_string(),
        }
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExtractionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ExtractionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_codes() {
        assert_eq!(
            ExtractionError::FileOpen {
                path: "a.csv".to_string(),
                details: "missing".to_string()
            }
            .code(),
            ExtractionErrorCodes::FILE_OPEN
        );
        assert_eq!(
            ExtractionError::UnrecognizedLayout {
                reason: "no RFU".to_string()
            }
            .code(),
            ExtractionErrorCodes::UNRECOGNIZED_LAYOUT
        );
        assert_eq!(
            ExtractionError::Cancelled.code(),
            ExtractionErrorCodes::CANCELLED
        );
    }

    #[test]
    fn test_extraction_error_messages() {
        let err = ExtractionError::Read {
            path: "plate.csv".to_string(),
            line: 12,
            details: "stream did not contain valid UTF-8".to_string(),
        };
        assert_eq!(
            err.message(),
            "Failed reading plate.csv at line 12: stream did not contain valid UTF-8"
        );

        let display = format!("{}", ExtractionError::Cancelled);
        assert!(display.contains("ExtractionError"));
        assert!(display.contains("1004"));
    }
}
