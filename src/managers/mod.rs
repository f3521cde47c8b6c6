// Managers Module
//
// Focused manager types, each owning one concern:
// - CalibrationJobManager: background calibration jobs, status table and
//   job event broadcast

pub mod job_manager;

pub use job_manager::{
    CalibrationJob, CalibrationJobManager, CalibrationRequest, JobEvent, JobId, JobStatus,
};
