// CalibrationJobManager: background calibration jobs
// Single Responsibility: job submission, status tracking and event broadcast
//
// Each submission gets an opaque JobId and its own result channel, so
// concurrent calibrations of the same file never share state.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::calibration::{CalibrationReport, ThresholdCalibrator};
use crate::cancel::CancelFlag;
use crate::config::AppConfig;
use crate::error::{log_calibration_error, CalibrationError, ErrorCode};
use crate::plate::{ControlRoles, WellNameMap};

/// Opaque job identifier, unique per manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Inputs of one calibration
#[derive(Debug, Clone)]
pub struct CalibrationRequest {
    pub path: PathBuf,
    pub names: WellNameMap,
    pub roles: ControlRoles,
}

/// Lifecycle state of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed { threshold: f64 },
    Failed { code: i32, message: String },
    Cancelled,
}

impl JobStatus {
    fn from_result(result: &Result<CalibrationReport, CalibrationError>) -> Self {
        match result {
            Ok(report) => JobStatus::Completed {
                threshold: report.threshold,
            },
            Err(CalibrationError::Cancelled) => JobStatus::Cancelled,
            Err(err) => JobStatus::Failed {
                code: err.code(),
                message: err.message(),
            },
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Status change published on the event channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job: JobId,
    pub status: JobStatus,
}

/// Handle to one submitted calibration
#[derive(Debug)]
pub struct CalibrationJob {
    id: JobId,
    cancel: CancelFlag,
    result: oneshot::Receiver<Result<CalibrationReport, CalibrationError>>,
}

impl CalibrationJob {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Request cancellation; the job ends with `CalibrationError::Cancelled`
    /// at its next check
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Wait for the job's result
    pub async fn wait(self) -> Result<CalibrationReport, CalibrationError> {
        self.result.await.unwrap_or(Err(CalibrationError::JobLost))
    }

    /// Block the current thread until the job finishes
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait_blocking(self) -> Result<CalibrationReport, CalibrationError> {
        self.result
            .blocking_recv()
            .unwrap_or(Err(CalibrationError::JobLost))
    }
}

struct JobEntry {
    status: JobStatus,
    cancel: CancelFlag,
}

type JobTable = Arc<Mutex<HashMap<JobId, JobEntry>>>;

/// Runs calibrations off the caller's thread
///
/// Jobs run on tokio's blocking pool when called inside a runtime, otherwise
/// on a dedicated thread.
///
/// Finished jobs stay in the status table until removed with [`forget`] or
/// [`prune_finished`]; long-lived managers should prune periodically.
///
/// [`forget`]: CalibrationJobManager::forget
/// [`prune_finished`]: CalibrationJobManager::prune_finished
///
/// # Example
/// ```ignore
/// let manager = CalibrationJobManager::new(AppConfig::default());
/// let job = manager.submit(request)?;
/// let report = job.wait().await?;
/// ```
pub struct CalibrationJobManager {
    config: AppConfig,
    next_id: AtomicU64,
    jobs: JobTable,
    events: broadcast::Sender<JobEvent>,
}

impl CalibrationJobManager {
    pub fn new(config: AppConfig) -> Self {
        let (events, _) = broadcast::channel(config.jobs.progress_buffer.max(1));
        Self {
            config,
            next_id: AtomicU64::new(1),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // ========================================================================
    // SUBMISSION
    // ========================================================================

    /// Start a calibration in the background
    ///
    /// # Returns
    /// * `Ok(CalibrationJob)` - Handle carrying the job id, cancel flag and
    ///   result channel
    /// * `Err(CalibrationError)` - Job table poisoned or no worker could start
    pub fn submit(&self, request: CalibrationRequest) -> Result<CalibrationJob, CalibrationError> {
        self.submit_with_cancel(request, CancelFlag::new())
    }

    /// Start a calibration observing an existing cancel flag
    pub fn submit_with_cancel(
        &self,
        request: CalibrationRequest,
        cancel: CancelFlag,
    ) -> Result<CalibrationJob, CalibrationError> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_jobs()?.insert(
            id,
            JobEntry {
                status: JobStatus::Running,
                cancel: cancel.clone(),
            },
        );
        self.publish(id, JobStatus::Running);
        tracing::info!("[Jobs] {} submitted for {}", id, request.path.display());

        let (tx, rx) = oneshot::channel();
        let calibrator = ThresholdCalibrator::new(&self.config).with_cancel(cancel.clone());
        let jobs = Arc::clone(&self.jobs);
        let events = self.events.clone();

        let work = move || {
            let result =
                calibrator.calibrate_report(&request.path, &request.names, &request.roles);
            let status = JobStatus::from_result(&result);
            match jobs.lock() {
                Ok(mut table) => {
                    if let Some(entry) = table.get_mut(&id) {
                        entry.status = status.clone();
                    }
                }
                Err(_) => log_calibration_error(&CalibrationError::StatePoisoned, "job_finish"),
            }
            tracing::info!("[Jobs] {} finished: {:?}", id, status);
            let _ = events.send(JobEvent { job: id, status });
            // Receiver may have been dropped; the status table still has the outcome
            let _ = tx.send(result);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(work);
            }
            Err(_) => {
                if let Err(err) = std::thread::Builder::new()
                    .name(format!("calibration-{}", id))
                    .spawn(work)
                {
                    tracing::error!("[Jobs] Failed to spawn worker for {}: {}", id, err);
                    self.lock_jobs()?.remove(&id);
                    return Err(CalibrationError::JobLost);
                }
            }
        }

        Ok(CalibrationJob {
            id,
            cancel,
            result: rx,
        })
    }

    // ========================================================================
    // STATUS TABLE
    // ========================================================================

    /// Current status of a job, `None` if unknown or forgotten
    pub fn status(&self, id: JobId) -> Result<Option<JobStatus>, CalibrationError> {
        Ok(self.lock_jobs()?.get(&id).map(|entry| entry.status.clone()))
    }

    /// All tracked jobs, ordered by id
    pub fn jobs(&self) -> Result<Vec<(JobId, JobStatus)>, CalibrationError> {
        let table = self.lock_jobs()?;
        let mut jobs: Vec<(JobId, JobStatus)> = table
            .iter()
            .map(|(id, entry)| (*id, entry.status.clone()))
            .collect();
        jobs.sort_by_key(|(id, _)| *id);
        Ok(jobs)
    }

    /// Set the cancel flag of a tracked job
    ///
    /// Returns `false` when the job is unknown.
    pub fn cancel(&self, id: JobId) -> Result<bool, CalibrationError> {
        match self.lock_jobs()?.get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop a job from the status table, returning its last status
    ///
    /// A running job keeps running; its result is still delivered to its
    /// handle.
    pub fn forget(&self, id: JobId) -> Result<Option<JobStatus>, CalibrationError> {
        Ok(self.lock_jobs()?.remove(&id).map(|entry| entry.status))
    }

    /// Drop every finished job from the status table
    ///
    /// Running jobs are kept. Returns the number of entries removed.
    pub fn prune_finished(&self) -> Result<usize, CalibrationError> {
        let mut table = self.lock_jobs()?;
        let before = table.len();
        table.retain(|_, entry| !entry.status.is_finished());
        let removed = before - table.len();
        if removed > 0 {
            tracing::debug!("[Jobs] Pruned {} finished jobs", removed);
        }
        Ok(removed)
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    /// Subscribe to job status changes
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Job status changes as a stream; events missed by a lagging
    /// subscriber are skipped
    pub fn subscribe_stream(&self) -> impl Stream<Item = JobEvent> {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| event.ok())
    }

    fn publish(&self, job: JobId, status: JobStatus) {
        // No subscribers is not an error
        let _ = self.events.send(JobEvent { job, status });
    }

    fn lock_jobs(&self) -> Result<MutexGuard<'_, HashMap<JobId, JobEntry>>, CalibrationError> {
        self.jobs.lock().map_err(|_| CalibrationError::StatePoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn plate_file() -> tempfile::NamedTempFile {
        let mut text = String::from("sep=,\nWell,RFU\n");
        for v in [100.0, 102.0, 98.0, 101.0, 99.0] {
            text.push_str(&format!("A1,{}\n", v));
        }
        for v in [10.0, 12.0, 11.0, 9.0, 200.0, 205.0, 198.0, 210.0] {
            text.push_str(&format!("B1,{}\n", v));
        }
        for i in 0..100 {
            text.push_str(&format!("C1,{}\n", 4 + i % 3));
        }
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn request(path: &std::path::Path, positive: &str) -> CalibrationRequest {
        CalibrationRequest {
            path: path.to_path_buf(),
            names: [("A1", "PC"), ("B1", "MIX"), ("C1", "NC")]
                .into_iter()
                .collect(),
            roles: ControlRoles::new(positive, "MIX", "NC"),
        }
    }

    #[test]
    fn test_job_ids_are_unique() {
        let file = plate_file();
        let manager = CalibrationJobManager::new(AppConfig::default());
        let a = manager.submit(request(file.path(), "PC")).unwrap();
        let b = manager.submit(request(file.path(), "PC")).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.wait_blocking().unwrap().threshold, 203.25);
        assert_eq!(b.wait_blocking().unwrap().threshold, 203.25);
    }

    #[test]
    fn test_status_recorded_without_runtime() {
        let file = plate_file();
        let manager = CalibrationJobManager::new(AppConfig::default());
        let job = manager.submit(request(file.path(), "Missing")).unwrap();
        let id = job.id();

        let err = job.wait_blocking().unwrap_err();
        assert!(matches!(err, CalibrationError::UnknownControlName { .. }));
        match manager.status(id).unwrap() {
            Some(JobStatus::Failed { code, .. }) => assert_eq!(code, 2001),
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[test]
    fn test_forget_and_cancel_unknown() {
        let manager = CalibrationJobManager::new(AppConfig::default());
        assert_eq!(manager.forget(JobId(42)).unwrap(), None);
        assert!(!manager.cancel(JobId(42)).unwrap());
        assert!(manager.jobs().unwrap().is_empty());
    }

    #[test]
    fn test_prune_finished_keeps_running_jobs() {
        let file = plate_file();
        let manager = CalibrationJobManager::new(AppConfig::default());
        let done = manager.submit(request(file.path(), "PC")).unwrap();
        let failed = manager.submit(request(file.path(), "Missing")).unwrap();
        let done_id = done.id();
        done.wait_blocking().unwrap();
        failed.wait_blocking().unwrap_err();

        // A running entry, inserted directly so it cannot finish under the test
        manager.lock_jobs().unwrap().insert(
            JobId(999),
            JobEntry {
                status: JobStatus::Running,
                cancel: CancelFlag::new(),
            },
        );

        assert_eq!(manager.prune_finished().unwrap(), 2);
        assert_eq!(manager.status(done_id).unwrap(), None);
        assert_eq!(
            manager.jobs().unwrap(),
            vec![(JobId(999), JobStatus::Running)]
        );
        assert_eq!(manager.prune_finished().unwrap(), 0);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&JobStatus::Completed { threshold: 1.5 }).unwrap();
        assert_eq!(json, r#"{"state":"completed","threshold":1.5}"#);
        assert!(!JobStatus::Running.is_finished());
        assert!(JobStatus::Cancelled.is_finished());
    }
}
