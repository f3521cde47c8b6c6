//! Integration tests for background calibration jobs
//!
//! These tests verify the job manager plumbing inside a tokio runtime:
//! - Per-job result delivery and status tracking
//! - Job event broadcast (receiver and stream forms)
//! - Cancellation and independent concurrent jobs on one file

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tokio_stream::StreamExt;

use dpcr_threshold::error::CalibrationError;
use dpcr_threshold::managers::JobEvent;
use dpcr_threshold::{
    AppConfig, CalibrationJobManager, CalibrationRequest, CancelFlag, ControlRoles, JobStatus,
};

fn plate_file() -> tempfile::NamedTempFile {
    let mut text = String::from("sep=,\nWell,RFU\n");
    for v in [100.0, 102.0, 98.0, 101.0, 99.0] {
        text.push_str(&format!("A1,{}\n", v));
    }
    for v in [10.0, 12.0, 11.0, 9.0, 200.0, 205.0, 198.0, 210.0] {
        text.push_str(&format!("B1,{}\n", v));
    }
    for i in 0..2_000 {
        text.push_str(&format!("C1,{}\n", 4 + i % 3));
    }
    // Second negative well with a high tail
    for i in 0..2_000 {
        text.push_str(&format!("D1,{}\n", if i < 3 { 300.0 } else { 5.0 }));
    }
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn request(path: &Path, negative: &str) -> CalibrationRequest {
    CalibrationRequest {
        path: path.to_path_buf(),
        names: [("A1", "PC"), ("B1", "MIX"), ("C1", "NC"), ("D1", "NC-hot")]
            .into_iter()
            .collect(),
        roles: ControlRoles::new("PC", "MIX", negative),
    }
}

#[tokio::test]
async fn test_submit_and_wait() {
    let file = plate_file();
    let manager = CalibrationJobManager::new(AppConfig::default());

    let job = manager.submit(request(file.path(), "NC")).unwrap();
    let id = job.id();
    let report = job.wait().await.unwrap();

    assert_eq!(report.threshold, 203.25);
    assert_eq!(
        manager.status(id).unwrap(),
        Some(JobStatus::Completed { threshold: 203.25 })
    );
    assert_eq!(manager.jobs().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_jobs_on_same_file_are_independent() {
    let file = plate_file();
    let manager = CalibrationJobManager::new(AppConfig::default());

    let quiet = manager.submit(request(file.path(), "NC")).unwrap();
    let hot = manager.submit(request(file.path(), "NC-hot")).unwrap();
    assert_ne!(quiet.id(), hot.id());

    let (quiet_id, hot_id) = (quiet.id(), hot.id());
    let quiet = quiet.wait().await.unwrap();
    let hot = hot.wait().await.unwrap();

    assert_eq!(quiet.threshold, 203.25);
    assert!(hot.threshold > 300.0);
    assert_ne!(manager.status(quiet_id).unwrap(), manager.status(hot_id).unwrap());
}

#[tokio::test]
async fn test_events_published_for_each_transition() {
    let file = plate_file();
    let manager = CalibrationJobManager::new(AppConfig::default());
    let mut events = manager.subscribe();

    let job = manager.submit(request(file.path(), "NC")).unwrap();
    let id = job.id();

    let first = events.recv().await.unwrap();
    assert_eq!(
        first,
        JobEvent {
            job: id,
            status: JobStatus::Running,
        }
    );
    let second = tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("job finished")
        .unwrap();
    assert_eq!(second.job, id);
    assert!(matches!(second.status, JobStatus::Completed { .. }));

    job.wait().await.unwrap();
}

#[tokio::test]
async fn test_event_stream_reports_failure() {
    let file = plate_file();
    let manager = CalibrationJobManager::new(AppConfig::default());
    let mut stream = Box::pin(manager.subscribe_stream());

    let job = manager.submit(request(file.path(), "Unknown")).unwrap();
    let id = job.id();

    let mut finished = None;
    while let Some(event) = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .expect("event before timeout")
    {
        if event.job == id && event.status.is_finished() {
            finished = Some(event.status);
            break;
        }
    }

    match finished {
        Some(JobStatus::Failed { code, message }) => {
            assert_eq!(code, 2001);
            assert!(message.contains("Unknown"));
        }
        other => panic!("expected failure event, got {:?}", other),
    }
    assert!(matches!(
        job.wait().await,
        Err(CalibrationError::UnknownControlName { .. })
    ));
}

#[tokio::test]
async fn test_cancelled_job() {
    let file = plate_file();
    let manager = CalibrationJobManager::new(AppConfig::default());
    let cancel = CancelFlag::new();
    cancel.cancel();

    let job = manager
        .submit_with_cancel(request(file.path(), "NC"), cancel)
        .unwrap();
    let id = job.id();

    assert_eq!(job.wait().await.unwrap_err(), CalibrationError::Cancelled);
    assert_eq!(manager.status(id).unwrap(), Some(JobStatus::Cancelled));
}

#[tokio::test]
async fn test_forget_removes_status_only() {
    let file = plate_file();
    let manager = CalibrationJobManager::new(AppConfig::default());

    let job = manager.submit(request(file.path(), "NC")).unwrap();
    let id = job.id();
    manager.forget(id).unwrap();

    assert_eq!(job.wait().await.unwrap().threshold, 203.25);
    assert_eq!(manager.status(id).unwrap(), None);
}
