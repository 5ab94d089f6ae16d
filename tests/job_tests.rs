//! Integration tests for job submission orchestration.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use panoscan::error::ScanError;
use panoscan::job::JobOrchestrator;
use panoscan::provider::{JobRequest, JobService};
use panoscan::state::{DiscoveredPanorama, ScanState};

struct RecordingService {
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingService {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
        }
    }
}

#[async_trait]
impl JobService for RecordingService {
    async fn submit_job(&self, request: JobRequest) -> Result<String, ScanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!request.scan_points.is_empty());
        if self.fail {
            Err(ScanError::Transport("service unavailable".to_string()))
        } else {
            Ok("job-1".to_string())
        }
    }
}

async fn discover(state: &ScanState, id: &str) {
    let admitted = state
        .try_discover(
            DiscoveredPanorama {
                pano_id: id.to_string(),
                lat: 1.0,
                lng: 2.0,
                heading: 0.0,
                region_id: "r1".to_string(),
            },
            state.generation(),
        )
        .await;
    assert!(admitted);
}

#[tokio::test]
async fn test_submit_records_active_job() {
    let state = Arc::new(ScanState::new());
    discover(&state, "p1").await;
    discover(&state, "p2").await;

    let service = Arc::new(RecordingService::new(false));
    let orchestrator = JobOrchestrator::new(state.clone(), service.clone());

    let job_id = orchestrator.submit().await.unwrap();
    assert_eq!(job_id, "job-1");
    assert_eq!(state.active_job().await.as_deref(), Some("job-1"));
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_double_submit_never_reaches_service() {
    let state = Arc::new(ScanState::new());
    discover(&state, "p1").await;

    let service = Arc::new(RecordingService::new(false));
    let orchestrator = JobOrchestrator::new(state.clone(), service.clone());

    orchestrator.submit().await.unwrap();
    let err = orchestrator.submit().await.unwrap_err();
    assert!(matches!(err, ScanError::StateGuard(_)));
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_submit_with_no_points_is_rejected() {
    let state = Arc::new(ScanState::new());
    let service = Arc::new(RecordingService::new(false));
    let orchestrator = JobOrchestrator::new(state.clone(), service.clone());

    let err = orchestrator.submit().await.unwrap_err();
    assert!(matches!(err, ScanError::StateGuard(_)));
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rejected_submission_leaves_state_clean() {
    let state = Arc::new(ScanState::new());
    discover(&state, "p1").await;

    let service = Arc::new(RecordingService::new(true));
    let orchestrator = JobOrchestrator::new(state.clone(), service.clone());

    let err = orchestrator.submit().await.unwrap_err();
    assert!(matches!(err, ScanError::Submission(_)));

    // No active job recorded, discoveries untouched, so a later submit works
    assert!(state.active_job().await.is_none());
    assert_eq!(state.discovered_count().await, 1);
}
