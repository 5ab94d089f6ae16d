//! Integration tests for the realtime result synchronization driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use panoscan::error::ScanError;
use panoscan::marker::MarkerSync;
use panoscan::provider::{ChangeType, DocChange, NoopRenderer, ResultStore};
use panoscan::state::{DiscoveredPanorama, ScanState, ScanStatus};
use panoscan::sync::ResultSync;

#[derive(Default)]
struct ChannelStore {
    tx: Mutex<Option<mpsc::UnboundedSender<DocChange>>>,
    unsubscribed: AtomicBool,
}

#[async_trait]
impl ResultStore for ChannelStore {
    async fn subscribe(
        &self,
        _job_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<DocChange>, ScanError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn unsubscribe(&self) {
        self.unsubscribed.store(true, Ordering::SeqCst);
    }
}

fn change(document_id: &str, data: Value) -> DocChange {
    DocChange {
        document_id: document_id.to_string(),
        data,
        change_type: ChangeType::Modified,
    }
}

struct Harness {
    state: Arc<ScanState>,
    markers: Arc<MarkerSync>,
    store: Arc<ChannelStore>,
    sync: ResultSync,
}

fn harness() -> Harness {
    let state = Arc::new(ScanState::new());
    let markers = Arc::new(MarkerSync::new(Arc::new(NoopRenderer::new())));
    let store = Arc::new(ChannelStore::default());
    let sync = ResultSync::new(state.clone(), store.clone(), markers.clone());
    Harness {
        state,
        markers,
        store,
        sync,
    }
}

async fn discover(h: &Harness, id: &str) {
    let pano = DiscoveredPanorama {
        pano_id: id.to_string(),
        lat: 1.0,
        lng: 2.0,
        heading: 30.0,
        region_id: "r1".to_string(),
    };
    assert!(h.state.try_discover(pano.clone(), h.state.generation()).await);
    h.markers.on_discovered(&pano).await;
}

#[tokio::test]
async fn test_document_flow_updates_point_and_markers() {
    let h = harness();
    discover(&h, "p1").await;

    h.sync
        .apply(change(
            "p1",
            json!({
                "panoId": "p1",
                "status": "done",
                "location": {"latitude": 1.0, "longitude": 2.0},
                "aiResult": {
                    "summary": "hydrant by the curb",
                    "detected_objects": [{"label": "hydrant", "confidence": 0.93}]
                }
            }),
        ))
        .await;

    let point = h.state.get_scan_point("p1").await.unwrap();
    assert_eq!(point.status, ScanStatus::Done);
    assert_eq!(point.ai_result.total_count, 1);
    assert_eq!(point.ai_result.summary.as_deref(), Some("hydrant by the curb"));
    assert!(h.markers.has_match_marker("p1"));
}

#[tokio::test]
async fn test_unknown_panorama_document_is_dropped() {
    let h = harness();
    discover(&h, "p1").await;

    h.sync
        .apply(change("ghost", json!({"panoId": "ghost", "status": "done"})))
        .await;

    assert!(h.state.get_scan_point("ghost").await.is_none());
    assert_eq!(h.markers.marker_count(), 1);
}

#[tokio::test]
async fn test_removal_changes_are_ignored() {
    let h = harness();
    discover(&h, "p1").await;

    let mut removal = change("p1", json!({"panoId": "p1", "status": "done"}));
    removal.change_type = ChangeType::Removed;
    h.sync.apply(removal).await;

    assert_eq!(
        h.state.get_scan_point("p1").await.unwrap().status,
        ScanStatus::Ready
    );
}

#[tokio::test]
async fn test_terminal_status_survives_out_of_order_updates() {
    let h = harness();
    discover(&h, "p1").await;

    h.sync
        .apply(change(
            "p1",
            json!({
                "panoId": "p1",
                "status": "done",
                "aiResult": {"detected_objects": [{"label": "sign", "confidence": 0.7}]}
            }),
        ))
        .await;

    // A stale in-progress update arrives after the terminal result
    h.sync
        .apply(change("p1", json!({"panoId": "p1", "status": "analyzing"})))
        .await;

    let point = h.state.get_scan_point("p1").await.unwrap();
    assert_eq!(point.status, ScanStatus::Done);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_when_job_is_superseded() {
    let h = harness();
    discover(&h, "p1").await;
    h.state.set_active_job("j1".to_string()).await;

    let state = h.state.clone();
    let store = h.store.clone();
    let sync = ResultSync::new(state.clone(), store.clone(), h.markers.clone());
    let handle = tokio::spawn(async move { sync.run("j1".to_string()).await });

    // Wait for the subscription to open, then feed a document through it
    let tx = loop {
        if let Some(tx) = h.store.tx.lock().unwrap().clone() {
            break tx;
        }
        tokio::task::yield_now().await;
    };
    tx.send(change("p1", json!({"panoId": "p1", "status": "analyzing-v2"})))
        .unwrap();

    loop {
        if h.state.get_scan_point("p1").await.unwrap().status == ScanStatus::Analyzing {
            break;
        }
        tokio::task::yield_now().await;
    }

    // A newer refresh clears the active job; the driver notices and exits
    h.state.clear_active_job().await;
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sync driver should stop")
        .unwrap()
        .unwrap();
    assert!(h.store.unsubscribed.load(Ordering::SeqCst));
}
