//! Capability traits for the engine's external collaborators.
//!
//! The map/imagery provider, remote job service, realtime document store and
//! the visual renderers are consumed through these seams so the scheduler,
//! orchestrator and sync driver stay independent of any concrete backend
//! (and so tests can drive them with in-memory fakes).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ScanError;
use crate::geo::LatLng;
use crate::region::Region;

/// A successful imagery lookup: the canonical panorama covering a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct PanoramaHit {
    pub pano_id: String,
    pub location: LatLng,
    pub heading: f64,
}

/// Street-level imagery lookups. The panorama need not sit exactly on the
/// probe coordinate; any imagery within `radius_m` covers that grid cell.
/// `Ok(None)` means no imagery near the probe, which is not a failure.
#[async_trait]
pub trait ImageryProvider: Send + Sync {
    async fn lookup(&self, coord: LatLng, radius_m: f64) -> Result<Option<PanoramaHit>, ScanError>;
}

/// Wire shape of one discovered point in a job submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPoint {
    pub pano_id: String,
    pub location: GeoPoint,
    pub heading: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Batch job request: region metadata (envelope center) plus every
/// discovered point mapped into the wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub region: GeoPoint,
    pub scan_points: Vec<JobPoint>,
}

/// Remote analysis job service. Returns the opaque job identifier.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn submit_job(&self, request: JobRequest) -> Result<String, ScanError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

/// One incremental change to a job's per-point result documents.
#[derive(Debug, Clone)]
pub struct DocChange {
    pub document_id: String,
    pub data: Value,
    pub change_type: ChangeType,
}

/// Realtime document store streaming per-point results for a job.
/// A new `subscribe` supersedes any previous subscription.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn subscribe(&self, job_id: &str)
        -> Result<mpsc::UnboundedReceiver<DocChange>, ScanError>;
    async fn unsubscribe(&self);
}

/// Opaque handle to a visual object issued by a renderer.
pub type OverlayHandle = u64;
pub type MarkerHandle = u64;

/// Region overlay rendering (border rectangle, grid lines, label, close
/// control). Rendering internals are out of scope; the engine only tracks
/// the handles it was issued.
#[async_trait]
pub trait OverlayRenderer: Send + Sync {
    async fn render_region(&self, region: &Region) -> Result<OverlayHandle, ScanError>;
    async fn remove_overlay(&self, handle: OverlayHandle);
    async fn pan_to(&self, center: LatLng);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerLayer {
    /// Lightweight marker for every discovered point.
    Probe,
    /// Distinct marker for points whose terminal result matched, rendered
    /// above the probe layer.
    Match,
}

/// Visual styling of a probe marker, derived from canonical point status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    Ready,
    Analyzing,
    /// Terminal with at least one detected object.
    Matched,
    /// Terminal with no detections; dimmed.
    Empty,
    Error,
}

#[async_trait]
pub trait MarkerRenderer: Send + Sync {
    async fn create_marker(
        &self,
        layer: MarkerLayer,
        pano_id: &str,
        position: LatLng,
        style: MarkerStyle,
    ) -> Result<MarkerHandle, ScanError>;
    async fn restyle_marker(&self, handle: MarkerHandle, style: MarkerStyle);
    async fn remove_marker(&self, handle: MarkerHandle);
}

/// Headless renderer for binaries where the presentation layer lives
/// elsewhere and consumes state through the API instead.
#[derive(Debug, Default)]
pub struct NoopRenderer {
    next_handle: std::sync::atomic::AtomicU64,
}

impl NoopRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn issue(&self) -> u64 {
        self.next_handle
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl OverlayRenderer for NoopRenderer {
    async fn render_region(&self, _region: &Region) -> Result<OverlayHandle, ScanError> {
        Ok(self.issue())
    }

    async fn remove_overlay(&self, _handle: OverlayHandle) {}

    async fn pan_to(&self, _center: LatLng) {}
}

#[async_trait]
impl MarkerRenderer for NoopRenderer {
    async fn create_marker(
        &self,
        _layer: MarkerLayer,
        _pano_id: &str,
        _position: LatLng,
        _style: MarkerStyle,
    ) -> Result<MarkerHandle, ScanError> {
        Ok(self.issue())
    }

    async fn restyle_marker(&self, _handle: MarkerHandle, _style: MarkerStyle) {}

    async fn remove_marker(&self, _handle: MarkerHandle) {}
}
