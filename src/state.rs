//! Scan State Module
//!
//! Provides centralized scan state management with single source of truth
//! pattern. The session-wide seen-panorama set and the `pano_id -> ScanPoint`
//! map are the only mutable shared state in the engine; both are mutated
//! exclusively through the serialized methods here.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use crate::geo::LatLng;
use crate::region::Region;

/// Canonical analysis lifecycle of one scan point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Ready,
    Analyzing,
    Done,
    Error,
}

impl ScanStatus {
    /// Done and Error are terminal; a point never regresses out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Done | ScanStatus::Error)
    }
}

/// Spatial placement of a detected object relative to the panorama.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialInfo {
    pub heading: f64,
    pub distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
}

/// The canonical detection model. Every legacy upstream shape is converted
/// into this; it is the only shape the presentation layer understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub id: String,
    pub label: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial: Option<SpatialInfo>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AiResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub detected_objects: Vec<DetectedObject>,
    /// Always reconciled against `detected_objects.len()`; upstream count
    /// fields are never trusted.
    pub total_count: usize,
}

impl AiResult {
    pub fn with_objects(summary: Option<String>, objects: Vec<DetectedObject>) -> Self {
        let total_count = objects.len();
        Self {
            summary,
            detected_objects: objects,
            total_count,
        }
    }
}

/// Canonical, UI-facing record of one discovered panorama's analysis
/// lifecycle. Keyed by `pano_id` in the state map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub pano_id: String,
    pub status: ScanStatus,
    pub location: LatLng,
    pub heading: f64,
    pub ai_result: AiResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanPoint {
    /// Fresh point for a newly discovered panorama, awaiting analysis.
    pub fn ready(pano: &DiscoveredPanorama) -> Self {
        Self {
            pano_id: pano.pano_id.clone(),
            status: ScanStatus::Ready,
            location: LatLng::new(pano.lat, pano.lng),
            heading: pano.heading,
            ai_result: AiResult::default(),
            error: None,
        }
    }
}

/// A unique piece of street-level imagery resolved by a probe lookup.
/// Created exactly once per `pano_id` for the whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPanorama {
    pub pano_id: String,
    pub lat: f64,
    pub lng: f64,
    pub heading: f64,
    pub region_id: String,
}

/// Scan progress signal, published after every settled batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// Result of a transactional region removal.
#[derive(Debug)]
pub struct RegionRemoval {
    pub region: Region,
    pub evicted_pano_ids: Vec<String>,
}

/// Centralized scan state (single source of truth).
///
/// Lock order: any method holding more than one of the collection locks
/// acquires them as discovered, then seen_pano_ids, then scan_points.
pub struct ScanState {
    regions: Arc<RwLock<HashMap<String, Region>>>,
    seen_pano_ids: Arc<RwLock<HashSet<String>>>,
    discovered: Arc<RwLock<HashMap<String, DiscoveredPanorama>>>,
    scan_points: Arc<RwLock<HashMap<String, ScanPoint>>>,
    active_job: Arc<RwLock<Option<String>>>,
    progress_tx: watch::Sender<Progress>,
    /// Bumped on every full refresh/reset; in-flight batches from a
    /// superseded scan observe the bump and stop emitting.
    generation: AtomicU64,
    region_seq: AtomicUsize,
}

impl ScanState {
    pub fn new() -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            regions: Arc::new(RwLock::new(HashMap::new())),
            seen_pano_ids: Arc::new(RwLock::new(HashSet::new())),
            discovered: Arc::new(RwLock::new(HashMap::new())),
            scan_points: Arc::new(RwLock::new(HashMap::new())),
            active_job: Arc::new(RwLock::new(None)),
            progress_tx,
            generation: AtomicU64::new(0),
            region_seq: AtomicUsize::new(0),
        }
    }

    // Region management

    pub async fn insert_region(&self, region: Region) {
        self.regions.write().await.insert(region.id.clone(), region);
    }

    /// Next 1-based ordinal for region labels ("Area 1", "Area 2", ...).
    pub fn next_region_number(&self) -> usize {
        self.region_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub async fn get_region(&self, id: &str) -> Option<Region> {
        self.regions.read().await.get(id).cloned()
    }

    pub async fn all_regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self.regions.read().await.values().cloned().collect();
        regions.sort_by_key(|r| r.number);
        regions
    }

    pub async fn region_count(&self) -> usize {
        self.regions.read().await.len()
    }

    /// Transactional region removal: evicts the region, every panorama it
    /// owns, the dependent scan points, and the owned ids from the seen-set,
    /// leaving no orphaned state. Marker/overlay teardown is driven by the
    /// caller from the returned eviction list.
    pub async fn remove_region(&self, id: &str) -> Option<RegionRemoval> {
        let region = self.regions.write().await.remove(id)?;

        // Fixed lock order, shared with try_discover
        let mut discovered = self.discovered.write().await;
        let mut seen = self.seen_pano_ids.write().await;
        let mut points = self.scan_points.write().await;

        let evicted: Vec<String> = discovered
            .values()
            .filter(|p| p.region_id == id)
            .map(|p| p.pano_id.clone())
            .collect();

        for pano_id in &evicted {
            discovered.remove(pano_id);
            seen.remove(pano_id);
            points.remove(pano_id);
        }

        tracing::info!(
            "Region removed: {} ({} panoramas evicted)",
            id,
            evicted.len()
        );

        Some(RegionRemoval {
            region,
            evicted_pano_ids: evicted,
        })
    }

    // Discovery

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Record a discovered panorama if it is new to the session and the scan
    /// that produced it has not been superseded. Returns true when the
    /// panorama was admitted (seen-set updated, ScanPoint created Ready).
    /// All three collection guards are taken up front in the fixed lock
    /// order so a concurrent region removal cannot wedge either task.
    pub async fn try_discover(&self, pano: DiscoveredPanorama, generation: u64) -> bool {
        if self.generation() != generation {
            return false;
        }

        let mut discovered = self.discovered.write().await;
        let mut seen = self.seen_pano_ids.write().await;
        let mut points = self.scan_points.write().await;

        if !seen.insert(pano.pano_id.clone()) {
            return false;
        }
        points.insert(pano.pano_id.clone(), ScanPoint::ready(&pano));
        discovered.insert(pano.pano_id.clone(), pano);
        true
    }

    pub async fn discovered_points(&self) -> Vec<DiscoveredPanorama> {
        self.discovered.read().await.values().cloned().collect()
    }

    pub async fn discovered_count(&self) -> usize {
        self.discovered.read().await.len()
    }

    pub async fn is_seen(&self, pano_id: &str) -> bool {
        self.seen_pano_ids.read().await.contains(pano_id)
    }

    /// Full-session discovery reset: clears the seen-set, discovered
    /// panoramas, scan points, the active job, and bumps the scan generation
    /// so stale in-flight batches are rendered harmless. Regions survive.
    pub async fn reset_discoveries(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.seen_pano_ids.write().await.clear();
        self.discovered.write().await.clear();
        self.scan_points.write().await.clear();
        *self.active_job.write().await = None;
        let _ = self.progress_tx.send(Progress::default());
        tracing::info!("Scan state reset (generation {})", self.generation());
    }

    // Scan points

    pub async fn get_scan_point(&self, pano_id: &str) -> Option<ScanPoint> {
        self.scan_points.read().await.get(pano_id).cloned()
    }

    pub async fn scan_points(&self) -> HashMap<String, ScanPoint> {
        self.scan_points.read().await.clone()
    }

    /// Upsert a normalized point into the live map. The panorama must be a
    /// known discovery: a late document for an evicted pano is dropped. The
    /// merge closure sees the existing point so the normalizer can enforce
    /// its no-regression rule. Returns the stored point.
    pub async fn apply_point_update<F>(&self, pano_id: &str, merge: F) -> Option<ScanPoint>
    where
        F: FnOnce(Option<&ScanPoint>) -> ScanPoint,
    {
        if !self.discovered.read().await.contains_key(pano_id) {
            return None;
        }
        let mut points = self.scan_points.write().await;
        let merged = merge(points.get(pano_id));
        points.insert(pano_id.to_string(), merged.clone());
        Some(merged)
    }

    // Job lifecycle

    pub async fn active_job(&self) -> Option<String> {
        self.active_job.read().await.clone()
    }

    pub async fn set_active_job(&self, job_id: String) {
        tracing::info!("Active job set: {}", job_id);
        *self.active_job.write().await = Some(job_id);
    }

    pub async fn clear_active_job(&self) {
        *self.active_job.write().await = None;
    }

    // Progress

    pub fn set_progress(&self, processed: usize, total: usize) {
        let _ = self.progress_tx.send(Progress { processed, total });
    }

    pub fn progress(&self) -> Progress {
        *self.progress_tx.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    // Snapshot for the presentation layer

    pub async fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            regions: self.all_regions().await,
            scan_points: self.scan_points().await,
            active_job: self.active_job().await,
            progress: self.progress(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of scan state for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub regions: Vec<Region>,
    pub scan_points: HashMap<String, ScanPoint>,
    pub active_job: Option<String>,
    pub progress: Progress,
    pub timestamp: i64,
}
