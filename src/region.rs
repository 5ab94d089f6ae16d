//! Region model and the region/overlay state manager.
//!
//! Regions are user-drawn rectangular areas of interest. The manager owns
//! the canonical region collection (held in `ScanState`), performs the
//! transactional removal cascade, and reconciles regions against live map
//! overlays with an idempotent diff.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ScanError;
use crate::geo::{Bounds, GridConfig, LatLng};
use crate::marker::MarkerSync;
use crate::metrics;
use crate::provider::{OverlayHandle, OverlayRenderer};
use crate::state::ScanState;

/// Vibrant colors for regions. Randomized per new region; distinct enough
/// for visual grouping, not required to be globally unique.
pub const REGION_COLORS: [&str; 10] = [
    "#ef4444", // red
    "#f97316", // orange
    "#f59e0b", // amber
    "#84cc16", // lime
    "#10b981", // emerald
    "#06b6d4", // cyan
    "#3b82f6", // blue
    "#8b5cf6", // violet
    "#d946ef", // fuchsia
    "#f43f5e", // rose
];

/// A user-drawn rectangular search area. Immutable once created except for
/// removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    /// 1-based creation ordinal; drives the "Area N" label and the listing
    /// order (lexicographic label sorting misorders "Area 10" before
    /// "Area 2").
    pub number: usize,
    pub bounds: Bounds,
    pub center: LatLng,
    pub label: String,
    pub color: String,
    pub grid: GridConfig,
}

impl Region {
    /// Build a region from a finished drag gesture. The grid is derived from
    /// the physical span of the drag (one cell per `MIN_CELL_SIZE` of span,
    /// clamped so very large areas still produce a bounded grid).
    pub fn from_drag(bounds: Bounds, number: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            number,
            center: bounds.center(),
            label: format!("Area {}", number),
            color: random_color().to_string(),
            grid: GridConfig::derive(&bounds),
            bounds,
        }
    }
}

fn random_color() -> &'static str {
    let idx = rand::rng().random_range(0..REGION_COLORS.len());
    REGION_COLORS[idx]
}

/// Owns the region collection and its visual overlays.
pub struct RegionManager {
    state: Arc<ScanState>,
    renderer: Arc<dyn OverlayRenderer>,
    markers: Arc<MarkerSync>,
    overlay_handles: RwLock<HashMap<String, OverlayHandle>>,
}

impl RegionManager {
    pub fn new(
        state: Arc<ScanState>,
        renderer: Arc<dyn OverlayRenderer>,
        markers: Arc<MarkerSync>,
    ) -> Self {
        Self {
            state,
            renderer,
            markers,
            overlay_handles: RwLock::new(HashMap::new()),
        }
    }

    /// Create a region from drawn bounds and render its overlay.
    pub async fn add_region(&self, bounds: Bounds) -> Result<Region, ScanError> {
        let region = Region::from_drag(bounds, self.state.next_region_number());
        tracing::info!(
            "Region added: {} ({}, {}x{} grid)",
            region.id,
            region.label,
            region.grid.rows,
            region.grid.cols
        );
        self.state.insert_region(region.clone()).await;
        metrics::ACTIVE_REGIONS.set(self.state.region_count().await as i64);
        self.reconcile_overlays().await?;
        Ok(region)
    }

    /// Transactional removal: the region, every panorama it owns, every
    /// dependent scan point, every marker and its overlay all go together.
    pub async fn remove_region(&self, id: &str) -> Result<(), ScanError> {
        let removal = self
            .state
            .remove_region(id)
            .await
            .ok_or_else(|| ScanError::StateGuard(format!("unknown region: {}", id)))?;

        self.markers.remove_points(&removal.evicted_pano_ids).await;
        metrics::ACTIVE_REGIONS.set(self.state.region_count().await as i64);
        self.reconcile_overlays().await?;
        Ok(())
    }

    /// Pan the map to a region's center.
    pub async fn focus(&self, id: &str) -> Result<(), ScanError> {
        let region = self
            .state
            .get_region(id)
            .await
            .ok_or_else(|| ScanError::StateGuard(format!("unknown region: {}", id)))?;
        self.renderer.pan_to(region.center).await;
        Ok(())
    }

    /// Diff the region collection against live overlays: tear down overlays
    /// whose region is gone, create overlays for regions without one.
    /// Idempotent and safe to re-run on every state change.
    pub async fn reconcile_overlays(&self) -> Result<(), ScanError> {
        let regions = self.state.all_regions().await;
        let mut handles = self.overlay_handles.write().await;

        let dead: Vec<String> = handles
            .keys()
            .filter(|id| !regions.iter().any(|r| &r.id == *id))
            .cloned()
            .collect();
        for id in dead {
            if let Some(handle) = handles.remove(&id) {
                self.renderer.remove_overlay(handle).await;
            }
        }

        for region in &regions {
            if !handles.contains_key(&region.id) {
                let handle = self.renderer.render_region(region).await?;
                handles.insert(region.id.clone(), handle);
            }
        }
        Ok(())
    }

    pub async fn overlay_count(&self) -> usize {
        self.overlay_handles.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::NoopRenderer;

    fn bounds() -> Bounds {
        Bounds { north: 1.002, south: 1.0, east: 1.002, west: 1.0 }
    }

    fn manager() -> (Arc<ScanState>, RegionManager) {
        let state = Arc::new(ScanState::new());
        let renderer = Arc::new(NoopRenderer::new());
        let markers = Arc::new(MarkerSync::new(renderer.clone()));
        let manager = RegionManager::new(state.clone(), renderer, markers);
        (state, manager)
    }

    #[test]
    fn region_from_drag_derives_grid_and_palette_color() {
        let region = Region::from_drag(bounds(), 3);
        assert_eq!(region.number, 3);
        assert_eq!(region.label, "Area 3");
        assert_eq!(region.grid, GridConfig { rows: 4, cols: 4 });
        assert!(REGION_COLORS.contains(&region.color.as_str()));
        assert_eq!(region.center, bounds().center());
    }

    #[tokio::test]
    async fn test_add_and_remove_region_reconciles_overlays() {
        let (state, manager) = manager();

        let r1 = manager.add_region(bounds()).await.unwrap();
        let r2 = manager.add_region(bounds()).await.unwrap();
        assert_eq!(manager.overlay_count().await, 2);
        assert_eq!(r1.label, "Area 1");
        assert_eq!(r2.label, "Area 2");

        manager.remove_region(&r1.id).await.unwrap();
        assert_eq!(manager.overlay_count().await, 1);
        assert_eq!(state.region_count().await, 1);

        // Re-running the diff changes nothing
        manager.reconcile_overlays().await.unwrap();
        manager.reconcile_overlays().await.unwrap();
        assert_eq!(manager.overlay_count().await, 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_region_is_a_guard_failure() {
        let (_, manager) = manager();
        let err = manager.remove_region("nope").await.unwrap_err();
        assert!(matches!(err, ScanError::StateGuard(_)));
    }
}
