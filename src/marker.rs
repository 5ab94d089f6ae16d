//! Marker lifecycle sync.
//!
//! Keeps visual markers consistent with the canonical point state: a probe
//! marker for every discovered point (restyled as its status changes, dimmed
//! once analysis completes empty) and a match marker only for points whose
//! terminal result contains at least one detected object.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::geo::LatLng;
use crate::provider::{MarkerHandle, MarkerLayer, MarkerRenderer, MarkerStyle};
use crate::state::{DiscoveredPanorama, ScanPoint, ScanStatus};

#[derive(Debug, Clone)]
struct MarkerEntry {
    probe: MarkerHandle,
    matched: Option<MarkerHandle>,
    position: LatLng,
}

pub struct MarkerSync {
    renderer: Arc<dyn MarkerRenderer>,
    markers: DashMap<String, MarkerEntry>,
}

impl MarkerSync {
    pub fn new(renderer: Arc<dyn MarkerRenderer>) -> Self {
        Self {
            renderer,
            markers: DashMap::new(),
        }
    }

    fn probe_style(point: &ScanPoint) -> MarkerStyle {
        match point.status {
            ScanStatus::Ready => MarkerStyle::Ready,
            ScanStatus::Analyzing => MarkerStyle::Analyzing,
            ScanStatus::Error => MarkerStyle::Error,
            ScanStatus::Done => {
                if point.ai_result.detected_objects.is_empty() {
                    MarkerStyle::Empty
                } else {
                    MarkerStyle::Matched
                }
            }
        }
    }

    fn wants_match_marker(point: &ScanPoint) -> bool {
        point.status == ScanStatus::Done && !point.ai_result.detected_objects.is_empty()
    }

    /// Create the probe marker for a newly discovered panorama.
    pub async fn on_discovered(&self, pano: &DiscoveredPanorama) {
        if self.markers.contains_key(&pano.pano_id) {
            return;
        }
        let position = LatLng::new(pano.lat, pano.lng);
        match self
            .renderer
            .create_marker(MarkerLayer::Probe, &pano.pano_id, position, MarkerStyle::Ready)
            .await
        {
            Ok(handle) => {
                self.markers.insert(
                    pano.pano_id.clone(),
                    MarkerEntry { probe: handle, matched: None, position },
                );
            }
            Err(e) => tracing::warn!("Failed to create marker for {}: {}", pano.pano_id, e),
        }
    }

    /// Restyle a point's probe marker after a status change, and create or
    /// drop its match marker as the terminal result dictates.
    pub async fn on_point_updated(&self, point: &ScanPoint) {
        let entry = match self.markers.get(&point.pano_id) {
            Some(entry) => entry.clone(),
            None => return,
        };

        self.renderer
            .restyle_marker(entry.probe, Self::probe_style(point))
            .await;

        if Self::wants_match_marker(point) {
            if entry.matched.is_none() {
                match self
                    .renderer
                    .create_marker(
                        MarkerLayer::Match,
                        &point.pano_id,
                        entry.position,
                        MarkerStyle::Matched,
                    )
                    .await
                {
                    Ok(handle) => {
                        if let Some(mut slot) = self.markers.get_mut(&point.pano_id) {
                            slot.matched = Some(handle);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to create match marker for {}: {}", point.pano_id, e)
                    }
                }
            }
        } else if let Some(handle) = entry.matched {
            self.renderer.remove_marker(handle).await;
            if let Some(mut slot) = self.markers.get_mut(&point.pano_id) {
                slot.matched = None;
            }
        }
    }

    /// Destroy markers for evicted panoramas (region removal cascade).
    pub async fn remove_points(&self, pano_ids: &[String]) {
        for pano_id in pano_ids {
            if let Some((_, entry)) = self.markers.remove(pano_id) {
                self.renderer.remove_marker(entry.probe).await;
                if let Some(handle) = entry.matched {
                    self.renderer.remove_marker(handle).await;
                }
            }
        }
    }

    /// Destroy every marker (full re-scan refresh).
    pub async fn clear(&self) {
        let ids: Vec<String> = self.markers.iter().map(|e| e.key().clone()).collect();
        self.remove_points(&ids).await;
    }

    /// Full reconcile against the canonical point map: create missing probe
    /// markers, restyle existing, destroy markers with no live point.
    pub async fn sync_all(&self, points: &HashMap<String, ScanPoint>) {
        let stale: Vec<String> = self
            .markers
            .iter()
            .filter(|e| !points.contains_key(e.key()))
            .map(|e| e.key().clone())
            .collect();
        self.remove_points(&stale).await;

        for point in points.values() {
            if !self.markers.contains_key(&point.pano_id) {
                match self
                    .renderer
                    .create_marker(
                        MarkerLayer::Probe,
                        &point.pano_id,
                        point.location,
                        Self::probe_style(point),
                    )
                    .await
                {
                    Ok(handle) => {
                        self.markers.insert(
                            point.pano_id.clone(),
                            MarkerEntry {
                                probe: handle,
                                matched: None,
                                position: point.location,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::warn!("Failed to create marker for {}: {}", point.pano_id, e)
                    }
                }
            }
            self.on_point_updated(point).await;
        }
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn has_match_marker(&self, pano_id: &str) -> bool {
        self.markers
            .get(pano_id)
            .map(|e| e.matched.is_some())
            .unwrap_or(false)
    }
}
