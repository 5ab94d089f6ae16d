//! Discovery probe scheduler.
//!
//! Drives batched, rate-limited lookups against the imagery provider,
//! deduplicates hits against the session-wide seen-set, and streams newly
//! discovered panoramas to the marker layer. All lookups within one batch
//! run concurrently; the scheduler waits for the full batch to settle before
//! scheduling the next, which bounds in-flight concurrency to the batch size
//! and gives natural backpressure against the provider.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::geo::{self, LatLng, ProbeCoordinate};
use crate::metrics;
use crate::provider::ImageryProvider;
use crate::region::Region;
use crate::state::{DiscoveredPanorama, ScanState};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub probed: usize,
    pub discovered: usize,
}

pub struct Scanner {
    state: Arc<ScanState>,
    provider: Arc<dyn ImageryProvider>,
    config: ScanConfig,
    discovered_tx: mpsc::UnboundedSender<DiscoveredPanorama>,
}

impl Scanner {
    /// Returns the scanner and the receiving end of the discovered-panorama
    /// stream. Ordering on the stream is batch-ordered: points from batch
    /// k+1 never precede points from batch k, but arrival order within one
    /// batch is unspecified.
    pub fn new(
        state: Arc<ScanState>,
        provider: Arc<dyn ImageryProvider>,
        config: ScanConfig,
    ) -> (Self, mpsc::UnboundedReceiver<DiscoveredPanorama>) {
        let (discovered_tx, discovered_rx) = mpsc::unbounded_channel();
        (
            Self {
                state,
                provider,
                config,
                discovered_tx,
            },
            discovered_rx,
        )
    }

    /// Scan one region's grid, used immediately after a region is drawn.
    /// Previously discovered panoramas stay in place; overlapping imagery is
    /// deduplicated against the session-wide seen-set.
    pub async fn scan_single_region(&self, region: &Region) -> ScanSummary {
        let probes = geo::plan_region(region);
        tracing::info!(
            "Scanning region {} ({} probes, {}x{} grid)",
            region.id,
            probes.len(),
            region.grid.rows,
            region.grid.cols
        );
        self.scan(probes).await
    }

    /// Full multi-region re-scan: clears all discovered state and the
    /// seen-set, then re-plans and re-scans every active region under a new
    /// scan generation. The caller is responsible for tearing down markers
    /// before invoking this. Scanning with zero regions is a caller error.
    pub async fn refresh_all(&self) -> Result<ScanSummary, ScanError> {
        let regions = self.state.all_regions().await;
        if regions.is_empty() {
            return Err(ScanError::StateGuard(
                "no regions selected for scanning".to_string(),
            ));
        }

        self.state.reset_discoveries().await;
        let probes = geo::plan_all(&regions, self.config.max_points);
        tracing::info!(
            "Refresh scan across {} regions ({} probes after cap)",
            regions.len(),
            probes.len()
        );
        Ok(self.scan(probes).await)
    }

    /// Process probes in fixed-size batches with an inter-batch delay,
    /// publishing `{processed, total}` after every settled batch. A bumped
    /// scan generation (from a newer refresh) makes the remaining batches
    /// no-ops rather than aborting tasks.
    async fn scan(&self, probes: Vec<ProbeCoordinate>) -> ScanSummary {
        let generation = self.state.generation();
        let total = probes.len();
        let mut summary = ScanSummary { probed: 0, discovered: 0 };

        if total == 0 {
            return summary;
        }
        self.state.set_progress(0, total);

        let batches: Vec<&[ProbeCoordinate]> = probes.chunks(self.config.batch_size).collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            let lookups = batch.iter().map(|p| self.lookup_probe(p, generation));
            let results = join_all(lookups).await;

            if self.state.generation() != generation {
                tracing::debug!("Scan superseded at batch {}/{}, stopping", i + 1, batch_count);
                break;
            }

            summary.probed += batch.len();
            summary.discovered += results.into_iter().filter(|hit| *hit).count();
            self.state.set_progress(summary.probed, total);

            if i + 1 < batch_count && self.config.batch_delay_ms > 0 {
                sleep(Duration::from_millis(self.config.batch_delay_ms)).await;
            }
        }

        tracing::info!(
            "Scan finished: {}/{} probes, {} new panoramas",
            summary.probed,
            total,
            summary.discovered
        );
        summary
    }

    /// One provider lookup. Misses and transport failures are empty cells,
    /// not errors; duplicates are dropped against the seen-set. Returns true
    /// only when a new panorama was admitted and streamed out.
    async fn lookup_probe(&self, probe: &ProbeCoordinate, generation: u64) -> bool {
        metrics::PROBES_ISSUED.inc();
        let coord = LatLng::new(probe.lat, probe.lng);

        let hit = match self.provider.lookup(coord, self.config.search_radius_m).await {
            Ok(Some(hit)) => hit,
            Ok(None) => {
                metrics::LOOKUP_MISSES.inc();
                return false;
            }
            Err(e) => {
                metrics::LOOKUP_FAILURES.inc();
                tracing::debug!("Probe lookup failed at ({}, {}): {}", probe.lat, probe.lng, e);
                return false;
            }
        };

        let pano = DiscoveredPanorama {
            pano_id: hit.pano_id,
            lat: hit.location.lat,
            lng: hit.location.lng,
            heading: hit.heading,
            region_id: probe.region_id.clone(),
        };

        if self.state.try_discover(pano.clone(), generation).await {
            metrics::PANOS_DISCOVERED.inc();
            let _ = self.discovered_tx.send(pano);
            true
        } else {
            metrics::DEDUP_DROPS.inc();
            false
        }
    }
}
