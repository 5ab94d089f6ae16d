//! Realtime result synchronization driver.
//!
//! Subscribes to the document store for the active job, runs every
//! incremental change through the normalizer, upserts the canonical point
//! into state (never replacing the whole map, so points updated in
//! different batches cannot clobber each other), and routes the updated
//! point to the marker layer.

use std::sync::Arc;
use std::time::Duration;

use crate::error::ScanError;
use crate::marker::MarkerSync;
use crate::metrics;
use crate::normalize;
use crate::provider::{ChangeType, DocChange, ResultStore};
use crate::state::ScanState;

pub struct ResultSync {
    state: Arc<ScanState>,
    store: Arc<dyn ResultStore>,
    markers: Arc<MarkerSync>,
}

impl ResultSync {
    pub fn new(
        state: Arc<ScanState>,
        store: Arc<dyn ResultStore>,
        markers: Arc<MarkerSync>,
    ) -> Self {
        Self {
            state,
            markers,
            store,
        }
    }

    /// Drive the subscription for one job until the stream ends or the job
    /// is superseded (a refresh or a newer submission clears/replaces the
    /// active job id). Always unsubscribes on exit.
    pub async fn run(&self, job_id: String) -> Result<(), ScanError> {
        let mut rx = self.store.subscribe(&job_id).await?;
        tracing::info!("Subscribed to realtime results for job {}", job_id);

        let mut supersede_check = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                change = rx.recv() => match change {
                    Some(change) => self.apply(change).await,
                    None => {
                        tracing::info!("Result stream for job {} ended", job_id);
                        break;
                    }
                },
                _ = supersede_check.tick() => {
                    if self.state.active_job().await.as_deref() != Some(job_id.as_str()) {
                        tracing::info!("Job {} superseded, dropping subscription", job_id);
                        break;
                    }
                }
            }
        }

        self.store.unsubscribe().await;
        Ok(())
    }

    /// Normalize and upsert one document. Malformed documents degrade to
    /// defaults inside the normalizer; documents for panoramas no longer in
    /// the discovered set (evicted regions) are dropped.
    pub async fn apply(&self, change: DocChange) {
        if change.change_type == ChangeType::Removed {
            tracing::debug!("Ignoring removal of result document {}", change.document_id);
            return;
        }

        let point = match normalize::normalize_document(&change) {
            Some(point) => point,
            None => {
                metrics::SCHEMA_ANOMALIES.inc();
                tracing::warn!(
                    "Result document {} has no panorama id, dropped",
                    change.document_id
                );
                return;
            }
        };

        let pano_id = point.pano_id.clone();
        let stored = self
            .state
            .apply_point_update(&pano_id, |existing| {
                normalize::merge_point(existing, point)
            })
            .await;

        match stored {
            Some(point) => self.markers.on_point_updated(&point).await,
            None => {
                metrics::SCHEMA_ANOMALIES.inc();
                tracing::debug!("Result document for unknown panorama {}, dropped", pano_id);
            }
        }
    }
}
