//! Job submission orchestrator.
//!
//! Packages the discovered panoramas into a batch request for the remote
//! analysis service and tracks the submission lifecycle. At most one job is
//! active per session; submitting while one is active is a caller
//! precondition failure and never reaches the service.

use std::sync::Arc;

use crate::error::ScanError;
use crate::metrics;
use crate::provider::{GeoPoint, JobPoint, JobRequest, JobService};
use crate::state::{DiscoveredPanorama, ScanState};

pub struct JobOrchestrator {
    state: Arc<ScanState>,
    service: Arc<dyn JobService>,
}

impl JobOrchestrator {
    pub fn new(state: Arc<ScanState>, service: Arc<dyn JobService>) -> Self {
        Self { state, service }
    }

    /// Submit every discovered point as one batch job. Returns the opaque
    /// job id from the service and records it as the active job. Rejections
    /// are surfaced to the caller, not retried, and leave the discovered
    /// state untouched.
    pub async fn submit(&self) -> Result<String, ScanError> {
        if let Some(job_id) = self.state.active_job().await {
            return Err(ScanError::StateGuard(format!(
                "job {} is already active",
                job_id
            )));
        }

        let points = self.state.discovered_points().await;
        if points.is_empty() {
            return Err(ScanError::StateGuard(
                "no discovered points to submit".to_string(),
            ));
        }

        let request = build_request(&points);
        tracing::info!("Submitting job with {} scan points", request.scan_points.len());

        let job_id = self
            .service
            .submit_job(request)
            .await
            .map_err(|e| {
                metrics::JOB_SUBMISSION_FAILURES.inc();
                ScanError::Submission(e.to_string())
            })?;

        metrics::JOBS_SUBMITTED.inc();
        self.state.set_active_job(job_id.clone()).await;
        tracing::info!("Job created: {}", job_id);
        Ok(job_id)
    }
}

/// Map the discovered points into the wire shape: the bounding envelope's
/// center as region metadata plus one entry per panorama.
fn build_request(points: &[DiscoveredPanorama]) -> JobRequest {
    let mut min_lat = f64::INFINITY;
    let mut max_lat = f64::NEG_INFINITY;
    let mut min_lng = f64::INFINITY;
    let mut max_lng = f64::NEG_INFINITY;

    for p in points {
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
        min_lng = min_lng.min(p.lng);
        max_lng = max_lng.max(p.lng);
    }

    let scan_points = points
        .iter()
        .map(|p| JobPoint {
            pano_id: p.pano_id.clone(),
            location: GeoPoint {
                latitude: p.lat,
                longitude: p.lng,
            },
            heading: p.heading,
        })
        .collect();

    JobRequest {
        region: GeoPoint {
            latitude: (min_lat + max_lat) / 2.0,
            longitude: (min_lng + max_lng) / 2.0,
        },
        scan_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pano(id: &str, lat: f64, lng: f64) -> DiscoveredPanorama {
        DiscoveredPanorama {
            pano_id: id.to_string(),
            lat,
            lng,
            heading: 10.0,
            region_id: "r1".to_string(),
        }
    }

    #[test]
    fn request_envelope_is_centered_on_extremes() {
        let points = vec![
            pano("a", 1.0, 10.0),
            pano("b", 3.0, 14.0),
            pano("c", 2.0, 11.0),
        ];
        let request = build_request(&points);
        assert_eq!(request.region.latitude, 2.0);
        assert_eq!(request.region.longitude, 12.0);
        assert_eq!(request.scan_points.len(), 3);
        assert_eq!(request.scan_points[0].heading, 10.0);
    }

    #[test]
    fn wire_shape_uses_camel_case_fields() {
        let request = build_request(&[pano("a", 1.0, 2.0)]);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("scanPoints").is_some());
        assert_eq!(json["scanPoints"][0]["panoId"], "a");
        assert_eq!(json["scanPoints"][0]["location"]["latitude"], 1.0);
        assert_eq!(json["region"]["latitude"], 1.0);
    }
}
