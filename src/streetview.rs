//! Street-level imagery provider backed by the Street View metadata
//! endpoint. Metadata lookups are free of image consumption charges, so the
//! scanner can probe aggressively.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::ImageryConfig;
use crate::error::ScanError;
use crate::geo::LatLng;
use crate::provider::{ImageryProvider, PanoramaHit};
use crate::retry::retry_with_linear_backoff;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    status: String,
    #[serde(default)]
    pano_id: Option<String>,
    #[serde(default)]
    location: Option<MetadataLocation>,
    /// Capture heading of the imagery vehicle; the endpoint omits it for
    /// most panoramas, in which case 0 is reported.
    #[serde(default)]
    heading: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MetadataLocation {
    lat: f64,
    lng: f64,
}

pub struct StreetViewProvider {
    client: reqwest::Client,
    api_host: String,
    api_key: String,
}

impl StreetViewProvider {
    pub fn new(config: ImageryConfig) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_host: config.api_host,
            api_key: config.api_key,
        })
    }

    async fn fetch_metadata(
        &self,
        coord: LatLng,
        radius_m: f64,
    ) -> Result<MetadataResponse, ScanError> {
        let url = format!("{}/maps/api/streetview/metadata", self.api_host);
        let location = format!("{},{}", coord.lat, coord.lng);
        let radius = format!("{}", radius_m);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("location", location.as_str()),
                ("radius", radius.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        response
            .json::<MetadataResponse>()
            .await
            .map_err(|e| ScanError::InvalidData(format!("metadata response: {}", e)))
    }
}

#[async_trait]
impl ImageryProvider for StreetViewProvider {
    async fn lookup(&self, coord: LatLng, radius_m: f64) -> Result<Option<PanoramaHit>, ScanError> {
        // One short linear retry absorbs transient transport hiccups within
        // a single lookup; the scheduler itself never retries a probe.
        let metadata =
            retry_with_linear_backoff(|| self.fetch_metadata(coord, radius_m), 2, 200).await?;

        match metadata.status.as_str() {
            "OK" => {
                let (pano_id, location) = match (metadata.pano_id, metadata.location) {
                    (Some(id), Some(loc)) => (id, LatLng::new(loc.lat, loc.lng)),
                    _ => {
                        return Err(ScanError::InvalidData(
                            "OK metadata without pano_id/location".to_string(),
                        ))
                    }
                };
                Ok(Some(PanoramaHit {
                    pano_id,
                    location,
                    heading: metadata.heading.unwrap_or(0.0),
                }))
            }
            "ZERO_RESULTS" | "NOT_FOUND" => Ok(None),
            other => Err(ScanError::Transport(format!(
                "imagery metadata status: {}",
                other
            ))),
        }
    }
}
