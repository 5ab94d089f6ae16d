use std::sync::Arc;

use anyhow::Result;

use panoscan::api::{self, ApiContext};
use panoscan::config::Config;
use panoscan::job::JobOrchestrator;
use panoscan::marker::MarkerSync;
use panoscan::metrics;
use panoscan::provider::{NoopRenderer, ResultStore};
use panoscan::region::RegionManager;
use panoscan::remote::{HttpJobService, MqttResultStore};
use panoscan::scanner::Scanner;
use panoscan::state::ScanState;
use panoscan::streetview::StreetViewProvider;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting panoscan node...");

    metrics::init_metrics();
    tracing::info!("Metrics system initialized");

    let config = Config::load()?;

    // Single source of truth for regions, discoveries and scan points
    let state = Arc::new(ScanState::new());

    // Headless renderer; the presentation layer consumes /state instead
    let renderer = Arc::new(NoopRenderer::new());
    let markers = Arc::new(MarkerSync::new(renderer.clone()));
    let regions = Arc::new(RegionManager::new(
        state.clone(),
        renderer.clone(),
        markers.clone(),
    ));

    let provider = Arc::new(StreetViewProvider::new(config.imagery_config.clone())?);
    let (scanner, mut discovered_rx) =
        Scanner::new(state.clone(), provider, config.scan_config.clone());
    let scanner = Arc::new(scanner);

    let jobs = Arc::new(JobOrchestrator::new(
        state.clone(),
        Arc::new(HttpJobService::new(config.job_config.clone())?),
    ));

    let store: Arc<dyn ResultStore> = Arc::new(MqttResultStore::new(config.mqtt_config.clone()));
    if !config.mqtt_config.enabled {
        tracing::warn!("MQTT disabled; realtime results will not stream until re-enabled");
    }

    // Marker creation follows the discovery stream
    let marker_feed = markers.clone();
    tokio::spawn(async move {
        while let Some(pano) = discovered_rx.recv().await {
            marker_feed.on_discovered(&pano).await;
        }
    });

    let router = api::build_router(ApiContext {
        state,
        regions,
        scanner,
        jobs,
        markers,
        store,
    });

    let bind_addr = format!("{}:{}", config.api_host, config.api_port);
    tracing::info!("API listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
