use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub scan_config: ScanConfig,
    pub imagery_config: ImageryConfig,
    pub job_config: JobConfig,
    pub mqtt_config: MqttConfig,
}

/// Scheduler policy knobs. Batch size and inter-batch delay are tunable
/// policy constants, not architectural.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub search_radius_m: f64,
    pub max_points: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageryConfig {
    pub api_host: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub service_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub enabled: bool,
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let api_port = env::var("API_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        // Scheduler policy
        let batch_size = env::var("SCAN_BATCH_SIZE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let batch_delay_ms = env::var("SCAN_BATCH_DELAY_MS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);

        let search_radius_m = env::var("SCAN_SEARCH_RADIUS_M")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50.0);

        let max_points = env::var("SCAN_MAX_POINTS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .unwrap_or(crate::geo::DEFAULT_MAX_POINTS);

        // Imagery metadata endpoint
        let imagery_api_host = env::var("IMAGERY_API_HOST")
            .unwrap_or_else(|_| "https://maps.googleapis.com".to_string());
        let imagery_api_key = env::var("IMAGERY_API_KEY").unwrap_or_else(|_| String::new());

        // Remote analysis job service
        let job_service_url = env::var("JOB_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:5001/uploadScanData".to_string());

        // Realtime result feed over MQTT
        let mqtt_enabled = env::var("MQTT_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);

        let mqtt_broker_host =
            env::var("MQTT_BROKER_HOST").unwrap_or_else(|_| "localhost".to_string());

        let mqtt_broker_port = env::var("MQTT_BROKER_PORT")
            .unwrap_or_else(|_| "1883".to_string())
            .parse()
            .unwrap_or(1883);

        let mqtt_client_id =
            env::var("MQTT_CLIENT_ID").unwrap_or_else(|_| "panoscan-node".to_string());

        Ok(Self {
            api_host,
            api_port,
            scan_config: ScanConfig {
                batch_size,
                batch_delay_ms,
                search_radius_m,
                max_points,
            },
            imagery_config: ImageryConfig {
                api_host: imagery_api_host,
                api_key: imagery_api_key,
            },
            job_config: JobConfig {
                service_url: job_service_url,
            },
            mqtt_config: MqttConfig {
                enabled: mqtt_enabled,
                broker_host: mqtt_broker_host,
                broker_port: mqtt_broker_port,
                client_id: mqtt_client_id,
            },
        })
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay_ms: 50,
            search_radius_m: 50.0,
            max_points: crate::geo::DEFAULT_MAX_POINTS,
        }
    }
}
