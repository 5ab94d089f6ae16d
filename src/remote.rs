//! Production adapters for the remote analysis service.
//!
//! Job submission goes over HTTP; per-point result documents stream back
//! over MQTT, one JSON payload per document on
//! `scan_jobs/{job_id}/points/{document_id}`.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::{JobConfig, MqttConfig};
use crate::error::ScanError;
use crate::provider::{ChangeType, DocChange, JobRequest, JobService, ResultStore};

pub struct HttpJobService {
    client: reqwest::Client,
    service_url: String,
}

impl HttpJobService {
    pub fn new(config: JobConfig) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            service_url: config.service_url,
        })
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn submit_job(&self, request: JobRequest) -> Result<String, ScanError> {
        let response = self
            .client
            .post(&self.service_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::Transport(format!(
                "job service rejected submission ({}): {}",
                status, body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ScanError::InvalidData(format!("job response: {}", e)))?;

        // The job id may sit at the root or inside a callable-style envelope.
        body.get("jobId")
            .or_else(|| body.get("data").and_then(|d| d.get("jobId")))
            .or_else(|| body.get("result").and_then(|d| d.get("jobId")))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ScanError::InvalidData("job response missing jobId".to_string()))
    }
}

struct ActiveSubscription {
    client: AsyncClient,
    task: JoinHandle<()>,
}

/// Realtime document store over MQTT. A new subscription supersedes the
/// previous one; stale payloads for a superseded job never reach the engine.
pub struct MqttResultStore {
    config: MqttConfig,
    active: Mutex<Option<ActiveSubscription>>,
}

impl MqttResultStore {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            active: Mutex::new(None),
        }
    }

    fn parse_payload(topic: &str, payload: &[u8]) -> Option<DocChange> {
        let data: Value = match serde_json::from_slice(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Undecodable result payload on {}: {}", topic, e);
                return None;
            }
        };

        let document_id = topic.rsplit('/').next().unwrap_or_default().to_string();
        let change_type = match data.get("changeType").and_then(Value::as_str) {
            Some("removed") => ChangeType::Removed,
            Some("modified") => ChangeType::Modified,
            _ => ChangeType::Added,
        };

        Some(DocChange {
            document_id,
            data,
            change_type,
        })
    }
}

#[async_trait]
impl ResultStore for MqttResultStore {
    async fn subscribe(
        &self,
        job_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<DocChange>, ScanError> {
        if !self.config.enabled {
            return Err(ScanError::Config(
                "realtime result feed is disabled (MQTT_ENABLED=false)".to_string(),
            ));
        }

        // Only one live subscription at a time.
        self.unsubscribe().await;

        let client_id = format!("{}-{}", self.config.client_id, uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(
            client_id,
            self.config.broker_host.clone(),
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(60));

        let (client, mut eventloop) = AsyncClient::new(options, 10);
        let topic_filter = format!("scan_jobs/{}/points/#", job_id);
        let (tx, rx) = mpsc::unbounded_channel();

        let subscribe_client = client.clone();
        let task = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("Connected to result broker, subscribing {}", topic_filter);
                        if let Err(e) = subscribe_client
                            .subscribe(&topic_filter, QoS::AtLeastOnce)
                            .await
                        {
                            tracing::error!("Failed to subscribe to result topic: {}", e);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if let Some(change) =
                            Self::parse_payload(&publish.topic, &publish.payload)
                        {
                            if tx.send(change).is_err() {
                                // Engine dropped the receiver; stop polling.
                                break;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Result broker connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        *self.active.lock().await = Some(ActiveSubscription { client, task });
        Ok(rx)
    }

    async fn unsubscribe(&self) {
        if let Some(subscription) = self.active.lock().await.take() {
            let _ = subscription.client.disconnect().await;
            subscription.task.abort();
            tracing::info!("Result subscription closed");
        }
    }
}
