use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::error;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::event::Event;
use crate::exporter::HttpExporter;
use crate::processor::BatchProcessor;
use crate::properties::PropertyValue;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid ingestion endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Handle to one configured ingestion destination.
///
/// Cheap to clone; all clones share the same buffer and scheduler. Construct
/// once, thread it through the application, and call [`shutdown`](Self::shutdown)
/// from the host's teardown hook so pending events are drained.
#[derive(Clone)]
pub struct Mixpanel {
    processor: Arc<BatchProcessor<HttpExporter>>,
    client: reqwest::Client,
    engage_url: Url,
    token: String,
}

impl Mixpanel {
    /// Build the client and start its upload scheduler. Must be called from
    /// within a tokio runtime.
    pub fn new(config: Config) -> Result<Self, ClientError> {
        // Tolerates a provider already installed by the host application.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = reqwest::Client::builder()
            .timeout(config.export_timeout)
            .build()?;
        let engage_url = config.endpoint.join("engage")?;
        let exporter = HttpExporter::new(client.clone(), &config)?;

        let processor = Arc::new(BatchProcessor::new(&config, exporter));
        processor.start();

        Ok(Self {
            processor,
            client,
            engage_url,
            token: config.token,
        })
    }

    /// Record an event. Returns immediately; the event is uploaded in a later
    /// batch. Pass `None` as `distinct_id` for an event that does not belong
    /// to any user.
    pub fn track(
        &self,
        distinct_id: Option<&str>,
        name: &str,
        properties: HashMap<String, PropertyValue>,
    ) {
        self.processor
            .track(tracked_event(distinct_id, name, properties));
    }

    /// Upload pending events now instead of waiting for the schedule.
    /// Resolves once the drain has completed.
    pub async fn flush(&self) {
        self.processor.flush().await;
    }

    /// Drain all pending events and stop the scheduler, waiting for any
    /// upload already in flight. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.processor.shutdown().await;
    }

    /// Number of events currently buffered and awaiting upload.
    pub fn pending_events(&self) -> usize {
        self.processor.pending_events()
    }

    /// Set properties on a user profile. Sent immediately, not batched;
    /// failures are logged, never returned.
    pub async fn people_set(&self, distinct_id: &str, properties: HashMap<String, PropertyValue>) {
        let properties = match serde_json::to_value(&properties) {
            Ok(properties) => properties,
            Err(error) => {
                error!(%error, distinct_id, "dropping profile update that failed to serialize");
                return;
            }
        };
        self.post_engage(serde_json::json!([{
            "$token": self.token,
            "$distinct_id": distinct_id,
            "$set": properties,
        }]))
        .await;
    }

    /// Delete a user profile. Sent immediately, not batched; failures are
    /// logged, never returned.
    pub async fn people_delete(&self, distinct_id: &str) {
        self.post_engage(serde_json::json!([{
            "$token": self.token,
            "$distinct_id": distinct_id,
            "$delete": "",
        }]))
        .await;
    }

    async fn post_engage(&self, payload: serde_json::Value) {
        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(error) => {
                error!(%error, "failed to encode profile update");
                return;
            }
        };

        let result = self
            .client
            .post(self.engage_url.clone())
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().as_u16() < 400 => {}
            Ok(response) => {
                error!(status = %response.status(), "profile update rejected");
            }
            Err(error) => {
                error!(%error, "profile update failed");
            }
        }
    }
}

/// Enrich caller properties with the ingestion API's required fields. The
/// generated values win on key collision.
fn tracked_event(
    distinct_id: Option<&str>,
    name: &str,
    mut properties: HashMap<String, PropertyValue>,
) -> Event {
    properties.insert(
        "time".to_owned(),
        PropertyValue::Int(Utc::now().timestamp_millis()),
    );
    properties.insert(
        "$insert_id".to_owned(),
        PropertyValue::String(Uuid::new_v4().to_string()),
    );
    properties.insert(
        "distinct_id".to_owned(),
        PropertyValue::String(distinct_id.unwrap_or_default().to_owned()),
    );
    Event::new(name, properties)
}
