use bytes::Bytes;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::config::Config;
use crate::event::Event;

/// Cap on how much of a failure response body is kept for logging.
const MAX_LOGGED_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector rejected batch: {status}")]
    Rejected { status: StatusCode, body: String },

    #[error("collector throttled or unavailable: {status}")]
    Throttled { status: StatusCode, body: String },
}

impl ExportError {
    /// Whether the failed batch should be preserved and retried. Transport
    /// errors and timeouts, 429, and server errors are retryable; any other
    /// client error would deterministically fail again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExportError::Http(_) | ExportError::Throttled { .. } => true,
            ExportError::Rejected { .. } => false,
        }
    }
}

/// The delivery capability the batch scheduler drives: one batch in, one
/// classified outcome out. Implementations must not retry internally — retry
/// policy belongs to the scheduler.
pub trait Exporter: Send + Sync + 'static {
    fn export(&self, batch: &[Event]) -> impl Future<Output = Result<(), ExportError>> + Send;
}

/// Uploads batches to the Mixpanel `/import` endpoint as a JSON array.
///
/// The HTTP client is injected; its connection pool is shared with the host
/// application and its request timeout bounds each export attempt.
pub struct HttpExporter {
    client: Client,
    import_url: Url,
    token: String,
}

impl HttpExporter {
    pub fn new(client: Client, config: &Config) -> Result<Self, url::ParseError> {
        let mut import_url = config.endpoint.join("import")?;
        import_url.query_pairs_mut().append_pair("strict", "1");
        if let Some(project_id) = &config.project_id {
            import_url
                .query_pairs_mut()
                .append_pair("project_id", project_id);
        }

        Ok(Self {
            client,
            import_url,
            token: config.token.clone(),
        })
    }
}

impl Exporter for HttpExporter {
    async fn export(&self, batch: &[Event]) -> Result<(), ExportError> {
        let Some(body) = encode_batch(batch) else {
            return Ok(());
        };

        let response = self
            .client
            .post(self.import_url.clone())
            .basic_auth(&self.token, None::<&str>)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() < 400 {
            return Ok(());
        }

        let body = truncated_body(response).await;
        Err(classify_failure(status, body))
    }
}

/// Encode a batch as a JSON array, event by event. An event that fails to
/// serialize is logged and skipped — resubmitting unparseable data can never
/// succeed. Returns `None` when nothing was encoded.
fn encode_batch(batch: &[Event]) -> Option<Bytes> {
    let mut body = Vec::with_capacity(batch.len() * 128);
    body.push(b'[');
    let mut encoded = 0usize;

    for event in batch {
        match serde_json::to_vec(event) {
            Ok(json) => {
                if encoded > 0 {
                    body.push(b',');
                }
                body.extend_from_slice(&json);
                encoded += 1;
            }
            Err(error) => {
                warn!(%error, event = %event.name, "dropping event that failed to serialize");
            }
        }
    }

    if encoded == 0 {
        return None;
    }
    body.push(b']');
    Some(Bytes::from(body))
}

fn classify_failure(status: StatusCode, body: String) -> ExportError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ExportError::Throttled { status, body }
    } else {
        ExportError::Rejected { status, body }
    }
}

async fn truncated_body(response: reqwest::Response) -> String {
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_LOGGED_BODY {
        let mut end = MAX_LOGGED_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
