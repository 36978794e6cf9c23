use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_ENDPOINT: &str = "https://api.mixpanel.com";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MIXPANEL_TOKEN is required but not set")]
    TokenMissing,

    #[error("MIXPANEL_ENDPOINT is not a valid URL: {0}")]
    EndpointInvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),
}

/// Tuning knobs for the batching engine plus the ingestion destination.
///
/// Construct with [`Config::new`] and adjust fields directly, or read the
/// `MIXPANEL_*` environment variables with [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the ingestion API.
    pub endpoint: Url,
    /// Project token, sent as the basic-auth username on every upload.
    pub token: String,
    /// Project id appended to the import URL, required for service accounts.
    pub project_id: Option<String>,
    /// Soft cap on buffered events; oldest are dropped beyond this at drain time.
    pub maximum_queue_size: usize,
    /// Upper bound on the number of events uploaded per request.
    pub maximum_export_batch_size: usize,
    /// Delay between two consecutive uploads while exports are succeeding.
    pub default_upload_interval: Duration,
    /// Ceiling for the backoff delay after repeated export failures.
    pub max_upload_interval: Duration,
    /// Bound on a single upload attempt; exceeding it counts as a transport failure.
    pub export_timeout: Duration,
}

impl Config {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is valid"),
            token: token.into(),
            project_id: None,
            maximum_queue_size: 2000,
            maximum_export_batch_size: 512,
            default_upload_interval: Duration::from_secs(1),
            max_upload_interval: Duration::from_secs(60),
            export_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with("MIXPANEL_"))
            .collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token = vars
            .get("MIXPANEL_TOKEN")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::TokenMissing)?;

        let mut config = Self::new(token.clone());
        config.endpoint = parse_endpoint(vars)?;
        config.project_id = vars
            .get("MIXPANEL_PROJECT_ID")
            .filter(|s| !s.is_empty())
            .cloned();
        config.maximum_queue_size = parse_usize(vars, "MIXPANEL_MAX_QUEUE_SIZE", 2000)?;
        config.maximum_export_batch_size = parse_usize(vars, "MIXPANEL_MAX_BATCH_SIZE", 512)?;
        config.default_upload_interval =
            parse_duration_ms(vars, "MIXPANEL_UPLOAD_INTERVAL_MS", 1000)?;
        config.max_upload_interval =
            parse_duration_ms(vars, "MIXPANEL_MAX_UPLOAD_INTERVAL_MS", 60_000)?;
        config.export_timeout = parse_duration_ms(vars, "MIXPANEL_EXPORT_TIMEOUT_MS", 30_000)?;

        Ok(config)
    }
}

fn parse_endpoint(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    match vars.get("MIXPANEL_ENDPOINT").filter(|s| !s.is_empty()) {
        Some(raw) => Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.clone())),
        None => Ok(Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is valid")),
    }
}

fn parse_usize(
    vars: &HashMap<String, String>,
    name: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}
