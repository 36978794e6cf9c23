//! Batching, in-process event tracking client for the Mixpanel ingestion API.
//!
//! Events recorded with [`Mixpanel::track`] are buffered in memory and
//! uploaded in batches on an adaptive schedule: the interval backs off
//! exponentially while the collector is failing and snaps back on success.
//! Tracking never blocks on network I/O; delivery is best effort and failures
//! surface only in the log stream.
//!
//! ```no_run
//! use mixpanel_ingest::{Config, Mixpanel};
//!
//! # async fn run() -> Result<(), mixpanel_ingest::ClientError> {
//! let mixpanel = Mixpanel::new(Config::new("<project token>"))?;
//!
//! mixpanel.track(Some("user-1"), "signup", [("plan".to_owned(), "pro".into())].into());
//!
//! // From the host's teardown hook, drain whatever is still pending.
//! mixpanel.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod client;
mod config;
mod event;
mod exporter;
mod processor;
mod properties;

#[cfg(test)]
mod testing;

pub use client::{ClientError, Mixpanel};
pub use config::{Config, ConfigError};
pub use event::Event;
pub use exporter::{ExportError, Exporter, HttpExporter};
pub use processor::BatchProcessor;
pub use properties::PropertyValue;
