use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::Notify;

use crate::config::Config;
use crate::event::Event;
use crate::exporter::{ExportError, Exporter};

pub fn dummy_config() -> Config {
    Config::new("test-token")
}

pub fn event(name: &str) -> Event {
    Event::new(name, HashMap::new())
}

pub fn throttled() -> ExportError {
    ExportError::Throttled {
        status: StatusCode::SERVICE_UNAVAILABLE,
        body: String::new(),
    }
}

pub fn rejected() -> ExportError {
    ExportError::Rejected {
        status: StatusCode::BAD_REQUEST,
        body: String::new(),
    }
}

pub struct MockExporter;

impl Exporter for MockExporter {
    async fn export(&self, _batch: &[Event]) -> Result<(), ExportError> {
        Ok(())
    }
}

pub struct FailingExporter;

impl Exporter for FailingExporter {
    async fn export(&self, _batch: &[Event]) -> Result<(), ExportError> {
        Err(throttled())
    }
}

/// Records every exported batch (by event name) and pops scripted outcomes;
/// succeeds once the script runs out.
pub struct ScriptedExporter {
    pub batches: Mutex<Vec<Vec<String>>>,
    outcomes: Mutex<VecDeque<ExportError>>,
}

impl ScriptedExporter {
    pub fn succeeding() -> Self {
        Self::with_outcomes(Vec::new())
    }

    pub fn with_outcomes(outcomes: Vec<ExportError>) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            outcomes: Mutex::new(outcomes.into()),
        }
    }

    pub fn exported_names(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

impl Exporter for ScriptedExporter {
    async fn export(&self, batch: &[Event]) -> Result<(), ExportError> {
        self.batches
            .lock()
            .unwrap()
            .push(batch.iter().map(|e| e.name.clone()).collect());
        match self.outcomes.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Blocks inside `export` until released, so tests can observe an in-flight
/// export deterministically.
pub struct GatedExporter {
    entered: Arc<AtomicBool>,
    gate: Arc<Notify>,
}

impl GatedExporter {
    pub fn new() -> (Self, Arc<Notify>, Arc<AtomicBool>) {
        let gate = Arc::new(Notify::new());
        let entered = Arc::new(AtomicBool::new(false));
        (
            Self {
                entered: Arc::clone(&entered),
                gate: Arc::clone(&gate),
            },
            gate,
            entered,
        )
    }
}

impl Exporter for GatedExporter {
    async fn export(&self, _batch: &[Event]) -> Result<(), ExportError> {
        self.entered.store(true, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(())
    }
}
