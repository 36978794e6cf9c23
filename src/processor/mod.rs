use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::buffer::EventBuffer;
use crate::config::Config;
use crate::event::Event;
use crate::exporter::Exporter;

/// Poll interval while shutdown waits for an in-flight export to settle.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Emit a diagnostic once per this many shutdown polls (~1s).
const SHUTDOWN_POLLS_PER_WARNING: u32 = 100;

/// Scheduler state guarded by the single mutex in [`Shared`].
struct ProcessorState {
    buffer: EventBuffer,
    upload_interval: Duration,
    is_shutting_down: bool,
    running_exports: u32,
}

/// State shared between the processor handle and its worker task.
///
/// Uses `std::sync::Mutex` (not tokio) because the lock is never held across
/// `.await` — all operations are sub-microsecond field updates. The export
/// call itself runs outside the lock so producers are never blocked behind a
/// slow network request. `tick_lock` serializes whole ticks: a timer tick, an
/// explicit flush, and a capacity-triggered drain queue behind one another
/// instead of racing for the same buffer snapshot.
struct Shared {
    state: Mutex<ProcessorState>,
    tick_lock: tokio::sync::Mutex<()>,
    maximum_queue_size: usize,
    maximum_export_batch_size: usize,
    default_upload_interval: Duration,
    max_upload_interval: Duration,
}

/// Increments the in-flight export counter, decrementing it when dropped so
/// the count is restored even if the export call panics.
struct InFlightGuard<'a> {
    shared: &'a Shared,
}

impl<'a> InFlightGuard<'a> {
    fn new(shared: &'a Shared) -> Self {
        shared.state.lock().unwrap().running_exports += 1;
        Self { shared }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.shared.state.lock().unwrap().running_exports -= 1;
    }
}

/// Accumulates tracked events and periodically exports them in batches,
/// backing off exponentially while the collector is failing.
///
/// Cheap to share behind an `Arc`; [`track`](Self::track) never blocks on
/// network I/O. Must live inside a tokio runtime.
pub struct BatchProcessor<E: Exporter> {
    shared: Arc<Shared>,
    exporter: Arc<E>,
    tick_tx: mpsc::Sender<()>,
    tick_rx: Mutex<Option<mpsc::Receiver<()>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<E: Exporter> BatchProcessor<E> {
    pub fn new(config: &Config, exporter: E) -> Self {
        // Capacity 1: a queued signal already guarantees a drain, additional
        // ones coalesce into it.
        let (tick_tx, tick_rx) = mpsc::channel(1);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ProcessorState {
                    buffer: EventBuffer::with_capacity(config.maximum_queue_size),
                    upload_interval: config.default_upload_interval,
                    is_shutting_down: false,
                    running_exports: 0,
                }),
                tick_lock: tokio::sync::Mutex::new(()),
                maximum_queue_size: config.maximum_queue_size,
                maximum_export_batch_size: config.maximum_export_batch_size,
                default_upload_interval: config.default_upload_interval,
                max_upload_interval: config.max_upload_interval,
            }),
            exporter: Arc::new(exporter),
            tick_tx,
            tick_rx: Mutex::new(Some(tick_rx)),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the upload scheduler. Starting twice, or after shutdown, is a
    /// no-op with a logged warning.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            warn!("batch processor already started");
            return;
        }
        if self.shared.state.lock().unwrap().is_shutting_down {
            warn!("batch processor is shut down, not starting");
            return;
        }
        let Some(tick_rx) = self.tick_rx.lock().unwrap().take() else {
            warn!("batch processor is shut down, not starting");
            return;
        };

        *worker = Some(tokio::spawn(run_worker(
            Arc::clone(&self.shared),
            Arc::clone(&self.exporter),
            tick_rx,
            self.cancel.clone(),
        )));
    }

    /// Append an event to the buffer. Never blocks on I/O and never fails;
    /// once shutdown has begun the event is dropped with a warning.
    ///
    /// Reaching the queue capacity signals the scheduler to drain immediately
    /// rather than waiting for the next timer tick.
    pub fn track(&self, event: Event) {
        let at_capacity = {
            let mut state = self.shared.state.lock().unwrap();
            if state.is_shutting_down {
                warn!(event = %event.name, "batch processor is shutting down, dropping event");
                return;
            }
            state.buffer.push(event);
            state.buffer.len() >= self.shared.maximum_queue_size
        };

        if at_capacity {
            let _ = self.tick_tx.try_send(());
        }
    }

    /// Trigger one out-of-band drain and wait for it to complete. Safe to call
    /// concurrently with the scheduler; the drains serialize.
    pub async fn flush(&self) {
        tick(&self.shared, &*self.exporter).await;
    }

    /// Stop the scheduler, flush whatever remains, and wait for any export
    /// already in flight to complete. Idempotent: a second call returns
    /// immediately.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.is_shutting_down {
                debug!("batch processor already shut down");
                return;
            }
            state.is_shutting_down = true;
        }

        // Cancel the timer before the final flush so a natural tick cannot
        // race the shutdown drain.
        self.cancel.cancel();
        let worker = self.worker.lock().unwrap().take();
        if let Some(handle) = worker
            && handle.await.is_err()
        {
            error!("batch processor worker panicked");
        }

        self.flush().await;

        let mut polls = 0u32;
        while self.shared.state.lock().unwrap().running_exports > 0 {
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
            polls += 1;
            if polls % SHUTDOWN_POLLS_PER_WARNING == 0 {
                warn!("shutdown waiting on an in-flight export");
            }
        }
    }

    /// Number of events currently buffered and awaiting export.
    pub fn pending_events(&self) -> usize {
        self.shared.state.lock().unwrap().buffer.len()
    }

    #[cfg(test)]
    fn upload_interval(&self) -> Duration {
        self.shared.state.lock().unwrap().upload_interval
    }

    #[cfg(test)]
    fn running_exports(&self) -> u32 {
        self.shared.state.lock().unwrap().running_exports
    }
}

/// Scheduler loop: drains on an adaptive timer and on capacity signals, until
/// cancelled. The sleep is re-armed from the current interval after every
/// tick, so backoff adjustments take effect on the next cycle.
async fn run_worker<E: Exporter>(
    shared: Arc<Shared>,
    exporter: Arc<E>,
    mut tick_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    loop {
        let delay = shared.state.lock().unwrap().upload_interval;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            signal = tick_rx.recv() => match signal {
                Some(()) => tick(&shared, &*exporter).await,
                // All handles to the processor were dropped.
                None => break,
            },
            _ = tokio::time::sleep(delay) => tick(&shared, &*exporter).await,
        }
    }
}

/// One drain/export cycle. The buffer mutation and the post-outcome state
/// update are serialized; the export call itself is not, keeping producers
/// unblocked while the request is in flight.
async fn tick<E: Exporter>(shared: &Shared, exporter: &E) {
    let _tick_guard = shared.tick_lock.lock().await;
    let _in_flight = InFlightGuard::new(shared);

    let batch = {
        let mut state = shared.state.lock().unwrap();
        let dropped = state.buffer.enforce_capacity(shared.maximum_queue_size);
        if dropped > 0 {
            warn!(dropped, "event buffer over capacity, dropped oldest events");
        }
        state.buffer.take_batch(shared.maximum_export_batch_size)
    };

    if batch.is_empty() {
        return;
    }

    debug!(count = batch.len(), "exporting batch");
    let result = exporter.export(&batch).await;

    let mut state = shared.state.lock().unwrap();
    match result {
        Ok(()) => {
            debug!(count = batch.len(), "export succeeded");
            state.upload_interval = shared.default_upload_interval;
        }
        Err(error) if error.is_retryable() => {
            state.buffer.reinsert(batch);
            state.upload_interval =
                (state.upload_interval * 2).min(shared.max_upload_interval);
            warn!(%error, retry_in = ?state.upload_interval, "export failed, batch queued for retry");
        }
        Err(error) => {
            error!(%error, dropped = batch.len(), "export rejected, dropping batch");
            state.upload_interval = shared.default_upload_interval;
        }
    }
}
