//! Ingestion seam between a payload transport and the store.
//!
//! The transport itself (MQTT client, HTTP handler, stdin reader) only hands
//! over raw bytes. [`IngestWorker`] drains them on a dedicated thread so
//! the transport never blocks on the store lock.

use crate::ingest::normalizer::Normalizer;
use crate::store::SharedStore;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

/// How often an idle worker checks for shutdown.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Errors handing a payload to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestError {
    /// The queue is at capacity
    ChannelFull,
    /// The worker has stopped
    Disconnected,
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::ChannelFull => write!(f, "Ingest queue is full"),
            IngestError::Disconnected => write!(f, "Ingest worker has stopped"),
        }
    }
}

impl std::error::Error for IngestError {}

/// Counts for one handled payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub received: usize,
    pub enriched: usize,
    pub kept: usize,
}

/// Runs payloads through the normalizer into the store.
#[derive(Debug, Clone)]
pub struct Ingestor {
    normalizer: Normalizer,
    store: SharedStore,
}

impl Ingestor {
    pub fn new(normalizer: Normalizer, store: SharedStore) -> Self {
        Self { normalizer, store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Normalize one payload and record it.
    ///
    /// The store sees every payload, malformed or fully filtered ones
    /// included, so the message counter keeps advancing.
    pub fn handle_payload(&self, payload: &[u8]) -> IngestReport {
        let batch = self.normalizer.process(payload);
        self.store.add(&batch.observations);
        IngestReport {
            received: batch.received,
            enriched: batch.enriched,
            kept: batch.kept,
        }
    }
}

/// Cloneable handle for submitting raw payloads.
#[derive(Debug, Clone)]
pub struct PayloadSender {
    sender: Sender<Vec<u8>>,
}

impl PayloadSender {
    /// Queue a payload without blocking.
    pub fn submit(&self, payload: Vec<u8>) -> Result<(), IngestError> {
        self.sender.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => IngestError::ChannelFull,
            TrySendError::Disconnected(_) => IngestError::Disconnected,
        })
    }

    /// Queue a payload, waiting for room.
    pub fn submit_blocking(&self, payload: Vec<u8>) -> Result<(), IngestError> {
        self.sender
            .send(payload)
            .map_err(|_| IngestError::Disconnected)
    }

    pub fn queued(&self) -> usize {
        self.sender.len()
    }
}

/// Background thread draining the payload queue.
pub struct IngestWorker {
    running: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl IngestWorker {
    /// Start a worker with a queue of `capacity` payloads.
    pub fn spawn(ingestor: Ingestor, capacity: usize) -> (PayloadSender, IngestWorker) {
        let (sender, receiver) = bounded(capacity.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let processed = Arc::new(AtomicU64::new(0));

        let handle = {
            let running = running.clone();
            let processed = processed.clone();
            std::thread::spawn(move || drain(ingestor, receiver, running, processed))
        };

        let worker = IngestWorker {
            running,
            processed,
            handle: Some(handle),
        };
        (PayloadSender { sender }, worker)
    }

    /// Payloads handled so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the worker after draining what is already queued.
    pub fn shutdown(mut self) -> u64 {
        self.stop();
        self.processed()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Ingest worker panicked");
            }
        }
    }
}

impl Drop for IngestWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drain(
    ingestor: Ingestor,
    receiver: Receiver<Vec<u8>>,
    running: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
) {
    debug!("Ingest worker started");
    loop {
        match receiver.recv_timeout(IDLE_POLL) {
            Ok(payload) => {
                ingestor.handle_payload(&payload);
                processed.fetch_add(1, Ordering::SeqCst);
            }
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Whatever arrived before shutdown still counts.
    while let Ok(payload) = receiver.try_recv() {
        ingestor.handle_payload(&payload);
        processed.fetch_add(1, Ordering::SeqCst);
    }
    running.store(false, Ordering::SeqCst);
    info!(
        processed = processed.load(Ordering::SeqCst),
        "Ingest worker stopped"
    );
}
