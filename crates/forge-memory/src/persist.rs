//! Supervised durable persistence
//!
//! Durable writes can be handed to a background worker task instead of
//! being awaited inline. Every queued write returns a [`PendingWrite`] the
//! caller may await, and every failure is also published to the
//! [`PersistenceSupervisor`], so no write fails silently.

use crate::backend::MemoryStore;
use crate::error::MemoryError;
use crate::record::{MemoryKey, StoredMemory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How durable writes are performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurableWriteMode {
    /// Awaited as part of the save call
    #[default]
    Inline,
    /// Handed to the persistence worker
    Queued,
}

/// A durable write that failed in the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceFailure {
    /// Record that was not persisted
    pub key: MemoryKey,
    /// Why
    pub error: MemoryError,
}

struct PersistJob {
    memory: StoredMemory,
    ack: oneshot::Sender<Result<(), MemoryError>>,
}

/// Awaitable acknowledgement of a queued write
#[derive(Debug)]
pub struct PendingWrite {
    rx: oneshot::Receiver<Result<(), MemoryError>>,
}

impl PendingWrite {
    fn resolved(result: Result<(), MemoryError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Wait for the worker to persist the record
    ///
    /// # Errors
    /// The store's error, or `MemoryError::Write` if the worker stopped.
    pub async fn wait(self) -> Result<(), MemoryError> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(MemoryError::write("durable", "persistence worker stopped")))
    }
}

/// Sending side of the persistence queue
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    tx: mpsc::Sender<PersistJob>,
}

impl std::fmt::Debug for PersistJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistJob")
            .field("key", &self.memory.key())
            .finish_non_exhaustive()
    }
}

impl PersistenceQueue {
    /// Spawn the worker task and return the queue plus its supervisor
    ///
    /// The worker stops once every queue clone has been dropped.
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(store: Arc<dyn MemoryStore>, capacity: usize) -> (Self, PersistenceSupervisor) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let worker = PersistenceWorker {
            store,
            jobs: rx,
            failures: failures_tx,
        };
        let handle = tokio::spawn(worker.run());
        (
            Self { tx },
            PersistenceSupervisor {
                failures: failures_rx,
                handle,
            },
        )
    }

    /// Queue a durable write
    pub async fn enqueue(&self, memory: StoredMemory) -> PendingWrite {
        let (ack, rx) = oneshot::channel();
        let key = memory.key();
        if self.tx.send(PersistJob { memory, ack }).await.is_err() {
            tracing::error!(%key, "persistence worker stopped, durable write dropped");
            return PendingWrite::resolved(Err(MemoryError::write(
                "durable",
                "persistence worker stopped",
            )));
        }
        PendingWrite { rx }
    }
}

/// Background task draining the persistence queue
struct PersistenceWorker {
    store: Arc<dyn MemoryStore>,
    jobs: mpsc::Receiver<PersistJob>,
    failures: mpsc::UnboundedSender<PersistenceFailure>,
}

impl PersistenceWorker {
    async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            let key = job.memory.key();
            let result = self.store.save(job.memory).await;
            if let Err(error) = &result {
                tracing::warn!(%key, %error, "queued durable write failed");
                let _ = self.failures.send(PersistenceFailure {
                    key,
                    error: error.clone(),
                });
            }
            // Caller may have dropped its PendingWrite.
            let _ = job.ack.send(result);
        }
        tracing::debug!("persistence worker drained");
    }
}

/// Receiving side for worker failures
#[derive(Debug)]
pub struct PersistenceSupervisor {
    failures: mpsc::UnboundedReceiver<PersistenceFailure>,
    handle: JoinHandle<()>,
}

impl PersistenceSupervisor {
    /// Next reported failure; `None` once the worker has stopped
    pub async fn next_failure(&mut self) -> Option<PersistenceFailure> {
        self.failures.recv().await
    }

    /// Failure already reported, without waiting
    pub fn try_next_failure(&mut self) -> Option<PersistenceFailure> {
        self.failures.try_recv().ok()
    }

    /// Wait for the worker to drain and stop
    ///
    /// Only returns after every `PersistenceQueue` clone is dropped.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "persistence worker panicked");
        }
    }
}
