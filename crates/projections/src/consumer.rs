//! Consumer workers that feed broker deliveries to projections.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broker::{Delivery, MessageSource};
use crate::projection::Projection;

/// Per-worker delivery counters.
#[derive(Debug, Default)]
pub struct WorkerStats {
    acked: AtomicU64,
    dropped: AtomicU64,
    requeued: AtomicU64,
}

impl WorkerStats {
    /// Messages applied and acknowledged.
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    /// Malformed messages acknowledged without being applied.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Messages handed back to the broker for redelivery.
    pub fn requeued(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }
}

/// Drives one projection from one message source.
///
/// Each delivery is settled only after the projection has finished with it:
/// applied events and malformed payloads are acked, store failures are
/// nacked so the broker redelivers them.
pub struct ConsumerWorker<M: MessageSource> {
    projection: Arc<dyn Projection>,
    source: M,
    stats: Arc<WorkerStats>,
}

impl<M: MessageSource> ConsumerWorker<M> {
    /// Creates a worker feeding `source` into `projection`.
    pub fn new(projection: Arc<dyn Projection>, source: M) -> Self {
        Self {
            projection,
            source,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Returns a handle to this worker's counters.
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Consumes messages until shutdown is signalled or the source closes.
    ///
    /// Shutdown is only observed between messages; a delivery that has been
    /// received is always processed and settled first. A dropped shutdown
    /// sender counts as a shutdown signal.
    #[tracing::instrument(skip_all, fields(projection = self.projection.name()))]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(queue = self.projection.queue(), "consumer started");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown) => {
                    tracing::info!("shutdown requested");
                    break;
                }
                delivery = self.source.recv() => match delivery {
                    Some(delivery) => delivery,
                    None => {
                        tracing::info!("message source closed");
                        break;
                    }
                },
            };

            process(self.projection.as_ref(), &self.stats, delivery).await;
        }

        tracing::info!(
            acked = self.stats.acked(),
            dropped = self.stats.dropped(),
            requeued = self.stats.requeued(),
            "consumer stopped"
        );
    }
}

/// Runs one delivery through `projection` and settles it.
async fn process(projection: &dyn Projection, stats: &WorkerStats, delivery: Delivery) {
    let name = projection.name();
    let message_id = delivery.message().id;
    let attempt = delivery.message().attempt;

    match projection.handle(delivery.payload()).await {
        Ok(()) => {
            if let Err(err) = delivery.ack().await {
                tracing::error!(%message_id, error = %err, "ack failed");
                return;
            }
            stats.acked.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("projector_events_applied_total", "projection" => name).increment(1);
        }
        Err(err) if err.is_retryable() => {
            tracing::error!(%message_id, attempt, error = %err, "store unavailable, requeueing");
            if let Err(err) = delivery.nack().await {
                tracing::error!(%message_id, error = %err, "nack failed");
                return;
            }
            stats.requeued.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("projector_events_requeued_total", "projection" => name).increment(1);
        }
        Err(err) => {
            tracing::warn!(%message_id, error = %err, "dropping message that cannot be applied");
            if let Err(err) = delivery.ack().await {
                tracing::error!(%message_id, error = %err, "ack failed");
                return;
            }
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("projector_events_dropped_total", "projection" => name).increment(1);
        }
    }
}

async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

struct RunningWorker {
    name: &'static str,
    stats: Arc<WorkerStats>,
    handle: JoinHandle<()>,
}

/// Owns the running consumer workers and stops them together.
pub struct ProjectorSupervisor {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<RunningWorker>,
}

impl ProjectorSupervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            workers: Vec::new(),
        }
    }

    /// Spawns a worker task for `projection` fed from `source`.
    pub fn spawn<M>(&mut self, projection: Arc<dyn Projection>, source: M) -> Arc<WorkerStats>
    where
        M: MessageSource + 'static,
    {
        let name = projection.name();
        let worker = ConsumerWorker::new(projection, source);
        let stats = worker.stats();
        let handle = tokio::spawn(worker.run(self.shutdown_tx.subscribe()));

        self.workers.push(RunningWorker {
            name,
            stats: Arc::clone(&stats),
            handle,
        });
        stats
    }

    /// Returns the number of spawned workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Signals every worker to stop and waits for them to finish.
    ///
    /// Returns each worker's projection name with its final counters.
    pub async fn shutdown(self) -> Vec<(&'static str, Arc<WorkerStats>)> {
        self.shutdown_tx.send_replace(true);

        let (meta, handles): (Vec<_>, Vec<_>) = self
            .workers
            .into_iter()
            .map(|w| ((w.name, w.stats), w.handle))
            .unzip();

        for ((name, _), joined) in meta.iter().zip(futures_util::future::join_all(handles).await) {
            if let Err(err) = joined {
                tracing::error!(projection = name, error = %err, "consumer task failed");
            }
        }

        meta
    }
}

impl Default for ProjectorSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
