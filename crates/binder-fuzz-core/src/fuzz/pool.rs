//! Worker pool for one run generation.
//!
//! Every worker gets the same immutable catalog, its own generator and log
//! handle, and a clone of the single [`OrderingCounter`]. Nothing else is
//! shared.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;

use super::bridge::Bridge;
use super::counter::OrderingCounter;
use super::executor::{OutputMarkers, TransactionExecutor};
use super::report::{FatalCondition, LogFormat, RecordLog};
use super::runner::{Assignment, Worker, WorkerExit};
use super::value_gen::ValueGenerator;

/// How long workers get to observe shutdown before they are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Settings shared by every worker of a pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub workers: usize,
    pub log_path: PathBuf,
    pub log_format: LogFormat,
    pub timeout: Duration,
    pub markers: OutputMarkers,
    /// Base seed; worker `i` uses `seed + i`. `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Split the catalog across workers instead of giving each the full list.
    pub partition: bool,
}

/// Number of workers to run by default: one per available core.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(4)
}

/// Running workers plus the broadcast that stops them.
pub struct WorkerPool {
    handles: Vec<JoinHandle<Result<WorkerExit>>>,
    shutdown_tx: watch::Sender<bool>,
    counter: OrderingCounter,
}

impl WorkerPool {
    /// Open every worker's log and spawn the workers on the current runtime.
    ///
    /// Fatal conditions observed by any worker are sent on `fatal_tx`.
    pub fn spawn(
        settings: &PoolSettings,
        catalog: Arc<Catalog>,
        bridge: Arc<dyn Bridge>,
        fatal_tx: mpsc::UnboundedSender<FatalCondition>,
    ) -> Result<Self> {
        let workers = settings.workers.max(1);
        let counter = OrderingCounter::new();
        let (shutdown_tx, _) = watch::channel(false);
        let executor = TransactionExecutor::new(bridge, counter.clone())
            .with_markers(settings.markers.clone())
            .with_timeout(settings.timeout);

        // Open all logs before spawning so a bad path fails the whole pool.
        let mut logs = Vec::with_capacity(workers);
        for _ in 0..workers {
            logs.push(RecordLog::open_append(&settings.log_path, settings.log_format)?);
        }

        let handles = logs
            .into_iter()
            .enumerate()
            .map(|(id, log)| {
                let assignment = if settings.partition {
                    Assignment::Strided {
                        offset: id,
                        stride: workers,
                    }
                } else {
                    Assignment::Full
                };
                let generator = match settings.seed {
                    Some(seed) => ValueGenerator::new(seed.wrapping_add(id as u64)),
                    None => ValueGenerator::from_entropy(),
                };
                let worker = Worker {
                    id,
                    catalog: Arc::clone(&catalog),
                    assignment,
                    executor: executor.clone(),
                    generator,
                    log,
                    shutdown: shutdown_tx.subscribe(),
                    fatal_tx: fatal_tx.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        info!(
            workers,
            transactions = catalog.len(),
            partition = settings.partition,
            log = %settings.log_path.display(),
            "worker pool started"
        );

        Ok(Self {
            handles,
            shutdown_tx,
            counter,
        })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn counter(&self) -> &OrderingCounter {
        &self.counter
    }

    /// Stop every worker and wait for them, aborting any that outlive the
    /// grace period. Log handles are closed when the workers drop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        match join_or_abort(self.handles, SHUTDOWN_GRACE).await {
            Some(results) => {
                for (id, result) in results.into_iter().enumerate() {
                    match result {
                        Ok(Ok(exit)) => debug!(worker = id, ?exit, "worker stopped"),
                        Ok(Err(err)) => debug!(worker = id, error = %err, "worker stopped with error"),
                        Err(err) => warn!(worker = id, error = %err, "worker task failed"),
                    }
                }
            }
            None => warn!("workers did not stop within grace period, aborted"),
        }

        info!(issued = self.counter.issued(), "worker pool stopped");
    }
}

/// Wait up to `grace` for every task. Stragglers are aborted and reaped, so
/// nothing they own (bridge children included) outlives this call.
///
/// Returns the task results when all finished in time.
async fn join_or_abort<T>(
    mut handles: Vec<JoinHandle<T>>,
    grace: Duration,
) -> Option<Vec<Result<T, JoinError>>> {
    let joined = tokio::time::timeout(grace, join_all(handles.iter_mut())).await;
    if let Ok(results) = joined {
        return Some(results);
    }

    for handle in handles {
        // Finished handles may already have yielded their output.
        if handle.is_finished() {
            continue;
        }
        handle.abort();
        let _ = handle.await;
    }
    None
}
