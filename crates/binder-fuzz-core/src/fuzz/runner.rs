//! Worker loop: repeated passes over the transaction catalog.
//!
//! A worker never stops on its own. It returns when the pool broadcasts
//! shutdown, after it reports a fatal condition, or when its bridge or log
//! fails.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::catalog::{Catalog, TransactionSpec};

use super::executor::TransactionExecutor;
use super::report::{FatalCondition, RecordLog};
use super::value_gen::ValueGenerator;

/// Which catalog entries a worker visits on every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Every entry, in catalog order.
    Full,
    /// Entries `offset, offset + stride, ...`.
    Strided { offset: usize, stride: usize },
}

impl Assignment {
    /// Indices of `len` catalog entries assigned to this worker.
    pub fn indices(self, len: usize) -> Vec<usize> {
        match self {
            Assignment::Full => (0..len).collect(),
            Assignment::Strided { offset, stride } => {
                (offset..len).step_by(stride.max(1)).collect()
            }
        }
    }
}

/// Why a worker loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Shutdown,
    Escalated,
}

/// One fuzzing worker.
pub struct Worker<R, W: Write> {
    pub id: usize,
    pub catalog: Arc<Catalog>,
    pub assignment: Assignment,
    pub executor: TransactionExecutor,
    pub generator: ValueGenerator<R>,
    pub log: RecordLog<W>,
    pub shutdown: watch::Receiver<bool>,
    pub fatal_tx: mpsc::UnboundedSender<FatalCondition>,
}

impl<R: Rng, W: Write> Worker<R, W> {
    /// Run until shutdown or escalation.
    ///
    /// Bridge and log failures are reported to the supervisor as
    /// [`FatalCondition::WorkerFailed`] and returned.
    pub async fn run(self) -> Result<WorkerExit> {
        let Worker {
            id,
            catalog,
            assignment,
            executor,
            mut generator,
            mut log,
            mut shutdown,
            fatal_tx,
        } = self;

        let indices = assignment.indices(catalog.len());
        debug!(worker = id, transactions = indices.len(), "worker started");

        if indices.is_empty() {
            // Nothing to fuzz; idle until the pool shuts down.
            let _ = shutdown.changed().await;
            return Ok(WorkerExit::Shutdown);
        }

        loop {
            for &index in &indices {
                if *shutdown.borrow() {
                    return Ok(WorkerExit::Shutdown);
                }
                let spec: &TransactionSpec = &catalog.transactions[index];

                let result = tokio::select! {
                    biased;
                    _ = shutdown.changed() => return Ok(WorkerExit::Shutdown),
                    result = executor.execute(spec, &mut generator, &mut log) => result,
                };

                let record = match result {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(worker = id, error = %err, "worker failed");
                        let _ = fatal_tx.send(FatalCondition::WorkerFailed {
                            worker: id,
                            reason: format!("{err:#}"),
                        });
                        return Err(err);
                    }
                };

                if let Some(fatal) = FatalCondition::from_record(&record) {
                    warn!(worker = id, %fatal, "escalating fatal condition");
                    let _ = fatal_tx.send(fatal);
                    return Ok(WorkerExit::Escalated);
                }

                // Invalid entries complete without awaiting anything.
                tokio::task::yield_now().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InputTypeSpec;
    use crate::fuzz::bridge::BridgeResponse;
    use crate::fuzz::counter::OrderingCounter;
    use crate::fuzz::executor::tests::ScriptedBridge;
    use crate::fuzz::report::LogFormat;
    use std::time::Duration;

    fn catalog(entries: &[(&str, i64)]) -> Arc<Catalog> {
        Arc::new(Catalog {
            transactions: entries
                .iter()
                .map(|(name, code)| TransactionSpec {
                    service_name: Some(name.to_string()),
                    code: Some(*code),
                    input_types: vec![InputTypeSpec::of("i32")],
                })
                .collect(),
        })
    }

    fn worker(
        catalog: Arc<Catalog>,
        bridge: Arc<ScriptedBridge>,
        shutdown: watch::Receiver<bool>,
        fatal_tx: mpsc::UnboundedSender<FatalCondition>,
    ) -> Worker<rand::rngs::StdRng, Vec<u8>> {
        Worker {
            id: 0,
            catalog,
            assignment: Assignment::Full,
            executor: TransactionExecutor::new(bridge, OrderingCounter::new()),
            generator: ValueGenerator::new(1),
            log: RecordLog::new(Vec::new(), LogFormat::Text),
            shutdown,
            fatal_tx,
        }
    }

    #[test]
    fn test_assignment_indices() {
        assert_eq!(Assignment::Full.indices(3), [0, 1, 2]);
        assert_eq!(
            Assignment::Strided { offset: 1, stride: 3 }.indices(8),
            [1, 4, 7]
        );
        assert!(Assignment::Strided { offset: 5, stride: 2 }
            .indices(3)
            .is_empty());
    }

    #[tokio::test]
    async fn test_worker_loops_over_catalog_until_crash() {
        // Third call reports a crash
        let bridge = Arc::new(ScriptedBridge::new(|i| BridgeResponse::Completed {
            stdout: String::new(),
            stderr: if i == 2 { "does not exist".into() } else { String::new() },
        }));
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();

        let exit = worker(catalog(&[("a", 1), ("b", 2)]), bridge.clone(), stop_rx, fatal_tx)
            .run()
            .await
            .unwrap();

        assert_eq!(exit, WorkerExit::Escalated);
        let calls = bridge.calls.lock();
        let services: Vec<&str> = calls.iter().map(|c| c.args[3].as_str()).collect();
        assert_eq!(services, ["a", "b", "a"]);
        drop(calls);

        match fatal_rx.recv().await {
            Some(FatalCondition::CrashDetected { sequence_id, .. }) => {
                assert_eq!(sequence_id.0, 3)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(fatal_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let bridge = Arc::new(ScriptedBridge::always("ok", ""));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(worker(catalog(&[("a", 1)]), bridge.clone(), stop_rx, fatal_tx).run());
        while bridge.call_count() < 10 {
            tokio::task::yield_now().await;
        }
        stop_tx.send(true).unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(exit, WorkerExit::Shutdown);
    }

    #[tokio::test]
    async fn test_invalid_only_catalog_leaves_runtime_responsive() {
        let bridge = Arc::new(ScriptedBridge::always("", ""));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();
        let invalid = Arc::new(Catalog {
            transactions: vec![TransactionSpec {
                service_name: None,
                code: Some(1),
                input_types: Vec::new(),
            }],
        });

        let handle = tokio::spawn(worker(invalid, bridge.clone(), stop_rx, fatal_tx).run());
        // Timer must still fire on this single-threaded runtime.
        tokio::time::timeout(Duration::from_secs(5), tokio::time::sleep(Duration::from_millis(50)))
            .await
            .expect("worker starved the runtime");

        stop_tx.send(true).unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(exit, WorkerExit::Shutdown);
        assert_eq!(bridge.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_catalog_idles_until_shutdown() {
        let bridge = Arc::new(ScriptedBridge::always("", ""));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (fatal_tx, _fatal_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(worker(Arc::new(Catalog::default()), bridge.clone(), stop_rx, fatal_tx).run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        stop_tx.send(true).unwrap();
        let exit = handle.await.unwrap().unwrap();
        assert_eq!(exit, WorkerExit::Shutdown);
        assert_eq!(bridge.call_count(), 0);
    }
}
