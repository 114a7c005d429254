//! Fatal-condition termination and full restart.
//!
//! A generation is one worker pool plus its capture processes and a fresh
//! ordering counter. The first fatal condition of a generation tears all of
//! it down; the supervisor then either builds the next generation from
//! scratch or exits.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::capture::{CaptureSet, CaptureTarget};
use crate::catalog::Catalog;
use crate::config::FuzzConfig;
use crate::fuzz::{Bridge, FatalCondition, WorkerPool};

/// Exit status after a fatal condition that cannot be restarted.
pub const EXIT_FATAL: i32 = 1;
/// Exit status when interrupted while waiting to restart.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Controller lifecycle, logged on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Running { generation: u32 },
    Terminating(FatalCondition),
    Restarting,
    Exited(i32),
}

/// How the supervisor finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    pub code: i32,
    pub generations: u32,
    pub restarts: u32,
    /// Condition that ended the last generation, if one ran to termination.
    pub last_condition: Option<FatalCondition>,
}

pub struct Supervisor {
    config: FuzzConfig,
    catalog: Arc<Catalog>,
    bridge: Arc<dyn Bridge>,
}

impl Supervisor {
    pub fn new(config: FuzzConfig, catalog: Arc<Catalog>, bridge: Arc<dyn Bridge>) -> Self {
        Self {
            config,
            catalog,
            bridge,
        }
    }

    /// Run generations until a condition ends the process.
    ///
    /// `interrupt` is called once per generation and once per restart delay;
    /// its future resolving counts as an operator interrupt.
    pub async fn run<F, Fut>(&self, mut interrupt: F) -> ExitReport
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut report = ExitReport {
            code: EXIT_FATAL,
            generations: 0,
            restarts: 0,
            last_condition: None,
        };

        loop {
            report.generations += 1;
            let generation = report.generations;
            let run_id = Uuid::new_v4();
            let span = info_span!("generation", generation, %run_id);

            transition(ControllerState::Running { generation });
            let condition = match self
                .run_generation(&mut interrupt)
                .instrument(span.clone())
                .await
            {
                Ok(condition) => condition,
                Err(err) => {
                    error!(parent: &span, error = %format!("{err:#}"), "could not start generation");
                    transition(ControllerState::Exited(EXIT_FATAL));
                    return report;
                }
            };

            announce(&condition);
            report.last_condition = Some(condition.clone());

            if !condition.is_restartable() {
                transition(ControllerState::Exited(EXIT_FATAL));
                return report;
            }
            if !self.config.may_restart(report.restarts) {
                warn!(restarts = report.restarts, "restart budget exhausted");
                transition(ControllerState::Exited(EXIT_FATAL));
                return report;
            }

            transition(ControllerState::Restarting);
            println!("Restarting fuzzing");
            let delay = self.config.restart_delay;
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = interrupt() => {
                        info!("interrupted during restart delay");
                        report.code = EXIT_INTERRUPTED;
                        transition(ControllerState::Exited(EXIT_INTERRUPTED));
                        return report;
                    }
                }
            }
            report.restarts += 1;
        }
    }

    /// Start captures and workers, wait for the first fatal condition, then
    /// tear everything down.
    async fn run_generation<F, Fut>(&self, interrupt: &mut F) -> Result<FatalCondition>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let captures = if self.config.capture {
            let targets = CaptureTarget::logcat(&self.config.logcat_file, &self.config.crash_file);
            match CaptureSet::start(&self.config.bridge_program, &targets) {
                Ok(set) => set,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "device log capture unavailable");
                    CaptureSet::default()
                }
            }
        } else {
            CaptureSet::default()
        };

        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
        let pool = match WorkerPool::spawn(
            &self.config.pool_settings(),
            Arc::clone(&self.catalog),
            Arc::clone(&self.bridge),
            fatal_tx,
        ) {
            Ok(pool) => pool,
            Err(err) => {
                captures.terminate().await;
                return Err(err);
            }
        };

        let condition = tokio::select! {
            received = fatal_rx.recv() => received.unwrap_or_else(|| FatalCondition::WorkerFailed {
                worker: 0,
                reason: "all workers exited".to_string(),
            }),
            _ = interrupt() => FatalCondition::ExternalInterrupt,
        };

        transition(ControllerState::Terminating(condition.clone()));
        let issued = pool.counter().issued();
        pool.shutdown().await;
        captures.terminate().await;

        // Later reports from the same generation are dropped with the receiver.
        let discarded = std::iter::from_fn(|| fatal_rx.try_recv().ok()).count();
        info!(issued, discarded, "generation terminated");
        Ok(condition)
    }
}

fn transition(state: ControllerState) {
    info!(?state, "controller state");
}

/// Operator-facing notice for a fatal condition.
fn announce(condition: &FatalCondition) {
    warn!(%condition, "fatal condition");
    match condition {
        FatalCondition::TargetUnavailable { .. } => println!("no devices/emulators found"),
        FatalCondition::CrashDetected { sequence_id, .. } => {
            println!("Crash detected at [{sequence_id}]")
        }
        FatalCondition::ExternalInterrupt => println!("Interrupted"),
        FatalCondition::WorkerFailed { .. } => println!("{condition}"),
    }
}
