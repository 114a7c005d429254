//! `run`: the full fuzzing harness.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use binder_fuzz_core::config::FuzzConfig;
use binder_fuzz_core::fuzz::{CommandBridge, LogFormat, OutputMarkers};
use binder_fuzz_core::supervisor::{ExitReport, Supervisor};

use super::{load_catalog, output};

#[derive(Parser, Debug)]
#[command(
    about = "Fuzz the catalog until a fatal condition ends the run",
    long_about = "Starts one worker per CPU core, each looping over the transaction \
                  catalog and issuing `<bridge> shell service call` with random \
                  arguments. Results are appended to the run log.\n\n\
                  A crash, a lost device or Ctrl+C stops every worker and the logcat \
                  captures, then restarts the harness with a fresh sequence counter."
)]
pub struct RunCmd {
    /// Transaction catalog (JSON)
    #[arg(long, default_value = "./services.json")]
    pub catalog: PathBuf,

    /// Run log, appended by all workers
    #[arg(long, default_value = "result.txt")]
    pub log: PathBuf,

    /// Bridge executable used for `shell service call` and `logcat`
    #[arg(long, default_value = "adb")]
    pub bridge: PathBuf,

    /// Number of workers (default: one per CPU core)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-invocation timeout in seconds
    #[arg(long, default_value = "5")]
    pub timeout_secs: u64,

    /// Base random seed; worker i uses seed + i (default: random)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Split the catalog across workers instead of giving each the full list
    #[arg(long)]
    pub partition: bool,

    /// Do not start the logcat captures
    #[arg(long)]
    pub no_capture: bool,

    /// Destination of `<bridge> logcat`
    #[arg(long, default_value = "log.txt")]
    pub logcat_file: PathBuf,

    /// Destination of `<bridge> logcat -b crash`
    #[arg(long, default_value = "crash.txt")]
    pub crash_file: PathBuf,

    /// Give up after this many restarts (default: restart forever)
    #[arg(long)]
    pub max_restarts: Option<u32>,

    /// Pause between teardown and restart, in milliseconds
    #[arg(long, default_value = "1000")]
    pub restart_delay_ms: u64,

    /// Run log format: text or jsonl
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Output substring that marks a crashed service
    #[arg(long, default_value = "does not exist")]
    pub crash_marker: String,

    /// Output substring that marks a missing device
    #[arg(long, default_value = "no devices/emulators found")]
    pub no_target_marker: String,
}

#[derive(Serialize)]
struct RunSummary {
    exit_code: i32,
    generations: u32,
    restarts: u32,
    last_condition: Option<String>,
}

impl From<&ExitReport> for RunSummary {
    fn from(report: &ExitReport) -> Self {
        Self {
            exit_code: report.code,
            generations: report.generations,
            restarts: report.restarts,
            last_condition: report.last_condition.as_ref().map(|c| c.to_string()),
        }
    }
}

impl RunCmd {
    pub fn config(&self) -> FuzzConfig {
        FuzzConfig {
            catalog_path: self.catalog.clone(),
            log_path: self.log.clone(),
            bridge_program: self.bridge.clone(),
            workers: self.workers,
            timeout: Duration::from_secs(self.timeout_secs),
            seed: self.seed,
            partition: self.partition,
            capture: !self.no_capture,
            logcat_file: self.logcat_file.clone(),
            crash_file: self.crash_file.clone(),
            max_restarts: self.max_restarts,
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            log_format: self.log_format,
            markers: OutputMarkers {
                target_unavailable: self.no_target_marker.clone(),
                crash: self.crash_marker.clone(),
            },
            ..FuzzConfig::default()
        }
    }

    /// Run the harness and return the process exit code.
    pub async fn execute(&self, json_output: bool) -> Result<i32> {
        let config = self.config();
        let catalog = Arc::new(load_catalog(&config.catalog_path)?);
        let bridge = Arc::new(CommandBridge::new(&config.bridge_program));
        tracing::info!(
            catalog = %config.catalog_path.display(),
            transactions = catalog.len(),
            workers = config.worker_count(),
            bridge = %config.bridge_program.display(),
            "starting fuzzing"
        );

        let supervisor = Supervisor::new(config, catalog, bridge);
        let report = supervisor
            .run(|| interrupt_or_pending(tokio::signal::ctrl_c()))
            .await;

        if json_output {
            output::print_json(&RunSummary::from(&report))?;
        }
        Ok(report.code)
    }
}

/// Resolve when `signal` reports Ctrl+C. A listener that cannot be installed
/// never resolves, so the run keeps going without interrupt support.
async fn interrupt_or_pending<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(err) = signal.await {
        tracing::warn!(error = %err, "cannot listen for Ctrl+C, interrupts disabled");
        std::future::pending::<()>().await;
    }
}
