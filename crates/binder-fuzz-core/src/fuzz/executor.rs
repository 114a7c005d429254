//! Single-transaction execution and outcome classification.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{debug, trace};

use crate::catalog::TransactionSpec;

use super::bridge::{Bridge, BridgeResponse, Invocation};
use super::counter::OrderingCounter;
use super::report::{LogRecord, Outcome, RecordLog};
use super::value_gen::{SlotError, ValueGenerator};

/// Hard limit on a single bridge invocation.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Output substrings used to classify an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMarkers {
    /// The bridge has no device to talk to.
    pub target_unavailable: String,
    /// The target service vanished, taken as a crash.
    pub crash: String,
}

impl Default for OutputMarkers {
    fn default() -> Self {
        Self {
            target_unavailable: "no devices/emulators found".to_string(),
            crash: "does not exist".to_string(),
        }
    }
}

impl OutputMarkers {
    /// Classify a completed invocation by its captured streams.
    pub fn classify(&self, stdout: &str, stderr: &str) -> Outcome {
        let seen = |marker: &str| stdout.contains(marker) || stderr.contains(marker);
        if seen(&self.target_unavailable) {
            Outcome::TargetUnavailable
        } else if seen(&self.crash) {
            Outcome::Crash
        } else {
            Outcome::Normal
        }
    }
}

/// Validated target and generated arguments for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCall<'a> {
    pub service_name: &'a str,
    pub code: i64,
    pub tokens: Vec<String>,
    /// Slots that produced no tokens. The call still runs without them.
    pub skipped: Vec<SlotError>,
}

/// Validate `spec` and generate its argument tokens.
///
/// Returns `None` for a transaction without a usable service name or code;
/// nothing is generated for it.
pub fn prepare_call<'a, R: Rng>(
    spec: &'a TransactionSpec,
    generator: &mut ValueGenerator<R>,
) -> Option<PreparedCall<'a>> {
    let (service_name, code) = spec.target()?;
    let mut tokens = Vec::new();
    let mut skipped = Vec::new();
    for slot in &spec.input_types {
        match generator.generate(slot) {
            Ok(generated) => tokens.extend(generated),
            Err(err) => skipped.push(err),
        }
    }
    Some(PreparedCall {
        service_name,
        code,
        tokens,
        skipped,
    })
}

/// Builds, runs and classifies invocations for one worker.
///
/// Clones share the bridge and the run's [`OrderingCounter`].
#[derive(Clone)]
pub struct TransactionExecutor {
    bridge: Arc<dyn Bridge>,
    counter: OrderingCounter,
    markers: OutputMarkers,
    timeout: Duration,
}

impl TransactionExecutor {
    pub fn new(bridge: Arc<dyn Bridge>, counter: OrderingCounter) -> Self {
        Self {
            bridge,
            counter,
            markers: OutputMarkers::default(),
            timeout: DEFAULT_INVOCATION_TIMEOUT,
        }
    }

    pub fn with_markers(mut self, markers: OutputMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn counter(&self) -> &OrderingCounter {
        &self.counter
    }

    /// Execute one transaction with freshly generated arguments.
    ///
    /// Diagnostics for skipped slots are appended before the invocation
    /// record. Returns the record of the invocation, or the
    /// invalid-transaction record when nothing was invoked. An `Err` means
    /// the bridge could not be run or the log could not be written.
    pub async fn execute<R: Rng, W: Write>(
        &self,
        spec: &TransactionSpec,
        generator: &mut ValueGenerator<R>,
        log: &mut RecordLog<W>,
    ) -> Result<LogRecord> {
        let Some(call) = prepare_call(spec, generator) else {
            let record = LogRecord::invalid_transaction();
            log.append(&record).context("append log record")?;
            return Ok(record);
        };
        for err in &call.skipped {
            trace!(service = call.service_name, code = call.code, "{err}");
            log.append(&LogRecord::skipped_slot(err))
                .context("append log record")?;
        }
        let PreparedCall {
            service_name,
            code,
            tokens,
            ..
        } = call;

        let sequence_id = self.counter.next_id();
        let invocation = Invocation::service_call(self.bridge.program(), service_name, code, tokens);

        let record = match self.bridge.invoke(&invocation, self.timeout).await? {
            BridgeResponse::Completed { stdout, stderr } => {
                let outcome = self.markers.classify(&stdout, &stderr);
                LogRecord::invocation(sequence_id, invocation.argv(), outcome, stdout, stderr)
            }
            BridgeResponse::TimedOut => LogRecord::invocation(
                sequence_id,
                invocation.argv(),
                Outcome::Timeout,
                String::new(),
                String::new(),
            ),
        };

        debug!(
            seq = %sequence_id,
            service = service_name,
            code,
            outcome = ?record.outcome,
            "invocation complete"
        );
        log.append(&record).context("append log record")?;
        Ok(record)
    }
}
