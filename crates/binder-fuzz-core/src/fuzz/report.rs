//! Outcome and log record types for fuzz invocations.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::counter::SequenceId;
use super::value_gen::SlotError;

/// Classification of a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Normal,
    Crash,
    Timeout,
    TargetUnavailable,
    InvalidTransaction,
    UnsupportedInputType,
}

impl Outcome {
    /// Whether this outcome must escalate to the supervisor.
    pub fn is_fatal(self) -> bool {
        matches!(self, Outcome::Crash | Outcome::TargetUnavailable)
    }
}

/// One append-only entry of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Absent for records that never reached the bridge.
    pub sequence_id: Option<SequenceId>,
    /// Full invocation argv (program first). Empty when nothing was invoked.
    pub command: Vec<String>,
    pub outcome: Outcome,
    pub stdout: String,
    pub stderr: String,
    /// Diagnostic text for invalid transactions and skipped slots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl LogRecord {
    pub fn invocation(
        sequence_id: SequenceId,
        command: Vec<String>,
        outcome: Outcome,
        stdout: String,
        stderr: String,
    ) -> Self {
        Self {
            sequence_id: Some(sequence_id),
            command,
            outcome,
            stdout,
            stderr,
            detail: None,
        }
    }

    pub fn invalid_transaction() -> Self {
        Self::diagnostic(
            Outcome::InvalidTransaction,
            "Invalid transaction data, skipping...".to_string(),
        )
    }

    pub fn skipped_slot(err: &SlotError) -> Self {
        Self::diagnostic(Outcome::UnsupportedInputType, err.to_string())
    }

    fn diagnostic(outcome: Outcome, detail: String) -> Self {
        Self {
            sequence_id: None,
            command: Vec::new(),
            outcome,
            stdout: String::new(),
            stderr: String::new(),
            detail: Some(detail),
        }
    }

    /// The invocation as a single space-joined line.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    /// Text log lines for this record, each terminated by `\n`.
    ///
    /// Target-unavailable records produce no lines; the supervisor prints the
    /// notice instead.
    pub fn render_text(&self) -> Vec<String> {
        let seq = self
            .sequence_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        match self.outcome {
            Outcome::Normal => vec![
                format!("[{seq}] Command: {}\n", self.command_line()),
                format!("Output: {}\n", self.stdout),
            ],
            Outcome::Crash => vec![
                format!("crash!! [{seq}] Command: {}\n", self.command_line()),
                format!("Output: {}, {}\n", self.stdout, self.stderr),
            ],
            Outcome::Timeout => {
                vec![format!("[{seq}] Timeout for command: {}\n", self.command_line())]
            }
            Outcome::TargetUnavailable => Vec::new(),
            Outcome::InvalidTransaction | Outcome::UnsupportedInputType => {
                vec![format!("{}\n", self.detail.as_deref().unwrap_or_default())]
            }
        }
    }
}

/// On-disk representation of the run log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Line-oriented text log.
    #[default]
    Text,
    /// One JSON object per record.
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(LogFormat::Text),
            "jsonl" => Ok(LogFormat::Jsonl),
            other => Err(format!("unknown log format '{other}' (expected text or jsonl)")),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogFormat::Text => "text",
            LogFormat::Jsonl => "jsonl",
        })
    }
}

/// Append-only record sink owned by a single worker.
///
/// Every line is handed to the writer in one `write_all` call, so workers
/// sharing a path through separate `O_APPEND` handles interleave whole lines.
pub struct RecordLog<W: Write = File> {
    out: W,
    format: LogFormat,
}

impl RecordLog<File> {
    /// Open (creating if needed) a log file for appending.
    pub fn open_append(path: &Path, format: LogFormat) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        Ok(Self::new(file, format))
    }
}

impl<W: Write> RecordLog<W> {
    pub fn new(out: W, format: LogFormat) -> Self {
        Self { out, format }
    }

    pub fn append(&mut self, record: &LogRecord) -> std::io::Result<()> {
        match self.format {
            LogFormat::Text => {
                for line in record.render_text() {
                    self.out.write_all(line.as_bytes())?;
                }
            }
            LogFormat::Jsonl => {
                let mut line = serde_json::to_string(record)?;
                line.push('\n');
                self.out.write_all(line.as_bytes())?;
            }
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// A condition that stops every worker of the current run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalCondition {
    #[error("no devices/emulators found")]
    TargetUnavailable { sequence_id: SequenceId },
    #[error("crash detected at [{sequence_id}]: {command}")]
    CrashDetected {
        sequence_id: SequenceId,
        command: String,
    },
    #[error("interrupted by operator")]
    ExternalInterrupt,
    #[error("worker {worker} failed: {reason}")]
    WorkerFailed { worker: usize, reason: String },
}

impl FatalCondition {
    /// Escalation for a record, if its outcome is fatal.
    pub fn from_record(record: &LogRecord) -> Option<Self> {
        let sequence_id = record.sequence_id?;
        match record.outcome {
            Outcome::TargetUnavailable => Some(Self::TargetUnavailable { sequence_id }),
            Outcome::Crash => Some(Self::CrashDetected {
                sequence_id,
                command: record.command_line(),
            }),
            _ => None,
        }
    }

    /// Whether a full restart can recover from this condition.
    pub fn is_restartable(&self) -> bool {
        !matches!(self, FatalCondition::WorkerFailed { .. })
    }
}
