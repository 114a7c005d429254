//! Auxiliary device log capture.
//!
//! While a generation runs, `<bridge> logcat` and `<bridge> logcat -b crash`
//! stream into files next to the run log. The files are truncated every time
//! a capture starts, and both output streams of a capture go to its file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// How long a killed capture gets to exit before it is abandoned.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// A capture command and the file it writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTarget {
    pub args: Vec<String>,
    pub path: PathBuf,
}

impl CaptureTarget {
    pub fn new(args: &[&str], path: impl Into<PathBuf>) -> Self {
        Self {
            args: args.iter().map(|s| s.to_string()).collect(),
            path: path.into(),
        }
    }

    /// Main and crash buffers of the device log.
    pub fn logcat(logcat_file: &Path, crash_file: &Path) -> Vec<Self> {
        vec![
            Self::new(&["logcat"], logcat_file),
            Self::new(&["logcat", "-b", "crash"], crash_file),
        ]
    }
}

struct CaptureProcess {
    label: String,
    child: Child,
}

/// Capture children started for one generation.
#[derive(Default)]
pub struct CaptureSet {
    processes: Vec<CaptureProcess>,
}

impl CaptureSet {
    /// Spawn one `<program> <args>` child per target.
    ///
    /// Children already started are killed on drop if a later one fails.
    pub fn start(program: &Path, targets: &[CaptureTarget]) -> Result<Self> {
        let mut set = Self::default();
        for target in targets {
            let out = File::create(&target.path)
                .with_context(|| format!("create capture file {}", target.path.display()))?;
            let err = out
                .try_clone()
                .with_context(|| format!("clone capture file {}", target.path.display()))?;
            let label = format!("{} {}", program.display(), target.args.join(" "));

            let child = Command::new(program)
                .args(&target.args)
                .stdin(Stdio::null())
                .stdout(Stdio::from(out))
                .stderr(Stdio::from(err))
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("spawn capture {label}"))?;

            debug!(capture = %label, file = %target.path.display(), "capture started");
            set.processes.push(CaptureProcess { label, child });
        }
        if !set.is_empty() {
            info!(captures = set.len(), "device log capture running");
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Kill every capture child and reap it.
    pub async fn terminate(self) {
        for CaptureProcess { label, mut child } in self.processes {
            if let Err(err) = child.start_kill() {
                // Already exited
                debug!(capture = %label, error = %err, "capture not killed");
            }
            match tokio::time::timeout(KILL_WAIT, child.wait()).await {
                Ok(Ok(status)) => debug!(capture = %label, %status, "capture stopped"),
                Ok(Err(err)) => warn!(capture = %label, error = %err, "capture wait failed"),
                Err(_) => warn!(capture = %label, "capture did not exit after kill"),
            }
        }
    }
}
