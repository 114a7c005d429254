//! External command bridge used to reach the device.
//!
//! The production bridge spawns `<program> shell service call ...` (normally
//! `adb`) as a child process. The [`Bridge`] trait is the seam the executor
//! depends on, so tests can script responses without a device.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// A concrete `service call` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// `<program> shell service call <service> <code> [token ...]`.
    ///
    /// Each token stays a single argv entry.
    pub fn service_call(program: &str, service_name: &str, code: i64, tokens: Vec<String>) -> Self {
        let mut args = Vec::with_capacity(5 + tokens.len());
        args.extend(["shell", "service", "call"].map(String::from));
        args.push(service_name.to_string());
        args.push(code.to_string());
        args.extend(tokens);
        Self {
            program: program.to_string(),
            args,
        }
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// The tokens after `service call <service> <code>`.
    pub fn payload(&self) -> &[String] {
        self.args.get(5..).unwrap_or_default()
    }
}

/// Result of running an invocation to completion or timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeResponse {
    Completed { stdout: String, stderr: String },
    TimedOut,
}

#[async_trait]
pub trait Bridge: Send + Sync {
    /// Program name placed at the head of every invocation.
    fn program(&self) -> &str;

    /// Run `invocation`, giving up after `timeout`.
    ///
    /// An `Err` means the bridge itself could not be run, not that the
    /// remote call failed.
    async fn invoke(&self, invocation: &Invocation, timeout: Duration) -> Result<BridgeResponse>;
}

/// Bridge backed by a real executable.
#[derive(Debug, Clone)]
pub struct CommandBridge {
    program: PathBuf,
    display: String,
}

impl CommandBridge {
    pub fn new(program: impl AsRef<Path>) -> Self {
        let program = program.as_ref().to_path_buf();
        let display = program.display().to_string();
        Self { program, display }
    }
}

#[async_trait]
impl Bridge for CommandBridge {
    fn program(&self) -> &str {
        &self.display
    }

    async fn invoke(&self, invocation: &Invocation, timeout: Duration) -> Result<BridgeResponse> {
        let child = Command::new(&self.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawn bridge {}", self.display))?;

        // Dropping the pending future on timeout drops the child, which kills it.
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.with_context(|| format!("wait for bridge {}", self.display))?;
                Ok(BridgeResponse::Completed {
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                })
            }
            Err(_) => Ok(BridgeResponse::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_call_layout() {
        let inv = Invocation::service_call("adb", "activity", 5, vec!["i32 3".into()]);
        assert_eq!(
            inv.args,
            ["shell", "service", "call", "activity", "5", "i32 3"]
        );
        assert_eq!(inv.payload(), ["i32 3"]);
        assert_eq!(inv.argv()[0], "adb");
    }

    #[test]
    fn test_empty_payload() {
        let inv = Invocation::service_call("adb", "window", 1, Vec::new());
        assert!(inv.payload().is_empty());
        assert_eq!(inv.argv().join(" "), "adb shell service call window 1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_bridge_captures_both_streams() {
        let bridge = CommandBridge::new("sh");
        let inv = Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), "printf out; printf err >&2".into()],
        };
        let response = bridge.invoke(&inv, Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            response,
            BridgeResponse::Completed {
                stdout: "out".into(),
                stderr: "err".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_bridge_replaces_invalid_utf8() {
        let bridge = CommandBridge::new("sh");
        let inv = Invocation {
            program: "sh".into(),
            args: vec!["-c".into(), r"printf 'a\377b'".into()],
        };
        match bridge.invoke(&inv, Duration::from_secs(5)).await.unwrap() {
            BridgeResponse::Completed { stdout, .. } => assert_eq!(stdout, "a\u{FFFD}b"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_bridge_times_out() {
        let bridge = CommandBridge::new("sleep");
        let inv = Invocation {
            program: "sleep".into(),
            args: vec!["5".into()],
        };
        let response = bridge
            .invoke(&inv, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(response, BridgeResponse::TimedOut);
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let bridge = CommandBridge::new("/nonexistent/bridge-binary");
        let inv = Invocation::service_call("x", "activity", 1, Vec::new());
        assert!(bridge.invoke(&inv, Duration::from_secs(1)).await.is_err());
    }
}
