//! Resolved configuration for a fuzzing run.

use std::path::PathBuf;
use std::time::Duration;

use crate::fuzz::{default_worker_count, LogFormat, OutputMarkers, PoolSettings, DEFAULT_INVOCATION_TIMEOUT};

/// Configuration for [`crate::supervisor::Supervisor`].
#[derive(Debug, Clone)]
pub struct FuzzConfig {
    /// Transaction catalog (JSON).
    pub catalog_path: PathBuf,
    /// Run log shared by all workers, opened for appending.
    pub log_path: PathBuf,
    /// Bridge executable, normally `adb`.
    pub bridge_program: PathBuf,
    /// Worker count. `None` uses one worker per available core.
    pub workers: Option<usize>,
    /// Hard limit per invocation.
    pub timeout: Duration,
    /// Base seed for reproducible runs.
    pub seed: Option<u64>,
    /// Split the catalog across workers.
    pub partition: bool,
    /// Start the auxiliary logcat captures.
    pub capture: bool,
    pub logcat_file: PathBuf,
    pub crash_file: PathBuf,
    /// Restart budget. `None` restarts forever.
    pub max_restarts: Option<u32>,
    /// Pause between teardown and the next generation.
    pub restart_delay: Duration,
    pub log_format: LogFormat,
    pub markers: OutputMarkers,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("services.json"),
            log_path: PathBuf::from("result.txt"),
            bridge_program: PathBuf::from("adb"),
            workers: None,
            timeout: DEFAULT_INVOCATION_TIMEOUT,
            seed: None,
            partition: false,
            capture: true,
            logcat_file: PathBuf::from("log.txt"),
            crash_file: PathBuf::from("crash.txt"),
            max_restarts: None,
            restart_delay: Duration::from_millis(1000),
            log_format: LogFormat::Text,
            markers: OutputMarkers::default(),
        }
    }
}

impl FuzzConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.filter(|&n| n > 0).unwrap_or_else(default_worker_count)
    }

    /// Settings handed to each generation's worker pool.
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            workers: self.worker_count(),
            log_path: self.log_path.clone(),
            log_format: self.log_format,
            timeout: self.timeout,
            markers: self.markers.clone(),
            seed: self.seed,
            partition: self.partition,
        }
    }

    /// Whether `restarts_done` restarts leave room for one more.
    pub fn may_restart(&self, restarts_done: u32) -> bool {
        self.max_restarts.map_or(true, |max| restarts_done < max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FuzzConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.log_path, PathBuf::from("result.txt"));
        assert!(config.capture);
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_zero_workers_falls_back_to_default() {
        let config = FuzzConfig {
            workers: Some(0),
            ..FuzzConfig::default()
        };
        assert_eq!(config.worker_count(), default_worker_count());
        let config = FuzzConfig {
            workers: Some(3),
            ..FuzzConfig::default()
        };
        assert_eq!(config.pool_settings().workers, 3);
    }

    #[test]
    fn test_restart_budget() {
        let unbounded = FuzzConfig::default();
        assert!(unbounded.may_restart(u32::MAX - 1));

        let bounded = FuzzConfig {
            max_restarts: Some(2),
            ..FuzzConfig::default()
        };
        assert!(bounded.may_restart(1));
        assert!(!bounded.may_restart(2));
    }
}
