//! Daily crop-model refresh
//!
//! The simulator that writes the growth feed is external. Before deciding, the
//! service asks the refresher to run it; the refresher remembers the last
//! calendar day it ran and does nothing on repeat calls that day.

use crate::config::GrowthConfig;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RefreshError {
    #[error("Crop model command could not be started: {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("Crop model exited with status {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Ran,
    AlreadyRanToday,
    Failed,
}

/// Runs the crop simulator once, regenerating the feed files
#[async_trait]
pub trait CropModelRunner: Send + Sync + fmt::Debug {
    async fn run(&self) -> Result<(), RefreshError>;
}

#[derive(Debug, Clone)]
pub struct CommandModelRunner {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandModelRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>, working_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir,
        }
    }

    /// Runner for the configured simulator command, if one is set
    pub fn from_config(config: &GrowthConfig) -> Option<Self> {
        config.model_command.as_ref().map(|program| {
            Self::new(
                program.clone(),
                config.model_args.clone(),
                config.model_working_dir.clone(),
            )
        })
    }
}

#[async_trait]
impl CropModelRunner for CommandModelRunner {
    async fn run(&self) -> Result<(), RefreshError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command.output().await.map_err(|e| RefreshError::Spawn {
            command: self.program.clone(),
            reason: e.to_string(),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(RefreshError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[derive(Debug)]
pub struct CropModelRefresher {
    runner: Option<Arc<dyn CropModelRunner>>,
    last_run: Mutex<Option<NaiveDate>>,
}

impl CropModelRefresher {
    pub fn new(runner: Arc<dyn CropModelRunner>) -> Self {
        Self {
            runner: Some(runner),
            last_run: Mutex::new(None),
        }
    }

    /// Refresher that never runs anything; the feed is maintained elsewhere
    pub fn disabled() -> Self {
        Self {
            runner: None,
            last_run: Mutex::new(None),
        }
    }

    pub fn from_config(config: &GrowthConfig) -> Self {
        match CommandModelRunner::from_config(config) {
            Some(runner) => Self::new(Arc::new(runner)),
            None => Self::disabled(),
        }
    }

    pub fn last_run(&self) -> Option<NaiveDate> {
        *self.last_run.lock()
    }

    /// Run the simulator unless it already ran on `today`. A failure is
    /// logged and the existing feed stays in use; the day is still marked so
    /// a broken simulator is not retried on every decision.
    pub async fn refresh_if_due(&self, today: NaiveDate) -> RefreshOutcome {
        let Some(runner) = &self.runner else {
            return RefreshOutcome::AlreadyRanToday;
        };

        {
            let mut last_run = self.last_run.lock();
            if *last_run == Some(today) {
                return RefreshOutcome::AlreadyRanToday;
            }
            *last_run = Some(today);
        }

        let started = Instant::now();
        match runner.run().await {
            Ok(()) => {
                info!(
                    date = %today,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "🌾 Crop model refreshed"
                );
                RefreshOutcome::Ran
            }
            Err(error) => {
                warn!(
                    date = %today,
                    error = %error,
                    "⚠️ Crop model refresh failed, using existing growth feed"
                );
                RefreshOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingRunner {
        runs: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CropModelRunner for CountingRunner {
        async fn run(&self) -> Result<(), RefreshError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RefreshError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    #[tokio::test]
    async fn test_runs_at_most_once_per_day() {
        let runner = Arc::new(CountingRunner::default());
        let refresher = CropModelRefresher::new(runner.clone());

        assert_eq!(refresher.refresh_if_due(day(1)).await, RefreshOutcome::Ran);
        assert_eq!(
            refresher.refresh_if_due(day(1)).await,
            RefreshOutcome::AlreadyRanToday
        );
        assert_eq!(refresher.refresh_if_due(day(2)).await, RefreshOutcome::Ran);
        assert_eq!(runner.runs.load(Ordering::SeqCst), 2);
        assert_eq!(refresher.last_run(), Some(day(2)));
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_not_retried_same_day() {
        let runner = Arc::new(CountingRunner {
            fail: true,
            ..Default::default()
        });
        let refresher = CropModelRefresher::new(runner.clone());

        assert_eq!(refresher.refresh_if_due(day(1)).await, RefreshOutcome::Failed);
        assert_eq!(
            refresher.refresh_if_due(day(1)).await,
            RefreshOutcome::AlreadyRanToday
        );
        assert_eq!(runner.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_refresher_never_runs() {
        let refresher = CropModelRefresher::from_config(&GrowthConfig::default());
        assert_eq!(
            refresher.refresh_if_due(day(1)).await,
            RefreshOutcome::AlreadyRanToday
        );
        assert_eq!(refresher.last_run(), None);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = CommandModelRunner::new("definitely-not-a-crop-model-binary", vec![], None);
        let result = runner.run().await;
        assert!(matches!(result, Err(RefreshError::Spawn { .. })));
    }
}
