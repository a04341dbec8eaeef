// ABOUTME: Report sinks: where finished release reports are published.
// ABOUTME: Sink failures become warnings; they never change a release's outcome.

mod hook;
mod json_file;

pub use hook::{HookPoint, HookSink};
pub use json_file::JsonFileSink;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::controller::{ReleaseReport, ReleaseStatus};
use crate::diagnostics::Warning;
use crate::stage::StageStatus;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to run hook {path}: {source}")]
    HookLaunch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("hook {path} exited with {exit_code:?}: {stderr}")]
    HookFailed {
        path: PathBuf,
        exit_code: Option<i32>,
        stderr: String,
    },
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Short name used in warnings.
    fn name(&self) -> &str;

    async fn publish(&self, report: &ReleaseReport) -> Result<(), SinkError>;
}

/// Publish `report` to every sink in order, turning failures into warnings.
pub async fn publish_all(sinks: &[Arc<dyn ReportSink>], report: &ReleaseReport) -> Vec<Warning> {
    let mut warnings = Vec::new();
    for sink in sinks {
        if let Err(e) = sink.publish(report).await {
            warnings.push(Warning::sink_failure(format!(
                "{} sink for {}: {}",
                sink.name(),
                report.request().target(),
                e
            )));
        }
    }
    warnings
}

/// Writes the report to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl ReportSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, report: &ReleaseReport) -> Result<(), SinkError> {
        for outcome in report.outcomes() {
            match outcome.status() {
                StageStatus::Failed | StageStatus::Cancelled => tracing::warn!(
                    stage = %outcome.stage(),
                    status = %outcome.status(),
                    attempts = outcome.attempts(),
                    error = outcome.error().map(|e| e.message.as_str()).unwrap_or(""),
                    "stage outcome"
                ),
                _ => tracing::info!(
                    stage = %outcome.stage(),
                    status = %outcome.status(),
                    attempts = outcome.attempts(),
                    "stage outcome"
                ),
            }
        }

        let env = report.request().target();
        match report.status() {
            ReleaseStatus::Succeeded => {
                tracing::info!(env = %env, artifact = %report.request().artifact(), "release succeeded")
            }
            status => tracing::warn!(env = %env, %status, "release did not succeed"),
        }
        Ok(())
    }
}

/// Keeps published reports in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<ReleaseReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ReleaseReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, report: &ReleaseReport) -> Result<(), SinkError> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}
