// ABOUTME: Hook sink: runs project scripts when a release finishes.
// ABOUTME: Discovers .release/hooks/on-success and on-failure; the report arrives on stdin.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{JsonFileSink, ReportSink, SinkError};
use crate::controller::{ReleaseReport, ReleaseStatus};

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

/// Hook execution points at the end of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// The release succeeded.
    OnSuccess,
    /// The release failed or was cancelled.
    OnFailure,
}

impl HookPoint {
    pub fn for_status(status: ReleaseStatus) -> Self {
        match status {
            ReleaseStatus::Succeeded => HookPoint::OnSuccess,
            _ => HookPoint::OnFailure,
        }
    }

    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::OnSuccess => "on-success",
            HookPoint::OnFailure => "on-failure",
        }
    }
}

/// Discovers and runs hooks from a project directory.
#[derive(Debug, Clone)]
pub struct HookSink {
    hooks_dir: PathBuf,
    reports: Option<JsonFileSink>,
    timeout: Duration,
}

impl HookSink {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            hooks_dir: project_dir.join(".release").join("hooks"),
            reports: None,
            timeout: DEFAULT_HOOK_TIMEOUT,
        }
    }

    /// Pass the path of the report written by `reports` as `RELEASE_REPORT`.
    pub fn with_report_files(mut self, reports: JsonFileSink) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Environment handed to hooks: the request bindings plus the outcome.
    pub fn hook_env(&self, report: &ReleaseReport) -> BTreeMap<String, String> {
        let mut env = report.request().bindings();
        env.insert("RELEASE_STATUS".to_string(), report.status().to_string());
        if let Some(failed) = report.failed_stage() {
            env.insert("RELEASE_FAILED_STAGE".to_string(), failed.stage().to_string());
        }
        if let Some(ref reports) = self.reports {
            env.insert(
                "RELEASE_REPORT".to_string(),
                reports.path_for(report).display().to_string(),
            );
        }
        env
    }
}

#[async_trait]
impl ReportSink for HookSink {
    fn name(&self) -> &str {
        "hook"
    }

    async fn publish(&self, report: &ReleaseReport) -> Result<(), SinkError> {
        let point = HookPoint::for_status(report.status());
        let hook_path = self.hook_path(point);
        if !hook_path.is_file() {
            return Ok(());
        }

        tracing::info!("Running {} hook: {}", point.filename(), hook_path.display());

        let json = serde_json::to_vec(report)?;
        let mut child = Command::new(&hook_path)
            .envs(self.hook_env(report))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SinkError::HookLaunch {
                path: hook_path.clone(),
                source,
            })?;

        // Hooks may ignore stdin; a closed pipe is not an error.
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                let _ = stdin.write_all(&json).await;
            });
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(SinkError::HookLaunch {
                    path: hook_path,
                    source,
                });
            }
            Err(_) => {
                return Err(SinkError::HookFailed {
                    path: hook_path,
                    exit_code: None,
                    stderr: format!("timed out after {:?}", self.timeout),
                });
            }
        };

        if output.status.success() {
            tracing::info!("{} hook completed successfully", point.filename());
            Ok(())
        } else {
            Err(SinkError::HookFailed {
                path: hook_path,
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}
