// ABOUTME: Terminal, immutable record of one release attempt.
// ABOUTME: Serializable for sinks; maps to the CLI exit code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::request::ReleaseRequest;
use crate::stage::{StageOutcome, StageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ReleaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReleaseStatus::Succeeded | ReleaseStatus::Failed | ReleaseStatus::Cancelled
        )
    }

    /// Process exit code for a release ending in this status.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReleaseStatus::Succeeded => 0,
            ReleaseStatus::Cancelled => 2,
            ReleaseStatus::Pending | ReleaseStatus::Running | ReleaseStatus::Failed => 1,
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseStatus::Pending => "pending",
            ReleaseStatus::Running => "running",
            ReleaseStatus::Succeeded => "succeeded",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome of one release: one stage outcome per graph stage, in order.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseReport {
    request: ReleaseRequest,
    status: ReleaseStatus,
    stages: Vec<StageOutcome>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    /// Set when the release aborted outside any stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ReleaseReport {
    pub(crate) fn new(
        request: ReleaseRequest,
        status: ReleaseStatus,
        stages: Vec<StageOutcome>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request,
            status,
            stages,
            started_at,
            finished_at: Utc::now(),
            error: None,
        }
    }

    /// A release whose execution aborted unexpectedly.
    pub(crate) fn aborted(
        request: ReleaseRequest,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            request,
            status: ReleaseStatus::Failed,
            stages: Vec::new(),
            started_at,
            finished_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    pub fn request(&self) -> &ReleaseRequest {
        &self.request
    }

    pub fn status(&self) -> ReleaseStatus {
        self.status
    }

    pub fn outcomes(&self) -> &[StageOutcome] {
        &self.stages
    }

    pub fn outcome(&self, stage: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|o| *o.stage() == stage)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The blocking stage whose failure decided the release.
    pub fn failed_stage(&self) -> Option<&StageOutcome> {
        self.stages.iter().find(|o| o.halts_release())
    }

    /// Non-blocking stages that failed without halting the release.
    pub fn non_blocking_failures(&self) -> impl Iterator<Item = &StageOutcome> {
        self.stages
            .iter()
            .filter(|o| !o.is_blocking() && o.status() == StageStatus::Failed)
    }

    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_by_status() {
        assert_eq!(ReleaseStatus::Succeeded.exit_code(), 0);
        assert_eq!(ReleaseStatus::Failed.exit_code(), 1);
        assert_eq!(ReleaseStatus::Cancelled.exit_code(), 2);
        assert!(!ReleaseStatus::Running.is_terminal());
        assert!(ReleaseStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ReleaseStatus::Succeeded).unwrap(),
            "\"succeeded\""
        );
        assert_eq!(ReleaseStatus::Failed.to_string(), "failed");
    }
}
