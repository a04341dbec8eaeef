// ABOUTME: Recorded result of one stage within a release.
// ABOUTME: Outcomes are built once and only read afterwards.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::error::{ErrorKind, StageError};
use crate::rollout::RolloutResult;
use crate::types::StageName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
    Cancelled,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
            StageStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a stage did not run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The stage's precondition evaluated to false.
    Precondition,
    /// A blocking stage failed earlier in the run.
    UpstreamFailed { stage: StageName },
    /// The release was cancelled before the stage started.
    Cancelled,
}

/// Serializable failure detail kept in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&StageError> for StageFailure {
    fn from(error: &StageError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    stage: StageName,
    status: StageStatus,
    blocking: bool,
    attempts: u32,
    #[serde(with = "humantime_serde")]
    duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<StageFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollout: Option<RolloutResult>,
}

impl StageOutcome {
    pub(crate) fn succeeded(
        stage: StageName,
        blocking: bool,
        attempts: u32,
        duration: Duration,
        output: Option<String>,
        rollout: Option<RolloutResult>,
    ) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            blocking,
            attempts,
            duration,
            output,
            error: None,
            skip_reason: None,
            rollout,
        }
    }

    /// A failed or cancelled stage, depending on the error kind.
    pub(crate) fn failed(
        stage: StageName,
        blocking: bool,
        attempts: u32,
        duration: Duration,
        output: Option<String>,
        failure: StageFailure,
    ) -> Self {
        let status = if failure.kind == ErrorKind::Cancelled {
            StageStatus::Cancelled
        } else {
            StageStatus::Failed
        };
        Self {
            stage,
            status,
            blocking,
            attempts,
            duration,
            output,
            error: Some(failure),
            skip_reason: None,
            rollout: None,
        }
    }

    /// A stage that never ran. Skipped stages have no attempts.
    pub(crate) fn skipped(stage: StageName, blocking: bool, reason: SkipReason) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            blocking,
            attempts: 0,
            duration: Duration::ZERO,
            output: None,
            error: None,
            skip_reason: Some(reason),
            rollout: None,
        }
    }

    pub fn stage(&self) -> &StageName {
        &self.stage
    }

    pub fn status(&self) -> StageStatus {
        self.status
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Tail of the last captured output.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn error(&self) -> Option<&StageFailure> {
        self.error.as_ref()
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        self.skip_reason.as_ref()
    }

    pub fn rollout(&self) -> Option<&RolloutResult> {
        self.rollout.as_ref()
    }

    /// A blocking stage that failed halts downstream blocking work.
    pub fn halts_release(&self) -> bool {
        self.blocking && self.status == StageStatus::Failed
    }
}
