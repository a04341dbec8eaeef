// ABOUTME: Runs single external tool invocations with a timeout.
// ABOUTME: Exposes the ActionExecutor trait and its process-backed implementation.

mod action;
mod error;
mod process;

pub use action::{Action, RenderedAction, SuccessPredicate};
pub use error::ActionError;
pub use process::{DEFAULT_OUTPUT_CAP, ProcessExecutor};

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Captured result of one finished process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResult {
    /// Exit code, `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Output exceeded the capture cap and was cut.
    pub truncated: bool,
}

impl ActionResult {
    /// Last `max` bytes of combined output, stderr last, for failure reports.
    pub fn tail(&self, max: usize) -> String {
        let mut combined = String::new();
        if !self.stdout.is_empty() {
            combined.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&self.stderr);
        }
        tail_str(&combined, max).to_string()
    }
}

/// Keep the last `max` bytes of `s`, cut on a char boundary.
pub(crate) fn tail_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// Executes one external operation.
///
/// Implementations spawn exactly one process per call and never retry;
/// retrying is the caller's job. A non-zero exit is not an error here, the
/// caller judges it with the action's success predicate.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &RenderedAction,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ActionResult, ActionError>;
}
