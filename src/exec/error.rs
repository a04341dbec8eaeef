// ABOUTME: Error types for external action execution.
// ABOUTME: Covers launch failures, timeouts, cancellation, and output capture.

use std::time::Duration;

/// Errors from spawning or supervising an external process.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The program could not be started (missing binary, permissions).
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran past its timeout and was killed.
    #[error("'{program}' timed out after {}s", .after.as_secs_f64())]
    Timeout { program: String, after: Duration },

    /// The process was killed because the release was cancelled.
    #[error("'{program}' was cancelled")]
    Cancelled { program: String },

    /// Waiting for the process or reading its output failed.
    #[error("failed to capture output of '{program}': {source}")]
    Capture {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ActionError {
    pub fn program(&self) -> &str {
        match self {
            ActionError::Launch { program, .. }
            | ActionError::Timeout { program, .. }
            | ActionError::Cancelled { program }
            | ActionError::Capture { program, .. } => program,
        }
    }
}
