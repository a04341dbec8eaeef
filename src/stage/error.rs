// ABOUTME: Stage failure taxonomy and retry classification.
// ABOUTME: Maps action, auth, and rollout errors onto a flat ErrorKind.

use serde::{Deserialize, Serialize};

use crate::credentials::AuthError;
use crate::exec::ActionError;
use crate::retry::{FailureClass, FailureClassifier};
use crate::rollout::RolloutError;

/// Flat classification of everything that can fail a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Tool missing or not executable.
    Launch,
    /// Action exceeded its timeout.
    Timeout,
    /// Action ran but its success predicate did not hold.
    CommandFailed,
    /// Credential exchange failed.
    Auth,
    /// Rollout did not converge in time.
    RolloutTimeout,
    /// Stopped by the user or an external signal.
    Cancelled,
    /// Stage or action configuration cannot be resolved.
    Config,
}

impl ErrorKind {
    /// Kinds that are never retried regardless of stage policy.
    pub fn is_always_terminal(self) -> bool {
        matches!(
            self,
            ErrorKind::Launch | ErrorKind::Cancelled | ErrorKind::Config | ErrorKind::RolloutTimeout
        )
    }
}

/// Why a stage failed.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("'{command}' failed with exit code {exit_code:?}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Rollout(#[from] RolloutError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Action(ActionError::Launch { .. }) => ErrorKind::Launch,
            StageError::Action(ActionError::Timeout { .. }) => ErrorKind::Timeout,
            StageError::Action(ActionError::Cancelled { .. }) => ErrorKind::Cancelled,
            StageError::Action(ActionError::Capture { .. }) => ErrorKind::CommandFailed,
            StageError::CommandFailed { .. } => ErrorKind::CommandFailed,
            StageError::Auth(AuthError::Cancelled) => ErrorKind::Cancelled,
            StageError::Auth(AuthError::NotConfigured) => ErrorKind::Config,
            StageError::Auth(AuthError::Launch(_)) => ErrorKind::Launch,
            StageError::Auth(_) => ErrorKind::Auth,
            StageError::Rollout(RolloutError::Cancelled { .. }) => ErrorKind::Cancelled,
            StageError::Rollout(_) => ErrorKind::RolloutTimeout,
            StageError::Config(_) => ErrorKind::Config,
        }
    }

    /// Captured output associated with the failure, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            StageError::CommandFailed { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

/// Retries the error kinds a stage lists in `retry_on`.
#[derive(Debug, Clone, Default)]
pub struct KindClassifier {
    retryable: Vec<ErrorKind>,
}

impl KindClassifier {
    pub fn new(retryable: &[ErrorKind]) -> Self {
        Self {
            retryable: retryable.to_vec(),
        }
    }
}

impl FailureClassifier<StageError> for KindClassifier {
    fn classify(&self, error: &StageError) -> FailureClass {
        let kind = error.kind();
        if !kind.is_always_terminal() && self.retryable.contains(&kind) {
            FailureClass::Retryable
        } else {
            FailureClass::Terminal
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn classifier_retries_listed_kinds_only() {
        let classifier = KindClassifier::new(&[ErrorKind::Timeout, ErrorKind::Auth]);

        let timeout = StageError::Action(ActionError::Timeout {
            program: "docker".to_string(),
            after: Duration::from_secs(1),
        });
        assert_eq!(classifier.classify(&timeout), FailureClass::Retryable);

        let auth = StageError::Auth(AuthError::Exchange("503".to_string()));
        assert_eq!(classifier.classify(&auth), FailureClass::Retryable);

        let failed = StageError::CommandFailed {
            command: "mvn verify".to_string(),
            exit_code: Some(1),
            output: String::new(),
        };
        assert_eq!(classifier.classify(&failed), FailureClass::Terminal);
    }

    #[test]
    fn launch_and_cancel_are_never_retried() {
        let classifier = KindClassifier::new(&[
            ErrorKind::Launch,
            ErrorKind::Cancelled,
            ErrorKind::RolloutTimeout,
        ]);

        let launch = StageError::Action(ActionError::Launch {
            program: "helm".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
        assert_eq!(launch.kind(), ErrorKind::Launch);
        assert_eq!(classifier.classify(&launch), FailureClass::Terminal);

        let cancelled = StageError::Auth(AuthError::Cancelled);
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(classifier.classify(&cancelled), FailureClass::Terminal);

        let rollout = StageError::Rollout(RolloutError::Timeout {
            observed: Some(1),
            elapsed: Duration::from_secs(300),
        });
        assert_eq!(classifier.classify(&rollout), FailureClass::Terminal);
    }

    #[test]
    fn kinds_parse_from_snake_case() {
        let kinds: Vec<ErrorKind> =
            serde_yaml::from_str("[timeout, auth, command_failed]").unwrap();
        assert_eq!(
            kinds,
            vec![ErrorKind::Timeout, ErrorKind::Auth, ErrorKind::CommandFailed]
        );
    }
}
