// ABOUTME: Diagnostics accumulator for non-fatal warnings during a release run.
// ABOUTME: Collects warnings that shouldn't fail a release but should be shown to users.

/// Collects non-fatal warnings during release operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn extend(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        for warning in warnings {
            self.warn(warning);
        }
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn create_only_action(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CreateOnlyAction,
            message: message.into(),
        }
    }

    pub fn non_blocking_failure(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::NonBlockingFailure,
            message: message.into(),
        }
    }

    pub fn stale_lock(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StaleLock,
            message: message.into(),
        }
    }

    pub fn lock_release(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::LockRelease,
            message: message.into(),
        }
    }

    pub fn sink_failure(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SinkFailure,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Action would not converge when a release is retried.
    CreateOnlyAction,
    /// A non-blocking stage failed; the release continued.
    NonBlockingFailure,
    /// An abandoned target lock was broken.
    StaleLock,
    /// Failed to release a target lock (lock file may remain).
    LockRelease,
    /// A report sink could not publish.
    SinkFailure,
}
