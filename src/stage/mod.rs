// ABOUTME: Release stages: named units of work built from ordered actions.
// ABOUTME: Exports stage definitions, preconditions, outcomes, and the stage runner.

mod context;
mod error;
mod outcome;
mod precondition;
mod runner;

pub use context::StageContext;
pub use error::{ErrorKind, KindClassifier, StageError};
pub use outcome::{SkipReason, StageFailure, StageOutcome, StageStatus};
pub use precondition::Precondition;
pub use runner::{StageRun, StageRunner};

use serde::Deserialize;
use std::time::Duration;

use crate::exec::Action;
use crate::retry::RetryPolicy;
use crate::rollout::RolloutSpec;
use crate::types::StageName;

/// When a stage runs relative to earlier failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunWhen {
    /// Only while no blocking stage has failed.
    #[default]
    OnSuccess,
    /// Even after a blocking failure (finalizers such as reporting).
    Always,
}

/// A resolved stage definition. Static workflow configuration, never
/// mutated during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub name: StageName,
    pub actions: Vec<Action>,
    pub when: Precondition,
    pub retry: RetryPolicy,
    /// Error kinds the retry policy applies to.
    pub retry_on: Vec<ErrorKind>,
    /// Timeout for each action invocation.
    pub timeout: Duration,
    /// A failed blocking stage halts downstream stages.
    pub blocking: bool,
    pub run: RunWhen,
    /// Stage needs a live credential, bound into every action's env.
    pub credential: bool,
    /// Verify rollout after the stage's actions succeed.
    pub rollout: Option<RolloutSpec>,
}

impl Stage {
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            actions: Vec::new(),
            when: Precondition::Always,
            retry: RetryPolicy::once(),
            retry_on: default_retry_on(),
            timeout: Duration::from_secs(600),
            blocking: true,
            run: RunWhen::OnSuccess,
            credential: false,
            rollout: None,
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn when(mut self, precondition: Precondition) -> Self {
        self.when = precondition;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy, retry_on: &[ErrorKind]) -> Self {
        self.retry = policy;
        self.retry_on = retry_on.to_vec();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn non_blocking(mut self) -> Self {
        self.blocking = false;
        self
    }

    pub fn always(mut self) -> Self {
        self.run = RunWhen::Always;
        self
    }

    pub fn needs_credential(mut self) -> Self {
        self.credential = true;
        self
    }

    pub fn verify_rollout(mut self, spec: RolloutSpec) -> Self {
        self.rollout = Some(spec);
        self
    }
}

/// Kinds retried when a stage does not say otherwise.
pub fn default_retry_on() -> Vec<ErrorKind> {
    vec![ErrorKind::Timeout, ErrorKind::Auth]
}
