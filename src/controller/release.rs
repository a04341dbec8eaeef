// ABOUTME: Generic release struct parameterized by state marker.
// ABOUTME: Pending -> Running -> ReleaseReport; a finished release cannot be resumed.

use chrono::Utc;
use std::sync::Arc;

use super::report::{ReleaseReport, ReleaseStatus};
use super::state::{Pending, Running};
use crate::credentials::Credential;
use crate::request::ReleaseRequest;
use crate::stage::{RunWhen, SkipReason, Stage, StageContext, StageOutcome, StageRun, StageStatus};

/// A release attempt, parameterized by its current state.
#[derive(Debug)]
pub struct Release<S> {
    pub(crate) request: Arc<ReleaseRequest>,
    pub(crate) state: S,
}

impl Release<Pending> {
    pub fn new(request: ReleaseRequest) -> Self {
        Release {
            request: Arc::new(request),
            state: Pending,
        }
    }

    pub fn start(self) -> Release<Running> {
        tracing::info!(
            artifact = %self.request.artifact(),
            env = %self.request.target(),
            "release started"
        );
        Release {
            state: Running {
                started_at: Utc::now(),
                context: StageContext::new(Arc::clone(&self.request)),
                outcomes: Vec::new(),
                halted_by: None,
                cancelled: false,
            },
            request: self.request,
        }
    }

    pub fn status(&self) -> ReleaseStatus {
        ReleaseStatus::Pending
    }
}

impl<S> Release<S> {
    pub fn request(&self) -> &ReleaseRequest {
        &self.request
    }
}

impl Release<Running> {
    pub fn status(&self) -> ReleaseStatus {
        ReleaseStatus::Running
    }

    /// Context the next stage runs in.
    pub fn context(&self) -> &StageContext {
        &self.state.context
    }

    pub fn outcomes(&self) -> &[StageOutcome] {
        &self.state.outcomes
    }

    /// Why `stage` must not run, given what happened so far.
    pub fn skip_reason(&self, stage: &Stage, cancel_requested: bool) -> Option<SkipReason> {
        if self.state.cancelled || cancel_requested {
            return Some(SkipReason::Cancelled);
        }
        match (&self.state.halted_by, stage.run) {
            (Some(failed), RunWhen::OnSuccess) => Some(SkipReason::UpstreamFailed {
                stage: failed.clone(),
            }),
            _ => None,
        }
    }

    /// Record a stage that was not run.
    pub fn skip(&mut self, stage: &Stage, reason: SkipReason) {
        if reason == SkipReason::Cancelled {
            self.state.cancelled = true;
        }
        tracing::info!(stage = %stage.name, ?reason, "stage skipped");
        let outcome = StageOutcome::skipped(stage.name.clone(), stage.blocking, reason);
        self.push(outcome, None);
    }

    /// Record a stage that ran, threading any new credential forward.
    pub fn record(&mut self, run: StageRun) {
        let StageRun {
            outcome,
            credential,
        } = run;

        if outcome.status() == StageStatus::Cancelled {
            self.state.cancelled = true;
        }
        if outcome.halts_release() && self.state.halted_by.is_none() {
            self.state.halted_by = Some(outcome.stage().clone());
        }
        self.push(outcome, credential);
    }

    fn push(&mut self, outcome: StageOutcome, credential: Option<Credential>) {
        self.state.context = self.state.context.advance(&outcome, credential);
        self.state.outcomes.push(outcome);
    }

    /// Close the release. Cancellation outranks failure.
    pub fn finish(self) -> ReleaseReport {
        let status = if self.state.cancelled {
            ReleaseStatus::Cancelled
        } else if self.state.halted_by.is_some() {
            ReleaseStatus::Failed
        } else {
            ReleaseStatus::Succeeded
        };

        tracing::info!(
            env = %self.request.target(),
            %status,
            stages = self.state.outcomes.len(),
            "release finished"
        );

        let Running {
            started_at,
            context,
            outcomes,
            ..
        } = self.state;
        // The context shares the request; release it so the request is moved, not cloned.
        drop(context);
        let request = Arc::unwrap_or_clone(self.request);
        ReleaseReport::new(request, status, outcomes, started_at)
    }
}
