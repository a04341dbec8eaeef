// ABOUTME: Executes one stage: precondition, credential, actions with retry, rollout check.
// ABOUTME: Always yields a StageOutcome; failures are captured, never propagated.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use super::context::StageContext;
use super::error::{KindClassifier, StageError};
use super::outcome::{SkipReason, StageFailure, StageOutcome};
use super::Stage;
use crate::credentials::{AuthError, Credential, TokenProvider};
use crate::exec::{Action, ActionError, ActionExecutor, ActionResult, RenderedAction};
use crate::retry::run_with_retry;
use crate::rollout::{RolloutResult, RolloutVerifier};

/// Bytes of output kept in a stage outcome.
const DEFAULT_OUTPUT_TAIL: usize = 4096;

/// Outcome of running one stage plus any credential it acquired, which the
/// controller threads into the next stage's context.
#[derive(Debug)]
pub struct StageRun {
    pub outcome: StageOutcome,
    pub credential: Option<Credential>,
}

#[derive(Default)]
struct Progress {
    attempts: u32,
    output: Option<String>,
    credential: Option<Credential>,
}

/// Runs stages against external collaborators.
#[derive(Clone)]
pub struct StageRunner {
    executor: Arc<dyn ActionExecutor>,
    tokens: Arc<dyn TokenProvider>,
    verifier: RolloutVerifier,
    refresh_skew: Duration,
    credential_env: String,
    output_tail: usize,
}

impl StageRunner {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        tokens: Arc<dyn TokenProvider>,
        verifier: RolloutVerifier,
    ) -> Self {
        Self {
            executor,
            tokens,
            verifier,
            refresh_skew: Duration::from_secs(300),
            credential_env: "CLOUDSDK_AUTH_ACCESS_TOKEN".to_string(),
            output_tail: DEFAULT_OUTPUT_TAIL,
        }
    }

    /// Credentials closer than `skew` to expiry are re-acquired.
    pub fn refresh_skew(mut self, skew: Duration) -> Self {
        self.refresh_skew = skew;
        self
    }

    /// Environment variable the access token is bound to.
    pub fn credential_env(mut self, var: impl Into<String>) -> Self {
        self.credential_env = var.into();
        self
    }

    pub fn output_tail(mut self, bytes: usize) -> Self {
        self.output_tail = bytes;
        self
    }

    /// Run `stage` in `context`. A false precondition skips the stage
    /// without side effects.
    pub async fn run(
        &self,
        stage: &Stage,
        context: &StageContext,
        cancel: &CancellationToken,
    ) -> StageRun {
        if !stage.when.evaluate(context) {
            tracing::info!(stage = %stage.name, "precondition not met, skipping");
            return StageRun {
                outcome: StageOutcome::skipped(
                    stage.name.clone(),
                    stage.blocking,
                    SkipReason::Precondition,
                ),
                credential: None,
            };
        }

        tracing::info!(stage = %stage.name, actions = stage.actions.len(), "stage started");
        let started = Instant::now();
        let mut progress = Progress::default();
        let result = self.execute(stage, context, cancel, &mut progress).await;
        let duration = started.elapsed();

        let outcome = match result {
            Ok(rollout) => {
                tracing::info!(
                    stage = %stage.name,
                    attempts = progress.attempts,
                    elapsed = ?duration,
                    "stage succeeded"
                );
                StageOutcome::succeeded(
                    stage.name.clone(),
                    stage.blocking,
                    progress.attempts,
                    duration,
                    progress.output,
                    rollout,
                )
            }
            Err(error) => {
                if stage.blocking {
                    tracing::error!(stage = %stage.name, "stage failed: {}", error);
                } else {
                    tracing::warn!(stage = %stage.name, "non-blocking stage failed: {}", error);
                }
                let output = error.output().map(str::to_string).or(progress.output);
                StageOutcome::failed(
                    stage.name.clone(),
                    stage.blocking,
                    progress.attempts,
                    duration,
                    output,
                    StageFailure::from(&error),
                )
            }
        };

        StageRun {
            outcome,
            credential: progress.credential,
        }
    }

    async fn execute(
        &self,
        stage: &Stage,
        context: &StageContext,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<Option<RolloutResult>, StageError> {
        let classifier = KindClassifier::new(&stage.retry_on);
        let mut bindings = context.bindings();
        let session = Mutex::new(None);

        if stage.credential {
            let credential = self
                .credential_for(stage, context, &classifier, cancel, progress)
                .await?;
            bindings.insert(self.credential_env.clone(), credential.token().to_string());
            *session.lock() = Some(credential);
        }

        for action in &stage.actions {
            let rendered = action
                .render(&bindings)
                .map_err(|e| StageError::Config(e.to_string()))?;

            let outcome = run_with_retry(&stage.retry, &classifier, cancel, |attempt| {
                let (session, bindings, rendered) = (&session, &bindings, &rendered);
                async move {
                    if attempt > 1 {
                        if let Some(fresh) = self.refresh_stale(stage, session, cancel).await? {
                            let mut bindings = bindings.clone();
                            bindings.insert(self.credential_env.clone(), fresh.token().to_string());
                            let rendered = action
                                .render(&bindings)
                                .map_err(|e| StageError::Config(e.to_string()))?;
                            return self.attempt(stage, action, &rendered, attempt, cancel).await;
                        }
                    }
                    self.attempt(stage, action, rendered, attempt, cancel).await
                }
            })
            .await;
            progress.attempts += outcome.attempts;

            let latest = session.lock().clone();
            if let Some(credential) = latest {
                bindings.insert(self.credential_env.clone(), credential.token().to_string());
                if context.credential() != Some(&credential) {
                    progress.credential = Some(credential);
                }
            }

            let result = match outcome.result {
                Ok(result) => result,
                Err(_) if outcome.cancelled => {
                    return Err(StageError::Action(ActionError::Cancelled {
                        program: rendered.program.clone(),
                    }));
                }
                Err(error) => return Err(error),
            };
            let tail = result.tail(self.output_tail);
            progress.output = (!tail.is_empty()).then_some(tail);
        }

        match stage.rollout {
            Some(ref spec) => {
                let mut target = spec.target_for(context.request().target());
                target.env = bindings;
                let result = self.verifier.wait_for_ready(&target, cancel).await?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn attempt(
        &self,
        stage: &Stage,
        action: &Action,
        rendered: &RenderedAction,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<ActionResult, StageError> {
        tracing::info!(
            stage = %stage.name,
            attempt,
            command = %rendered.display(),
            "running action"
        );

        let result = self.executor.execute(rendered, stage.timeout, cancel).await?;
        if action.success.evaluate(&result) {
            Ok(result)
        } else {
            Err(StageError::CommandFailed {
                command: rendered.display(),
                exit_code: result.exit_code,
                output: result.tail(self.output_tail),
            })
        }
    }

    /// Re-acquire the stage's credential if it went stale while earlier
    /// attempts ran. Returns the new credential, if one was fetched.
    async fn refresh_stale(
        &self,
        stage: &Stage,
        session: &Mutex<Option<Credential>>,
        cancel: &CancellationToken,
    ) -> Result<Option<Credential>, StageError> {
        let stale = session
            .lock()
            .as_ref()
            .is_some_and(|credential| !credential.is_fresh(Utc::now(), self.refresh_skew));
        if !stale {
            return Ok(None);
        }

        tracing::info!(stage = %stage.name, "credential expiring between attempts, re-acquiring");
        let credential = self.tokens.fetch(cancel).await?;
        *session.lock() = Some(credential.clone());
        Ok(Some(credential))
    }

    /// Reuse the context's credential while fresh; otherwise exchange a new one.
    async fn credential_for(
        &self,
        stage: &Stage,
        context: &StageContext,
        classifier: &KindClassifier,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<Credential, StageError> {
        if let Some(credential) = context.credential() {
            if credential.is_fresh(Utc::now(), self.refresh_skew) {
                return Ok(credential.clone());
            }
            tracing::info!(
                stage = %stage.name,
                expires_at = %credential.expires_at(),
                "credential expiring, re-acquiring"
            );
        }

        let outcome = run_with_retry(&stage.retry, classifier, cancel, |_| async move {
            self.tokens.fetch(cancel).await.map_err(StageError::from)
        })
        .await;
        progress.attempts += outcome.attempts;

        let credential = match outcome.result {
            Ok(credential) => credential,
            Err(_) if outcome.cancelled => {
                return Err(StageError::Auth(AuthError::Cancelled));
            }
            Err(error) => return Err(error),
        };
        progress.credential = Some(credential.clone());
        Ok(credential)
    }
}
