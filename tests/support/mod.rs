// ABOUTME: Test support utilities.
// ABOUTME: Scripted executors, token providers, and replica sources for driving releases without real tools.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use releasectl::controller::ReleaseController;
use releasectl::credentials::{AuthError, Credential, TokenProvider};
use releasectl::exec::{ActionError, ActionExecutor, ActionResult, RenderedAction};
use releasectl::graph::StageGraph;
use releasectl::request::{ReleaseRequest, TargetEnvironment, TriggerMetadata};
use releasectl::rollout::{ReplicaSource, RolloutError, RolloutTarget, RolloutVerifier};
use releasectl::stage::{Stage, StageRunner};
use releasectl::types::{ArtifactRef, ResourceName, StageName};
use std::collections::VecDeque;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("releasectl=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// What a scripted action does when invoked.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub enum Reply {
    /// Exit with the given code and stdout.
    Exit(i32, &'static str),
    /// Fail as if the action ran past its timeout.
    Timeout,
    /// Fail as if the program were missing.
    Launch,
    /// Block until cancelled.
    Hang,
    /// Sleep, then exit 0. Cancellation interrupts the sleep.
    Sleep(Duration),
}

/// ActionExecutor that answers from per-command scripts and records every call.
///
/// A script matches when the rendered command line starts with its prefix.
/// Replies are consumed in order; the last one repeats. Unscripted commands
/// exit 0.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<Vec<(String, VecDeque<Reply>)>>,
    calls: Mutex<Vec<RenderedAction>>,
}

#[allow(dead_code)]
impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, prefix: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.scripts
            .lock()
            .push((prefix.to_string(), replies.into_iter().collect()));
        self
    }

    pub fn calls(&self) -> Vec<RenderedAction> {
        self.calls.lock().clone()
    }

    /// Command lines in call order.
    pub fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(RenderedAction::display).collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.display().starts_with(prefix))
            .count()
    }

    fn next_reply(&self, command: &str) -> Reply {
        let mut scripts = self.scripts.lock();
        let Some((_, replies)) = scripts
            .iter_mut()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        else {
            return Reply::Exit(0, "");
        };
        if replies.len() > 1 {
            replies.pop_front().unwrap_or(Reply::Exit(0, ""))
        } else {
            replies.front().cloned().unwrap_or(Reply::Exit(0, ""))
        }
    }
}

fn exit(code: i32, stdout: &str) -> ActionResult {
    ActionResult {
        exit_code: Some(code),
        stdout: stdout.to_string(),
        stderr: String::new(),
        duration: Duration::ZERO,
        truncated: false,
    }
}

#[async_trait]
impl ActionExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        action: &RenderedAction,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ActionResult, ActionError> {
        let command = action.display();
        self.calls.lock().push(action.clone());
        let program = action.program.clone();

        match self.next_reply(&command) {
            Reply::Exit(code, stdout) => Ok(exit(code, stdout)),
            Reply::Timeout => Err(ActionError::Timeout {
                program,
                after: timeout,
            }),
            Reply::Launch => Err(ActionError::Launch {
                program,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            Reply::Hang => {
                cancel.cancelled().await;
                Err(ActionError::Cancelled { program })
            }
            Reply::Sleep(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(exit(0, "")),
                    _ = cancel.cancelled() => Err(ActionError::Cancelled { program }),
                }
            }
        }
    }
}

/// TokenProvider that hands out numbered tokens with a fixed lifetime.
#[allow(dead_code)]
pub struct StaticTokens {
    lifetime: ChronoDuration,
    failures: Mutex<VecDeque<AuthError>>,
    fetches: Mutex<u32>,
}

#[allow(dead_code)]
impl StaticTokens {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime: ChronoDuration::from_std(lifetime).unwrap(),
            failures: Mutex::new(VecDeque::new()),
            fetches: Mutex::new(0),
        }
    }

    /// Fail the next fetches with these errors before issuing tokens.
    pub fn failing(self, errors: impl IntoIterator<Item = AuthError>) -> Self {
        self.failures.lock().extend(errors);
        self
    }

    pub fn fetches(&self) -> u32 {
        *self.fetches.lock()
    }
}

#[async_trait]
impl TokenProvider for StaticTokens {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Credential, AuthError> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        let n = {
            let mut fetches = self.fetches.lock();
            *fetches += 1;
            *fetches
        };
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        Ok(Credential::new(format!("token-{n}"), Utc::now() + self.lifetime))
    }
}

/// ReplicaSource reporting a scripted sequence of ready counts; the last repeats.
#[allow(dead_code)]
pub struct ScriptedReplicas {
    counts: Mutex<VecDeque<Result<u32, RolloutError>>>,
    polls: Mutex<u32>,
}

#[allow(dead_code)]
impl ScriptedReplicas {
    pub fn new(counts: impl IntoIterator<Item = u32>) -> Self {
        Self::with_results(counts.into_iter().map(Ok))
    }

    pub fn with_results(results: impl IntoIterator<Item = Result<u32, RolloutError>>) -> Self {
        Self {
            counts: Mutex::new(results.into_iter().collect()),
            polls: Mutex::new(0),
        }
    }

    pub fn polls(&self) -> u32 {
        *self.polls.lock()
    }
}

#[async_trait]
impl ReplicaSource for ScriptedReplicas {
    async fn ready_replicas(&self, _target: &RolloutTarget) -> Result<u32, RolloutError> {
        *self.polls.lock() += 1;
        let mut counts = self.counts.lock();
        if counts.len() > 1 {
            counts.pop_front().unwrap_or(Ok(0))
        } else {
            counts.front().cloned().unwrap_or(Ok(0))
        }
    }
}

#[allow(dead_code)]
pub fn name(s: &str) -> StageName {
    StageName::new(s).unwrap()
}

#[allow(dead_code)]
pub fn target(cluster: &str, namespace: &str, release: &str) -> TargetEnvironment {
    TargetEnvironment {
        cluster: cluster.to_string(),
        namespace: ResourceName::new(namespace).unwrap(),
        release: ResourceName::new(release).unwrap(),
    }
}

/// A request for `spring-demo` on `branch`.
#[allow(dead_code)]
pub fn request(branch: &str) -> ReleaseRequest {
    request_to(branch, target("gke-prod", "demo", "spring-demo"))
}

#[allow(dead_code)]
pub fn request_to(branch: &str, target: TargetEnvironment) -> ReleaseRequest {
    ReleaseRequest::new(
        ArtifactRef::parse("europe-west1-docker.pkg.dev/demo/apps/spring-demo:3f2c1a9").unwrap(),
        target,
        TriggerMetadata {
            branch: branch.to_string(),
            commit: "3f2c1a9".to_string(),
            actor: "ci-bot".to_string(),
            event: "push".to_string(),
        },
    )
}

#[allow(dead_code)]
pub fn graph(stages: Vec<Stage>) -> StageGraph {
    StageGraph::new(stages).unwrap()
}

/// Collaborators for a controller under test.
#[allow(dead_code)]
pub struct Harness {
    pub executor: Arc<ScriptedExecutor>,
    pub tokens: Arc<StaticTokens>,
    pub replicas: Arc<ScriptedReplicas>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(executor: ScriptedExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
            tokens: Arc::new(StaticTokens::new(Duration::from_secs(3600))),
            replicas: Arc::new(ScriptedReplicas::new([1])),
        }
    }

    pub fn tokens(mut self, tokens: StaticTokens) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    pub fn replicas(mut self, replicas: ScriptedReplicas) -> Self {
        self.replicas = Arc::new(replicas);
        self
    }

    pub fn runner(&self) -> StageRunner {
        let executor: Arc<dyn ActionExecutor> = self.executor.clone();
        let tokens: Arc<dyn TokenProvider> = self.tokens.clone();
        let replicas: Arc<dyn ReplicaSource> = self.replicas.clone();
        StageRunner::new(executor, tokens, RolloutVerifier::new(replicas))
            .credential_env("ACCESS_TOKEN")
    }

    pub fn controller(&self, stages: Vec<Stage>) -> ReleaseController {
        ReleaseController::new(graph(stages), self.runner())
    }
}
