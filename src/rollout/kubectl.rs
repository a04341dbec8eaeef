// ABOUTME: ReplicaSource that asks the cluster for ready replicas via kubectl.
// ABOUTME: Runs through the ActionExecutor so queries share timeout and capture handling.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{ReplicaSource, RolloutError, RolloutTarget};
use crate::exec::{ActionExecutor, RenderedAction};

/// Queries `.status.readyReplicas` of a Deployment.
pub struct KubectlReplicaSource {
    executor: Arc<dyn ActionExecutor>,
    program: String,
    query_timeout: Duration,
    env: BTreeMap<String, String>,
}

impl KubectlReplicaSource {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            executor,
            program: "kubectl".to_string(),
            query_timeout: Duration::from_secs(30),
            env: BTreeMap::new(),
        }
    }

    /// Use a different kubectl binary.
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Extra environment for every query (e.g. `KUBECONFIG`), layered over
    /// the target's own environment.
    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn query_for(&self, target: &RolloutTarget) -> RenderedAction {
        let mut args = vec![
            "get".to_string(),
            format!("deployment/{}", target.workload),
            "--namespace".to_string(),
            target.namespace.clone(),
        ];
        if !target.cluster.is_empty() {
            args.push("--context".to_string());
            args.push(target.cluster.clone());
        }
        args.push("--output".to_string());
        args.push("jsonpath={.status.readyReplicas}".to_string());

        let mut env = target.env.clone();
        env.extend(self.env.clone());

        RenderedAction {
            program: self.program.clone(),
            args,
            env,
            working_dir: None,
        }
    }
}

#[async_trait]
impl ReplicaSource for KubectlReplicaSource {
    async fn ready_replicas(&self, target: &RolloutTarget) -> Result<u32, RolloutError> {
        let query = self.query_for(target);
        let result = self
            .executor
            .execute(&query, self.query_timeout, &CancellationToken::new())
            .await
            .map_err(|e| RolloutError::Query(e.to_string()))?;

        if result.exit_code != Some(0) {
            return Err(RolloutError::Query(format!(
                "kubectl exited with {:?}: {}",
                result.exit_code,
                result.stderr.trim()
            )));
        }

        parse_ready_replicas(&result.stdout)
    }
}

/// kubectl prints nothing when `readyReplicas` is absent (zero ready).
fn parse_ready_replicas(stdout: &str) -> Result<u32, RolloutError> {
    let trimmed = stdout.trim().trim_matches('\'');
    if trimmed.is_empty() {
        return Ok(0);
    }
    trimmed
        .parse()
        .map_err(|_| RolloutError::Query(format!("unexpected readyReplicas value: {trimmed}")))
}
