// ABOUTME: Rollout verification: polls ready replicas until the target converges.
// ABOUTME: Distinguishes success, timeout, and cancellation; never reports success on timeout.

mod kubectl;

pub use kubectl::KubectlReplicaSource;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::request::TargetEnvironment;

/// Rollout parameters declared on a stage. Combined with the request's
/// target environment to form a [`RolloutTarget`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RolloutSpec {
    /// Deployment name; defaults to the Helm release name.
    #[serde(default)]
    pub workload: Option<String>,

    #[serde(default = "default_replicas")]
    pub replicas: u32,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_rollout_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_replicas() -> u32 {
    1
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_rollout_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for RolloutSpec {
    fn default() -> Self {
        Self {
            workload: None,
            replicas: default_replicas(),
            poll_interval: default_poll_interval(),
            timeout: default_rollout_timeout(),
        }
    }
}

impl RolloutSpec {
    pub fn target_for(&self, env: &TargetEnvironment) -> RolloutTarget {
        RolloutTarget {
            cluster: env.cluster.clone(),
            namespace: env.namespace.to_string(),
            workload: self
                .workload
                .clone()
                .unwrap_or_else(|| env.release.to_string()),
            desired_replicas: self.replicas,
            poll_interval: self.poll_interval,
            timeout: self.timeout,
            env: BTreeMap::new(),
        }
    }
}

/// What to poll and for how long. Scoped to one verification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutTarget {
    pub cluster: String,
    pub namespace: String,
    pub workload: String,
    pub desired_replicas: u32,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Environment for cluster queries, including any access token.
    #[serde(skip)]
    pub env: BTreeMap<String, String>,
}

/// Rollout converged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutResult {
    pub ready: bool,
    pub observed_replicas: u32,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RolloutError {
    /// Desired replicas not ready before the overall timeout.
    #[error(
        "rollout timed out after {}s with {observed:?} ready replica(s)",
        .elapsed.as_secs()
    )]
    Timeout {
        observed: Option<u32>,
        elapsed: Duration,
    },

    /// Polling stopped by an external cancellation signal.
    #[error("rollout verification cancelled with {observed:?} ready replica(s)")]
    Cancelled {
        observed: Option<u32>,
        elapsed: Duration,
    },

    /// Querying the cluster failed.
    #[error("failed to query rollout status: {0}")]
    Query(String),
}

/// Reports how many replicas of a workload are currently ready.
#[async_trait]
pub trait ReplicaSource: Send + Sync {
    async fn ready_replicas(&self, target: &RolloutTarget) -> Result<u32, RolloutError>;
}

/// Polls a [`ReplicaSource`] until the rollout converges.
#[derive(Clone)]
pub struct RolloutVerifier {
    source: Arc<dyn ReplicaSource>,
}

impl std::fmt::Debug for RolloutVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RolloutVerifier").finish_non_exhaustive()
    }
}

impl RolloutVerifier {
    pub fn new(source: Arc<dyn ReplicaSource>) -> Self {
        Self { source }
    }

    /// Wait until `observed >= desired` ready replicas.
    ///
    /// Query failures are treated as "not ready yet" and polling continues
    /// until the timeout. Cancellation is honored within one poll interval,
    /// including while a query is in flight.
    pub async fn wait_for_ready(
        &self,
        target: &RolloutTarget,
        cancel: &CancellationToken,
    ) -> Result<RolloutResult, RolloutError> {
        let start = Instant::now();
        let deadline = start + target.timeout;
        let mut observed = None;

        tracing::info!(
            workload = %target.workload,
            namespace = %target.namespace,
            desired = target.desired_replicas,
            "waiting for rollout"
        );

        loop {
            let query = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RolloutError::Cancelled { observed, elapsed: start.elapsed() });
                }
                result = self.source.ready_replicas(target) => result,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(RolloutError::Timeout { observed, elapsed: start.elapsed() });
                }
            };

            match query {
                Ok(ready) => {
                    observed = Some(ready);
                    tracing::debug!(
                        workload = %target.workload,
                        ready,
                        desired = target.desired_replicas,
                        "polled rollout"
                    );
                    if ready >= target.desired_replicas {
                        return Ok(RolloutResult {
                            ready: true,
                            observed_replicas: ready,
                            elapsed: start.elapsed(),
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!("Rollout status query failed: {}", e);
                }
            }

            if Instant::now() >= deadline {
                return Err(RolloutError::Timeout {
                    observed,
                    elapsed: start.elapsed(),
                });
            }

            let next_poll = (Instant::now() + target.poll_interval).min(deadline);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RolloutError::Cancelled { observed, elapsed: start.elapsed() });
                }
                _ = tokio::time::sleep_until(next_poll) => {}
            }
        }
    }
}
