// ABOUTME: Stage entries of the workflow file.
// ABOUTME: Unset fields fall back to the workflow's defaults when resolved into a Stage.

use serde::Deserialize;
use std::time::Duration;

use super::Defaults;
use crate::exec::Action;
use crate::retry::RetryPolicy;
use crate::rollout::RolloutSpec;
use crate::stage::{ErrorKind, Precondition, RunWhen, Stage};
use crate::types::StageName;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub name: StageName,

    #[serde(default)]
    pub actions: Vec<Action>,

    #[serde(default)]
    pub when: Precondition,

    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    #[serde(default)]
    pub retry_on: Option<Vec<ErrorKind>>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default = "default_blocking")]
    pub blocking: bool,

    #[serde(default)]
    pub run: RunWhen,

    #[serde(default)]
    pub credential: bool,

    #[serde(default)]
    pub rollout: Option<RolloutOverride>,
}

fn default_blocking() -> bool {
    true
}

/// Per-stage rollout settings layered over the workflow-level `rollout` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolloutOverride {
    #[serde(default)]
    pub workload: Option<String>,

    #[serde(default)]
    pub replicas: Option<u32>,

    #[serde(default, with = "humantime_serde")]
    pub poll_interval: Option<Duration>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl RolloutOverride {
    pub fn apply(&self, base: &RolloutSpec) -> RolloutSpec {
        RolloutSpec {
            workload: self.workload.clone().or_else(|| base.workload.clone()),
            replicas: self.replicas.unwrap_or(base.replicas),
            poll_interval: self.poll_interval.unwrap_or(base.poll_interval),
            timeout: self.timeout.unwrap_or(base.timeout),
        }
    }
}

impl StageConfig {
    pub fn resolve(&self, defaults: &Defaults, rollout: &RolloutSpec) -> Stage {
        Stage {
            name: self.name.clone(),
            actions: self.actions.clone(),
            when: self.when.clone(),
            retry: self.retry.unwrap_or(defaults.retry),
            retry_on: self
                .retry_on
                .clone()
                .unwrap_or_else(|| defaults.retry_on.clone()),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            blocking: self.blocking,
            run: self.run,
            credential: self.credential,
            rollout: self.rollout.as_ref().map(|r| r.apply(rollout)),
        }
    }
}
