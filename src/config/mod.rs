// ABOUTME: Workflow configuration parsed from release.yml.
// ABOUTME: Handles discovery, stage defaults, and building the validated stage graph.

mod env_value;
mod init;
mod stage;

pub use env_value::EnvValue;
pub use init::init_workflow;
pub use stage::{RolloutOverride, StageConfig};

use crate::credentials::IdentityConfig;
use crate::error::{Error, Result};
use crate::exec::DEFAULT_OUTPUT_CAP;
use crate::graph::{CanonicalSettings, InvalidGraph, StageGraph};
use crate::retry::RetryPolicy;
use crate::rollout::RolloutSpec;
use crate::stage::{ErrorKind, default_retry_on};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const WORKFLOW_FILENAME: &str = "release.yml";
pub const WORKFLOW_FILENAME_ALT: &str = "release.yaml";
pub const WORKFLOW_FILENAME_DIR: &str = ".release/workflow.yml";

/// Settings applied to every stage that does not set its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Timeout for each action invocation.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "RetryPolicy::once")]
    pub retry: RetryPolicy,

    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<ErrorKind>,

    /// Bytes of stdout and of stderr captured per action.
    #[serde(default = "default_output_cap")]
    pub output_cap: usize,

    /// Bytes of output kept in each stage outcome.
    #[serde(default = "default_output_tail")]
    pub output_tail: usize,
}

fn default_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_output_cap() -> usize {
    DEFAULT_OUTPUT_CAP
}

fn default_output_tail() -> usize {
    4096
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            retry: RetryPolicy::once(),
            retry_on: default_retry_on(),
            output_cap: default_output_cap(),
            output_tail: default_output_tail(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub defaults: Defaults,

    /// Workload identity used by stages that need a credential.
    #[serde(default)]
    pub identity: Option<IdentityConfig>,

    /// Rollout settings inherited by every stage's `rollout` block.
    #[serde(default)]
    pub rollout: RolloutSpec,

    /// Settings for the built-in pipeline, used when `stages` is absent.
    #[serde(default)]
    pub canonical: CanonicalSettings,

    #[serde(default)]
    pub stages: Option<Vec<StageConfig>>,
}

impl WorkflowConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Path of the first workflow file present in `dir`.
    pub fn find(dir: &Path) -> Option<PathBuf> {
        [
            dir.join(WORKFLOW_FILENAME),
            dir.join(WORKFLOW_FILENAME_ALT),
            dir.join(WORKFLOW_FILENAME_DIR),
        ]
        .into_iter()
        .find(|path| path.exists())
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        match Self::find(dir) {
            Some(path) => Self::load(&path),
            None => Err(Error::WorkflowNotFound(dir.to_path_buf())),
        }
    }

    /// Whether the built-in pipeline is used instead of declared stages.
    pub fn is_canonical(&self) -> bool {
        self.stages.is_none()
    }

    /// Resolve stages against the defaults and validate their ordering.
    pub fn graph(&self) -> std::result::Result<StageGraph, InvalidGraph> {
        match &self.stages {
            Some(stages) => StageGraph::new(
                stages
                    .iter()
                    .map(|s| s.resolve(&self.defaults, &self.rollout))
                    .collect(),
            ),
            None => StageGraph::canonical(&self.canonical, &self.defaults, &self.rollout),
        }
    }

    pub fn identity(&self) -> IdentityConfig {
        self.identity.clone().unwrap_or_default()
    }
}
