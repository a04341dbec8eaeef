// ABOUTME: Release request: what to release, where, and why.
// ABOUTME: Loaded once per attempt from a YAML/JSON request file and never mutated.

use crate::error::{Error, Result};
use crate::types::{ArtifactRef, ResourceName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Cluster location a release is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetEnvironment {
    /// Cluster identifier (kube context name or GKE cluster name).
    pub cluster: String,
    pub namespace: ResourceName,
    /// Helm release name.
    pub release: ResourceName,
}

impl fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cluster, self.namespace, self.release)
    }
}

/// CI-vendor neutral description of what triggered the release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerMetadata {
    pub branch: String,
    pub commit: String,
    pub actor: String,
    /// Trigger event such as `push`, `pull_request` or `manual`.
    #[serde(default = "default_event")]
    pub event: String,
}

fn default_event() -> String {
    "push".to_string()
}

/// A single release attempt. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    artifact: ArtifactRef,
    target: TargetEnvironment,
    trigger: TriggerMetadata,
}

impl ReleaseRequest {
    pub fn new(artifact: ArtifactRef, target: TargetEnvironment, trigger: TriggerMetadata) -> Self {
        Self {
            artifact,
            target,
            trigger,
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // serde_yaml accepts JSON documents as well
        serde_yaml::from_str(content).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::RequestFile(path.to_path_buf(), e.to_string()))?;
        Self::from_yaml(&content)
    }

    pub fn artifact(&self) -> &ArtifactRef {
        &self.artifact
    }

    pub fn target(&self) -> &TargetEnvironment {
        &self.target
    }

    pub fn trigger(&self) -> &TriggerMetadata {
        &self.trigger
    }

    /// Environment bindings describing this request, handed to every action.
    pub fn bindings(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("RELEASE_ARTIFACT".to_string(), self.artifact.to_string());
        let image = match self.artifact.registry() {
            Some(registry) => format!("{}/{}", registry, self.artifact.repository()),
            None => self.artifact.repository().to_string(),
        };
        env.insert("RELEASE_IMAGE".to_string(), image);
        env.insert("RELEASE_CLUSTER".to_string(), self.target.cluster.clone());
        env.insert(
            "RELEASE_NAMESPACE".to_string(),
            self.target.namespace.to_string(),
        );
        env.insert("RELEASE_NAME".to_string(), self.target.release.to_string());
        env.insert("RELEASE_BRANCH".to_string(), self.trigger.branch.clone());
        env.insert("RELEASE_COMMIT".to_string(), self.trigger.commit.clone());
        env.insert("RELEASE_ACTOR".to_string(), self.trigger.actor.clone());
        env.insert("RELEASE_EVENT".to_string(), self.trigger.event.clone());
        if let Some(tag) = self.artifact.tag() {
            env.insert("RELEASE_TAG".to_string(), tag.to_string());
        }
        env
    }
}
