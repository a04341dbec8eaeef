// ABOUTME: Workflow scaffolding for new projects.
// ABOUTME: Writes a release.yml that runs the built-in pipeline with its defaults spelled out.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::WORKFLOW_FILENAME;

const TEMPLATE: &str = r#"# Release workflow. Without a `stages` list the built-in pipeline runs:
# Checkout, Build & Test, Code Quality, Image Publish, Credential Exchange,
# Cluster Deploy, Rollout Verify, Report History.

defaults:
  timeout: 10m
  retry:
    max_attempts: 1
  retry_on: [timeout, auth]

# identity:
#   service_account: deployer@my-project.iam.gserviceaccount.com
#   project: my-project
#   token_ttl: 55m
#   refresh_skew: 5m
#   timeout: 60s

rollout:
  replicas: 2
  poll_interval: 5s
  timeout: 5m

canonical:
  deploy_branch: main
  build: [mvn, -B, clean, verify]
  quality: [mvn, -B, checkstyle:check]
  chart: ./chart

# To declare stages explicitly:
# stages:
#   - name: Build
#     actions:
#       - program: mvn
#         args: [-B, verify]
#   - name: Deploy
#     when: { all: [ { branch: main }, { stage: { name: Build, status: succeeded } } ] }
#     credential: true
#     actions:
#       - program: helm
#         args: [upgrade, --install, "${RELEASE_NAME}", ./chart, --namespace, "${RELEASE_NAMESPACE}"]
#     rollout: { replicas: 2 }
"#;

/// Write a starter workflow into `dir`, refusing to overwrite unless `force`.
pub fn init_workflow(dir: &Path, force: bool) -> Result<PathBuf> {
    let path = dir.join(WORKFLOW_FILENAME);

    if path.exists() && !force {
        return Err(Error::AlreadyExists(path));
    }

    std::fs::write(&path, TEMPLATE)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use tempfile::TempDir;

    #[test]
    fn template_parses_into_canonical_workflow() {
        let config = WorkflowConfig::from_yaml(TEMPLATE).unwrap();
        assert!(config.is_canonical());
        assert_eq!(config.rollout.replicas, 2);
        assert!(config.graph().is_ok());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = TempDir::new().unwrap();
        init_workflow(dir.path(), false).unwrap();

        let err = init_workflow(dir.path(), false).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        std::fs::write(dir.path().join(WORKFLOW_FILENAME), "garbage").unwrap();
        init_workflow(dir.path(), true).unwrap();
        let content = std::fs::read_to_string(dir.path().join(WORKFLOW_FILENAME)).unwrap();
        assert!(content.contains("deploy_branch: main"));
    }
}
