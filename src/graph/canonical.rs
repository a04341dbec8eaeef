// ABOUTME: Built-in container release pipeline, used when a workflow declares no stages.
// ABOUTME: Checkout, build, publish, credential, Helm deploy, rollout check, history record.

use serde::Deserialize;
use std::time::Duration;

use super::{InvalidGraph, StageGraph};
use crate::config::{Defaults, EnvValue};
use crate::exec::Action;
use crate::retry::RetryPolicy;
use crate::rollout::RolloutSpec;
use crate::stage::{ErrorKind, Precondition, Stage, StageStatus};
use crate::types::StageName;

pub const CHECKOUT: &str = "Checkout";
pub const BUILD_AND_TEST: &str = "Build & Test";
pub const CODE_QUALITY: &str = "Code Quality";
pub const IMAGE_PUBLISH: &str = "Image Publish";
pub const CREDENTIAL_EXCHANGE: &str = "Credential Exchange";
pub const CLUSTER_DEPLOY: &str = "Cluster Deploy";
pub const ROLLOUT_VERIFY: &str = "Rollout Verify";
pub const REPORT_HISTORY: &str = "Report History";

/// Knobs for the built-in pipeline.
///
/// ```yaml
/// canonical:
///   deploy_branch: main
///   build: [mvn, -B, clean, verify]
///   quality: []          # no code quality stage
///   chart: ./charts/app
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CanonicalSettings {
    /// Only this branch is deployed to the cluster.
    #[serde(default = "default_deploy_branch")]
    pub deploy_branch: String,

    #[serde(default = "default_build")]
    pub build: Vec<String>,

    /// Non-blocking quality scan. Empty disables the stage.
    #[serde(default = "default_quality")]
    pub quality: Vec<String>,

    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,

    #[serde(default = "default_chart")]
    pub chart: String,

    #[serde(default = "default_history_file")]
    pub history_file: String,

    #[serde(default = "default_publish_retry")]
    pub publish_retry: RetryPolicy,

    #[serde(default = "default_deploy_timeout", with = "humantime_serde")]
    pub deploy_timeout: Duration,
}

fn default_deploy_branch() -> String {
    "main".to_string()
}

fn default_build() -> Vec<String> {
    ["mvn", "-B", "clean", "verify"].map(String::from).to_vec()
}

fn default_quality() -> Vec<String> {
    ["mvn", "-B", "checkstyle:check"].map(String::from).to_vec()
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn default_chart() -> String {
    "./chart".to_string()
}

fn default_history_file() -> String {
    ".release/history.log".to_string()
}

fn default_publish_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(60))
}

fn default_deploy_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for CanonicalSettings {
    fn default() -> Self {
        Self {
            deploy_branch: default_deploy_branch(),
            build: default_build(),
            quality: default_quality(),
            dockerfile: default_dockerfile(),
            chart: default_chart(),
            history_file: default_history_file(),
            publish_retry: default_publish_retry(),
            deploy_timeout: default_deploy_timeout(),
        }
    }
}

const HISTORY_SCRIPT: &str = r#"mkdir -p "$(dirname "$RELEASE_HISTORY_FILE")" && printf '%s %s %s %s %s\n' "$(date -u +%Y-%m-%dT%H:%M:%SZ)" "$RELEASE_ARTIFACT" "$RELEASE_BRANCH" "$RELEASE_COMMIT" "$RELEASE_ACTOR" >> "$RELEASE_HISTORY_FILE""#;

impl StageGraph {
    /// The built-in pipeline. Every mutating step is idempotent: checkout
    /// is forced, the image push overwrites the same tag, and the deploy
    /// uses `helm upgrade --install`.
    pub fn canonical(
        settings: &CanonicalSettings,
        defaults: &Defaults,
        rollout: &RolloutSpec,
    ) -> Result<StageGraph, InvalidGraph> {
        let on_deploy_branch = Precondition::branch(settings.deploy_branch.clone());
        let base = |name: &str| {
            let mut stage = Stage::new(stage_name(name)?);
            stage.retry = defaults.retry;
            stage.retry_on = defaults.retry_on.clone();
            stage.timeout = defaults.timeout;
            Ok::<_, InvalidGraph>(stage)
        };

        let mut stages = vec![
            base(CHECKOUT)?
                .action(Action::new("git").args([
                    "fetch",
                    "--no-tags",
                    "origin",
                    "${RELEASE_BRANCH}",
                ]))
                .action(Action::new("git").args(["checkout", "--force", "${RELEASE_COMMIT}"])),
            base(BUILD_AND_TEST)?.action(command(BUILD_AND_TEST, &settings.build)?),
        ];

        if !settings.quality.is_empty() {
            stages.push(
                base(CODE_QUALITY)?
                    .action(command(CODE_QUALITY, &settings.quality)?)
                    .non_blocking(),
            );
        }

        let mut retry_on = defaults.retry_on.clone();
        if !retry_on.contains(&ErrorKind::CommandFailed) {
            retry_on.push(ErrorKind::CommandFailed);
        }
        stages.push(
            base(IMAGE_PUBLISH)?
                .action(Action::new("docker").args([
                    "build",
                    "--file",
                    settings.dockerfile.as_str(),
                    "--tag",
                    "${RELEASE_ARTIFACT}",
                    ".",
                ]))
                .action(Action::new("docker").args(["push", "${RELEASE_ARTIFACT}"]))
                .retry(settings.publish_retry, &retry_on),
        );

        stages.push(base(CREDENTIAL_EXCHANGE)?.needs_credential());

        stages.push(
            base(CLUSTER_DEPLOY)?
                .when(on_deploy_branch.clone())
                .needs_credential()
                .timeout(settings.deploy_timeout)
                .action(Action::new("helm").args([
                    "upgrade",
                    "--install",
                    "${RELEASE_NAME}",
                    settings.chart.as_str(),
                    "--namespace",
                    "${RELEASE_NAMESPACE}",
                    "--create-namespace",
                    "--kube-context",
                    "${RELEASE_CLUSTER}",
                    "--set-string",
                    "image=${RELEASE_ARTIFACT}",
                ])),
        );

        stages.push(
            base(ROLLOUT_VERIFY)?
                .when(Precondition::All(vec![
                    on_deploy_branch,
                    Precondition::stage_status(stage_name(CLUSTER_DEPLOY)?, StageStatus::Succeeded),
                ]))
                .needs_credential()
                .verify_rollout(rollout.clone()),
        );

        stages.push(
            base(REPORT_HISTORY)?
                .always()
                .non_blocking()
                .action(
                    Action::new("sh")
                        .args(["-c", HISTORY_SCRIPT])
                        .env(
                            "RELEASE_HISTORY_FILE",
                            EnvValue::literal(settings.history_file.as_str()),
                        ),
                ),
        );

        StageGraph::new(stages)
    }
}

fn stage_name(name: &str) -> Result<StageName, InvalidGraph> {
    StageName::new(name).map_err(|e| InvalidGraph::InvalidName(e.to_string()))
}

fn command(stage: &str, argv: &[String]) -> Result<Action, InvalidGraph> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| InvalidGraph::EmptyCommand(stage.to_string()))?;
    Ok(Action::new(program.as_str()).args(args.iter().cloned()))
}
