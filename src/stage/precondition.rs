// ABOUTME: Vendor-neutral stage preconditions over trigger metadata and prior outcomes.
// ABOUTME: Parsed from workflow YAML and validated against stage order at graph build time.

use serde::Deserialize;

use super::context::StageContext;
use super::outcome::StageStatus;
use crate::types::StageName;

/// Condition deciding whether a stage runs.
///
/// ```yaml
/// when: always
/// when: { branch: main }
/// when: { all: [ { branch_in: [main, release] }, { event: push } ] }
/// when: { stage: { name: Build & Test, status: succeeded } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    #[default]
    Always,
    Branch(String),
    BranchIn(Vec<String>),
    Event(String),
    Stage {
        name: StageName,
        status: StageStatus,
    },
    All(Vec<Precondition>),
    Any(Vec<Precondition>),
    Not(Box<Precondition>),
}

impl Precondition {
    pub fn branch(branch: impl Into<String>) -> Self {
        Precondition::Branch(branch.into())
    }

    pub fn stage_status(name: StageName, status: StageStatus) -> Self {
        Precondition::Stage { name, status }
    }

    pub fn evaluate(&self, context: &StageContext) -> bool {
        let trigger = context.request().trigger();
        match self {
            Precondition::Always => true,
            Precondition::Branch(branch) => trigger.branch == *branch,
            Precondition::BranchIn(branches) => branches.iter().any(|b| *b == trigger.branch),
            Precondition::Event(event) => trigger.event == *event,
            Precondition::Stage { name, status } => context.status_of(name) == Some(*status),
            Precondition::All(all) => all.iter().all(|p| p.evaluate(context)),
            Precondition::Any(any) => any.iter().any(|p| p.evaluate(context)),
            Precondition::Not(inner) => !inner.evaluate(context),
        }
    }

    /// Stages this precondition depends on.
    pub fn referenced_stages(&self) -> Vec<&StageName> {
        match self {
            Precondition::Stage { name, .. } => vec![name],
            Precondition::All(list) | Precondition::Any(list) => {
                list.iter().flat_map(Precondition::referenced_stages).collect()
            }
            Precondition::Not(inner) => inner.referenced_stages(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ReleaseRequest, TargetEnvironment, TriggerMetadata};
    use crate::stage::outcome::{SkipReason, StageOutcome};
    use crate::types::{ArtifactRef, ResourceName};
    use std::sync::Arc;

    fn context(branch: &str) -> StageContext {
        let request = ReleaseRequest::new(
            ArtifactRef::parse("ghcr.io/org/demo:1").unwrap(),
            TargetEnvironment {
                cluster: "kind".to_string(),
                namespace: ResourceName::new("demo").unwrap(),
                release: ResourceName::new("demo").unwrap(),
            },
            TriggerMetadata {
                branch: branch.to_string(),
                commit: "abc".to_string(),
                actor: "dev".to_string(),
                event: "push".to_string(),
            },
        );
        StageContext::new(Arc::new(request))
    }

    #[test]
    fn branch_conditions() {
        let main = context("main");
        let develop = context("develop");
        let only_main = Precondition::branch("main");
        assert!(only_main.evaluate(&main));
        assert!(!only_main.evaluate(&develop));

        let release_branches =
            Precondition::BranchIn(vec!["main".to_string(), "develop".to_string()]);
        assert!(release_branches.evaluate(&develop));
        assert!(Precondition::Not(Box::new(only_main)).evaluate(&develop));
    }

    #[test]
    fn stage_condition_reads_prior_outcomes() {
        let build = StageName::new("Build").unwrap();
        let ctx = context("main").advance(
            &StageOutcome::skipped(build.clone(), true, SkipReason::Precondition),
            None,
        );

        assert!(Precondition::stage_status(build.clone(), StageStatus::Skipped).evaluate(&ctx));
        assert!(!Precondition::stage_status(build, StageStatus::Succeeded).evaluate(&ctx));
    }

    #[test]
    fn parses_from_yaml() {
        let p: Precondition = serde_yaml::from_str("always").unwrap();
        assert_eq!(p, Precondition::Always);

        let p: Precondition = serde_yaml::from_str(
            "all:\n  - branch: main\n  - stage: { name: Build & Test, status: succeeded }\n",
        )
        .unwrap();
        assert_eq!(p.referenced_stages().len(), 1);
        assert!(p.referenced_stages()[0] == "Build & Test");
    }
}
