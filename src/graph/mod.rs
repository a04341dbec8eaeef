// ABOUTME: Ordered, statically validated release workflow.
// ABOUTME: Rejects forward or dangling precondition references at build time.

pub mod canonical;

pub use canonical::CanonicalSettings;

use nonempty::NonEmpty;
use std::collections::HashSet;

use crate::diagnostics::Warning;
use crate::stage::Stage;
use crate::types::StageName;

/// Build-time workflow validation failure. Never raised mid-run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidGraph {
    #[error("invalid graph: workflow has no stages")]
    Empty,

    #[error("invalid graph: duplicate stage name '{0}'")]
    DuplicateStage(StageName),

    #[error("invalid graph: stage '{stage}' depends on unknown stage '{reference}'")]
    UnknownReference {
        stage: StageName,
        reference: StageName,
    },

    #[error("invalid graph: stage '{stage}' depends on '{reference}', which does not precede it")]
    ForwardReference {
        stage: StageName,
        reference: StageName,
    },

    #[error("invalid graph: {0}")]
    InvalidName(String),

    #[error("invalid graph: stage '{0}' has an empty command")]
    EmptyCommand(String),

    #[error("invalid graph: stage '{0}' has no actions and no rollout check")]
    EmptyStage(StageName),

    #[error("invalid graph: stage '{0}' must allow at least one attempt")]
    ZeroAttempts(StageName),

    #[error("invalid graph: stage '{0}' has a zero timeout")]
    ZeroTimeout(StageName),

    #[error("invalid graph: stage '{0}' polls rollout with a zero interval")]
    ZeroPollInterval(StageName),
}

/// The stages of a release in execution order.
#[derive(Debug, Clone)]
pub struct StageGraph {
    stages: NonEmpty<Stage>,
}

impl StageGraph {
    pub fn builder() -> StageGraphBuilder {
        StageGraphBuilder::default()
    }

    /// Validate and build a graph from stages in declaration order.
    pub fn new(stages: Vec<Stage>) -> Result<Self, InvalidGraph> {
        let stages = NonEmpty::from_vec(stages).ok_or(InvalidGraph::Empty)?;

        let all: HashSet<&StageName> = stages.iter().map(|s| &s.name).collect();
        let mut preceding: HashSet<&StageName> = HashSet::new();

        for stage in stages.iter() {
            if preceding.contains(&stage.name) {
                return Err(InvalidGraph::DuplicateStage(stage.name.clone()));
            }
            if stage.actions.is_empty() && stage.rollout.is_none() && !stage.credential {
                return Err(InvalidGraph::EmptyStage(stage.name.clone()));
            }
            if stage.retry.max_attempts == 0 {
                return Err(InvalidGraph::ZeroAttempts(stage.name.clone()));
            }
            if stage.timeout.is_zero() {
                return Err(InvalidGraph::ZeroTimeout(stage.name.clone()));
            }
            if stage
                .rollout
                .as_ref()
                .is_some_and(|r| r.poll_interval.is_zero())
            {
                return Err(InvalidGraph::ZeroPollInterval(stage.name.clone()));
            }

            for reference in stage.when.referenced_stages() {
                if !preceding.contains(reference) {
                    let reference = reference.clone();
                    let stage = stage.name.clone();
                    return Err(if all.contains(&reference) {
                        InvalidGraph::ForwardReference { stage, reference }
                    } else {
                        InvalidGraph::UnknownReference { stage, reference }
                    });
                }
            }

            preceding.insert(&stage.name);
        }

        Ok(Self { stages })
    }

    /// Stages in declaration order, which is also execution order.
    pub fn ordered_stages(&self) -> &NonEmpty<Stage> {
        &self.stages
    }

    /// Non-fatal findings: actions whose repeated application would not converge.
    pub fn lint(&self) -> Vec<Warning> {
        self.stages
            .iter()
            .flat_map(|stage| {
                stage
                    .actions
                    .iter()
                    .filter(|a| a.is_create_only())
                    .map(move |action| {
                        Warning::create_only_action(format!(
                            "stage '{}' runs '{}', which is not idempotent; \
                             prefer apply or upgrade --install semantics",
                            stage.name, action
                        ))
                    })
            })
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct StageGraphBuilder {
    stages: Vec<Stage>,
}

impl StageGraphBuilder {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Result<StageGraph, InvalidGraph> {
        StageGraph::new(self.stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Action;
    use crate::retry::RetryPolicy;
    use crate::stage::{Precondition, StageStatus};
    use std::time::Duration;

    fn name(s: &str) -> StageName {
        StageName::new(s).unwrap()
    }

    fn stage(s: &str) -> Stage {
        Stage::new(name(s)).action(Action::new("true"))
    }

    #[test]
    fn preserves_declaration_order() {
        let graph = StageGraph::builder()
            .stage(stage("Checkout"))
            .stage(stage("Build"))
            .stage(stage("Publish"))
            .build()
            .unwrap();
        let names: Vec<_> = graph
            .ordered_stages()
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, ["Checkout", "Build", "Publish"]);
    }

    #[test]
    fn rejects_forward_reference() {
        let err = StageGraph::builder()
            .stage(
                stage("Deploy")
                    .when(Precondition::stage_status(name("Publish"), StageStatus::Succeeded)),
            )
            .stage(stage("Publish"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            InvalidGraph::ForwardReference {
                stage: name("Deploy"),
                reference: name("Publish"),
            }
        );
    }

    #[test]
    fn rejects_self_and_unknown_references() {
        let err = StageGraph::builder()
            .stage(stage("Deploy").when(Precondition::stage_status(
                name("Deploy"),
                StageStatus::Succeeded,
            )))
            .build()
            .unwrap_err();
        assert!(matches!(err, InvalidGraph::ForwardReference { .. }));

        let err = StageGraph::builder()
            .stage(stage("Deploy").when(Precondition::Not(Box::new(
                Precondition::stage_status(name("Ghost"), StageStatus::Failed),
            ))))
            .build()
            .unwrap_err();
        assert!(matches!(err, InvalidGraph::UnknownReference { .. }));
    }

    #[test]
    fn rejects_structural_problems() {
        assert_eq!(StageGraph::new(vec![]).unwrap_err(), InvalidGraph::Empty);
        assert_eq!(
            StageGraph::new(vec![stage("Build"), stage("Build")]).unwrap_err(),
            InvalidGraph::DuplicateStage(name("Build"))
        );
        assert_eq!(
            StageGraph::new(vec![Stage::new(name("Nothing"))]).unwrap_err(),
            InvalidGraph::EmptyStage(name("Nothing"))
        );
        assert_eq!(
            StageGraph::new(vec![stage("Build").retry(
                RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(1)),
                &[],
            )])
            .unwrap_err(),
            InvalidGraph::ZeroAttempts(name("Build"))
        );
        assert_eq!(
            StageGraph::new(vec![stage("Build").timeout(Duration::ZERO)]).unwrap_err(),
            InvalidGraph::ZeroTimeout(name("Build"))
        );
    }

    #[test]
    fn lint_flags_create_only_actions() {
        let graph = StageGraph::builder()
            .stage(
                Stage::new(name("Deploy"))
                    .action(Action::new("kubectl").args(["create", "-f", "deploy.yaml"])),
            )
            .stage(
                Stage::new(name("Apply"))
                    .action(Action::new("kubectl").args(["apply", "-f", "deploy.yaml"])),
            )
            .build()
            .unwrap();
        let warnings = graph.lint();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("Deploy"));
    }
}
