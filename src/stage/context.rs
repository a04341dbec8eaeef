// ABOUTME: Immutable context threaded through stage execution.
// ABOUTME: Each stage receives a context; the next one is derived, never mutated in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::outcome::{StageOutcome, StageStatus};
use crate::credentials::Credential;
use crate::request::ReleaseRequest;
use crate::types::StageName;

/// What a stage can see: the request, prior outcomes, and the current credential.
#[derive(Debug, Clone)]
pub struct StageContext {
    request: Arc<ReleaseRequest>,
    prior: Vec<(StageName, StageStatus)>,
    credential: Option<Credential>,
}

impl StageContext {
    pub fn new(request: Arc<ReleaseRequest>) -> Self {
        Self {
            request,
            prior: Vec::new(),
            credential: None,
        }
    }

    pub fn request(&self) -> &ReleaseRequest {
        &self.request
    }

    /// Status of an earlier stage in this run.
    pub fn status_of(&self, stage: &StageName) -> Option<StageStatus> {
        self.prior
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, status)| *status)
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Bindings every action receives.
    pub fn bindings(&self) -> BTreeMap<String, String> {
        self.request.bindings()
    }

    /// Context for the next stage, with `outcome` recorded and the
    /// credential replaced when the stage acquired a new one.
    #[must_use]
    pub fn advance(&self, outcome: &StageOutcome, credential: Option<Credential>) -> Self {
        let mut prior = self.prior.clone();
        prior.push((outcome.stage().clone(), outcome.status()));
        Self {
            request: Arc::clone(&self.request),
            prior,
            credential: credential.or_else(|| self.credential.clone()),
        }
    }
}
