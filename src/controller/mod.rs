// ABOUTME: Release controller: drives one request through the stage graph.
// ABOUTME: Never fails; every run ends in a ReleaseReport with one outcome per stage.

mod release;
mod report;
mod state;

pub use release::Release;
pub use report::{ReleaseReport, ReleaseStatus};
pub use state::{Pending, Running};

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::graph::StageGraph;
use crate::request::ReleaseRequest;
use crate::stage::StageRunner;

/// Runs releases against a fixed graph. Holds no per-release state, so one
/// controller serves any number of concurrent releases.
#[derive(Clone)]
pub struct ReleaseController {
    graph: Arc<StageGraph>,
    runner: StageRunner,
}

impl std::fmt::Debug for ReleaseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseController")
            .field("stages", &self.graph.ordered_stages().len())
            .finish()
    }
}

impl ReleaseController {
    pub fn new(graph: StageGraph, runner: StageRunner) -> Self {
        Self {
            graph: Arc::new(graph),
            runner,
        }
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Execute `request` to completion.
    ///
    /// Stages run strictly in graph order. After a blocking failure only
    /// `always` stages still run; after cancellation nothing runs and the
    /// remaining stages are recorded as skipped.
    pub async fn run_release(
        &self,
        request: ReleaseRequest,
        cancel: &CancellationToken,
    ) -> ReleaseReport {
        let mut release = Release::new(request).start();

        for stage in self.graph.ordered_stages().iter() {
            if let Some(reason) = release.skip_reason(stage, cancel.is_cancelled()) {
                release.skip(stage, reason);
                continue;
            }
            let run = self.runner.run(stage, release.context(), cancel).await;
            release.record(run);
        }

        release.finish()
    }

    /// Execute independent requests concurrently, one task each. Reports
    /// come back in input order; a task that panics yields a Failed report.
    pub async fn run_many(
        &self,
        requests: Vec<ReleaseRequest>,
        cancel: &CancellationToken,
    ) -> Vec<ReleaseReport> {
        let started_at = Utc::now();
        let handles: Vec<_> = requests
            .iter()
            .cloned()
            .map(|request| {
                let controller = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { controller.run_release(request, &cancel).await })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(requests)
            .map(|(joined, request)| match joined {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(env = %request.target(), "release task aborted: {}", e);
                    ReleaseReport::aborted(request, started_at, format!("release task aborted: {e}"))
                }
            })
            .collect()
    }
}
