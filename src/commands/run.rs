// ABOUTME: Run command implementation.
// ABOUTME: Loads requests, locks targets, runs releases concurrently, and publishes reports.

use releasectl::controller::{ReleaseController, ReleaseReport};
use releasectl::credentials::GcloudTokenProvider;
use releasectl::diagnostics::{Diagnostics, Warning};
use releasectl::error::Result;
use releasectl::exec::{ActionExecutor, ProcessExecutor};
use releasectl::lock::{TargetLock, default_state_dir};
use releasectl::output::Output;
use releasectl::request::ReleaseRequest;
use releasectl::rollout::{KubectlReplicaSource, RolloutVerifier};
use releasectl::sink::{HookSink, JsonFileSink, LogSink, ReportSink, publish_all};
use releasectl::stage::StageRunner;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::load_workflow;

pub struct RunOptions {
    pub request_files: Vec<PathBuf>,
    pub workflow: Option<PathBuf>,
    pub dry_run: bool,
    pub report_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub force_unlock: bool,
}

/// Run every request and return the highest exit code among them.
pub async fn run(opts: RunOptions, mut output: Output, cancel: CancellationToken) -> Result<i32> {
    output.start_timer();
    let cwd = env::current_dir()?;
    let config = load_workflow(&cwd, opts.workflow.as_deref())?;
    let graph = config.graph()?;

    let mut diag = Diagnostics::default();
    diag.extend(graph.lint());

    let requests = opts
        .request_files
        .iter()
        .map(|path| ReleaseRequest::load(path))
        .collect::<Result<Vec<_>>>()?;

    if opts.dry_run {
        output.plan(&graph);
        for request in &requests {
            output.progress(&format!(
                "Would release {} to {} (branch {}, commit {})",
                request.artifact(),
                request.target(),
                request.trigger().branch,
                request.trigger().commit
            ));
        }
        for warning in diag.warnings() {
            output.warning(&warning.message);
        }
        output.success("Dry run complete: workflow and requests are valid");
        return Ok(0);
    }

    let state_dir = opts.state_dir.unwrap_or_else(default_state_dir);
    let mut locks = Vec::with_capacity(requests.len());
    for request in &requests {
        output.progress(&format!("  → Locking {}...", request.target()));
        let (lock, warning) = TargetLock::acquire(&state_dir, request.target(), opts.force_unlock)?;
        diag.extend(warning);
        locks.push(lock);
    }

    let identity = config.identity();
    let executor: Arc<dyn ActionExecutor> =
        Arc::new(ProcessExecutor::new(config.defaults.output_cap));
    let tokens = Arc::new(GcloudTokenProvider::new(
        Arc::clone(&executor),
        identity.clone(),
    ));
    let verifier = RolloutVerifier::new(Arc::new(KubectlReplicaSource::new(Arc::clone(
        &executor,
    ))));
    let runner = StageRunner::new(executor, tokens, verifier)
        .refresh_skew(identity.refresh_skew)
        .credential_env(identity.env_var)
        .output_tail(config.defaults.output_tail);
    let controller = ReleaseController::new(graph, runner);

    output.progress(&format!(
        "Running {} release(s) through {} stages",
        requests.len(),
        controller.graph().ordered_stages().len()
    ));
    let reports = controller.run_many(requests, &cancel).await;

    let sinks = report_sinks(&cwd, opts.report_dir);
    for report in &reports {
        diag.extend(publish_all(&sinks, report).await);
        diag.extend(non_blocking_warnings(report));
        output.report(report);
    }

    for lock in locks {
        let path = lock.path().display().to_string();
        if let Err(e) = lock.release() {
            diag.warn(Warning::lock_release(format!(
                "failed to remove lock {path}: {e}"
            )));
        }
    }

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let code = reports
        .iter()
        .map(ReleaseReport::exit_code)
        .max()
        .unwrap_or(0);
    if code == 0 {
        output.success("Release complete!");
    }
    Ok(code)
}

/// Sinks in publish order; the JSON file must exist before hooks read it.
fn report_sinks(cwd: &std::path::Path, report_dir: Option<PathBuf>) -> Vec<Arc<dyn ReportSink>> {
    let mut sinks: Vec<Arc<dyn ReportSink>> = vec![Arc::new(LogSink)];
    let mut hooks = HookSink::new(cwd);
    if let Some(dir) = report_dir {
        let files = JsonFileSink::new(dir);
        hooks = hooks.with_report_files(files.clone());
        sinks.push(Arc::new(files));
    }
    sinks.push(Arc::new(hooks));
    sinks
}

fn non_blocking_warnings(report: &ReleaseReport) -> Vec<Warning> {
    report
        .non_blocking_failures()
        .map(|outcome| {
            Warning::non_blocking_failure(format!(
                "non-blocking stage '{}' failed for {}: {}",
                outcome.stage(),
                report.request().target(),
                outcome
                    .error()
                    .map(|e| e.message.as_str())
                    .unwrap_or("unknown error")
            ))
        })
        .collect()
}
