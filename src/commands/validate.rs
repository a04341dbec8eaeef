// ABOUTME: Validate command implementation.
// ABOUTME: Builds the stage graph without running anything and prints the plan.

use releasectl::diagnostics::Diagnostics;
use releasectl::error::Result;
use releasectl::output::Output;
use std::env;
use std::path::Path;

use super::load_workflow;

pub fn validate(workflow: Option<&Path>, output: &Output) -> Result<i32> {
    let cwd = env::current_dir()?;
    let config = load_workflow(&cwd, workflow)?;
    let graph = config.graph()?;

    let mut diag = Diagnostics::default();
    diag.extend(graph.lint());

    output.plan(&graph);
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
    output.success(&format!(
        "Workflow is valid ({} stages{})",
        graph.ordered_stages().len(),
        if config.is_canonical() { ", built-in pipeline" } else { "" }
    ));
    Ok(0)
}
