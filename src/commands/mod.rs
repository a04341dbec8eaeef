// ABOUTME: Command module aggregator for the release CLI.
// ABOUTME: Re-exports run and validate command handlers.

mod run;
mod validate;

pub use run::{RunOptions, run};
pub use validate::validate;

use releasectl::config::WorkflowConfig;
use releasectl::error::Result;
use std::path::Path;

/// Load an explicit workflow file, or discover one in `dir`.
fn load_workflow(dir: &Path, explicit: Option<&Path>) -> Result<WorkflowConfig> {
    match explicit {
        Some(path) => WorkflowConfig::load(path),
        None => WorkflowConfig::discover(dir),
    }
}
