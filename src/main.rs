// ABOUTME: Entry point for the release CLI application.
// ABOUTME: Parses arguments, installs logging and Ctrl-C cancellation, and maps results to exit codes.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::RunOptions;
use releasectl::config;
use releasectl::error::Result;
use releasectl::output::{Output, OutputMode};
use std::env;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling releases");
                cancel.cancel();
            }
        });
    }

    let code = match run(cli.command, mode, cancel).await {
        Ok(code) => code,
        Err(e) => {
            Output::new(mode).error(&e.to_string());
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(command: Commands, mode: OutputMode, cancel: CancellationToken) -> Result<i32> {
    let output = Output::new(mode);
    match command {
        Commands::Init { force } => {
            let cwd = env::current_dir()?;
            let path = config::init_workflow(&cwd, force)?;
            output.success(&format!("Created {}", path.display()));
            Ok(0)
        }
        Commands::Run {
            request_files,
            workflow,
            dry_run,
            report_dir,
            state_dir,
            force_unlock,
        } => {
            let opts = RunOptions {
                request_files,
                workflow,
                dry_run,
                report_dir,
                state_dir,
                force_unlock,
            };
            commands::run(opts, output, cancel).await
        }
        Commands::Validate { workflow } => commands::validate(workflow.as_deref(), &output),
    }
}
