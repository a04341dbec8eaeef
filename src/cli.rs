// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "release")]
#[command(about = "Drive container releases through a validated stage graph")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output for CI (only final results)
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Output JSON lines for scripting
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a release.yml workflow file
    Init {
        /// Overwrite an existing workflow file
        #[arg(short, long)]
        force: bool,
    },

    /// Run one or more release requests
    Run {
        /// Request file (YAML or JSON); repeat to run several releases concurrently
        #[arg(short = 'r', long = "request-file", required = true)]
        request_files: Vec<PathBuf>,

        /// Workflow file (default: discovered in the current directory)
        #[arg(short, long)]
        workflow: Option<PathBuf>,

        /// Validate the workflow and requests, print the plan, run nothing
        #[arg(long)]
        dry_run: bool,

        /// Write each report as JSON into this directory
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Directory holding target locks
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Break an existing lock held by another release
        #[arg(long)]
        force_unlock: bool,
    },

    /// Validate the workflow and print the stage plan
    Validate {
        /// Workflow file (default: discovered in the current directory)
        #[arg(short, long)]
        workflow: Option<PathBuf>,
    },
}
