// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::controller::ReleaseReport;
use crate::graph::StageGraph;
use crate::stage::{RunWhen, SkipReason, StageStatus};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration_secs(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit("success", message),
        }
    }

    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit("warning", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonEvent {
                    event: "error",
                    message,
                    duration_secs: self.duration_secs(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }

    /// Print the stages a workflow would run, without running them.
    pub fn plan(&self, graph: &StageGraph) {
        match self.mode {
            OutputMode::Json => {
                for stage in graph.ordered_stages().iter() {
                    let line = PlanLine {
                        event: "stage",
                        stage: stage.name.as_str(),
                        actions: stage.actions.iter().map(|a| a.to_string()).collect(),
                        blocking: stage.blocking,
                        credential: stage.credential,
                        rollout: stage.rollout.is_some(),
                    };
                    if let Ok(json) = serde_json::to_string(&line) {
                        println!("{json}");
                    }
                }
            }
            OutputMode::Quiet => {}
            OutputMode::Normal => {
                for (i, stage) in graph.ordered_stages().iter().enumerate() {
                    let mut flags = Vec::new();
                    if !stage.blocking {
                        flags.push("non-blocking");
                    }
                    if stage.run == RunWhen::Always {
                        flags.push("always");
                    }
                    if stage.credential {
                        flags.push("credential");
                    }
                    if stage.rollout.is_some() {
                        flags.push("rollout");
                    }
                    if flags.is_empty() {
                        println!("{:>2}. {}", i + 1, stage.name);
                    } else {
                        println!("{:>2}. {} [{}]", i + 1, stage.name, flags.join(", "));
                    }
                    for action in &stage.actions {
                        println!("      $ {action}");
                    }
                }
            }
        }
    }

    /// Print a finished release: one line per stage, then the verdict.
    pub fn report(&self, report: &ReleaseReport) {
        match self.mode {
            OutputMode::Json => {
                if let Ok(json) = serde_json::to_string(&ReportLine {
                    event: "report",
                    report,
                }) {
                    println!("{json}");
                }
            }
            OutputMode::Quiet => {
                println!("{}: {}", report.request().target(), report.status());
            }
            OutputMode::Normal => {
                println!(
                    "Release of {} to {}",
                    report.request().artifact(),
                    report.request().target()
                );
                for outcome in report.outcomes() {
                    let detail = match (outcome.status(), outcome.skip_reason(), outcome.error()) {
                        (StageStatus::Skipped, Some(SkipReason::Precondition), _) => {
                            "precondition not met".to_string()
                        }
                        (StageStatus::Skipped, Some(SkipReason::UpstreamFailed { stage }), _) => {
                            format!("'{stage}' failed")
                        }
                        (StageStatus::Skipped, _, _) => "cancelled".to_string(),
                        (_, _, Some(error)) => error.message.clone(),
                        _ => format!(
                            "{} attempt(s), {:.1}s",
                            outcome.attempts(),
                            outcome.duration().as_secs_f64()
                        ),
                    };
                    println!(
                        "  {:<9} {} ({})",
                        outcome.status().to_string(),
                        outcome.stage(),
                        detail
                    );
                }
                if let Some(error) = report.error() {
                    println!("  {error}");
                }
                println!("Release {}", report.status());
            }
        }
    }

    fn emit(&self, event: &str, message: &str) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.duration_secs(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            println!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct PlanLine<'a> {
    event: &'a str,
    stage: &'a str,
    actions: Vec<String>,
    blocking: bool,
    credential: bool,
    rollout: bool,
}

#[derive(Serialize)]
struct ReportLine<'a> {
    event: &'a str,
    #[serde(flatten)]
    report: &'a ReleaseReport,
}
