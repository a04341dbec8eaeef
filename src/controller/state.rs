// ABOUTME: Release state marker types for the type state pattern.
// ABOUTME: Running carries the per-run bookkeeping; Pending carries nothing.

use chrono::{DateTime, Utc};

use crate::stage::{StageContext, StageOutcome};
use crate::types::StageName;

/// Accepted, no stage started yet.
/// Available actions: `start()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Pending;

/// Stages are being executed in graph order.
/// Available actions: `record()`, `skip()`, `finish()`
#[derive(Debug)]
pub struct Running {
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) context: StageContext,
    pub(crate) outcomes: Vec<StageOutcome>,
    /// First blocking stage that failed, if any.
    pub(crate) halted_by: Option<StageName>,
    pub(crate) cancelled: bool,
}
