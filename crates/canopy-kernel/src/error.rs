//! Error types for the scheduler

use crate::state::{RunState, UnitState};
use std::fmt;
use std::sync::Arc;

/// Misuse of a [`crate::JobRunner`]
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// `run` called on a runner that already started
    #[error("run already started (state: {0:?})")]
    AlreadyStarted(RunState),

    /// Work added after dispatch finished
    #[error("run no longer accepts work (state: {0:?})")]
    Closed(RunState),

    /// `wait` called before `run`
    #[error("run has not been started")]
    NotStarted,

    /// A run transition outside the state machine
    #[error("illegal run transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: RunState,
        /// Requested state
        to: RunState,
    },

    /// A unit transition outside the state machine
    #[error("illegal unit transition {from:?} -> {to:?}")]
    IllegalUnitTransition {
        /// Current state
        from: UnitState,
        /// Requested state
        to: UnitState,
    },
}

/// Failure captured from one unit's `run`
///
/// Never raised by the runner itself; collected into
/// [`crate::RunSummary::unit_errors`].
#[derive(Debug, Clone)]
pub struct WorkUnitFailure {
    /// Batch the unit came from
    pub batch: String,
    /// Unit name
    pub unit: String,
    /// What the unit returned or the panic it raised
    pub error: Arc<anyhow::Error>,
}

impl fmt::Display for WorkUnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {:#}", self.unit, self.error)
    }
}

impl std::error::Error for WorkUnitFailure {}

/// Failure outside any unit: batch enumeration, hooks or worker startup
#[derive(Debug, Clone)]
pub struct SchedulerFailure {
    /// Batch involved, if any
    pub batch: Option<String>,
    /// Underlying error
    pub error: Arc<anyhow::Error>,
}

impl SchedulerFailure {
    pub(crate) fn new(batch: Option<&str>, error: anyhow::Error) -> Self {
        Self {
            batch: batch.map(str::to_string),
            error: Arc::new(error),
        }
    }
}

impl fmt::Display for SchedulerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.batch {
            Some(batch) => write!(f, "batch '{batch}': {:#}", self.error),
            None => write!(f, "scheduler: {:#}", self.error),
        }
    }
}

impl std::error::Error for SchedulerFailure {}
