//! Run and unit state machines
//!
//! A run moves `Idle -> Running -> Completed` and is never reused. A unit
//! moves `Pending -> Running` and ends `Succeeded` or `Failed`; a unit that
//! was still pending when the run stopped ends `Skipped`.

use crate::error::SchedulerError;

/// Lifecycle of a [`crate::JobRunner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Accepting batches, not started
    Idle,
    /// Dispatching or draining units
    Running,
    /// Terminal
    Completed,
}

/// Lifecycle of one unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Enumerated, waiting for a worker
    Pending,
    /// Inside `run`
    Running,
    /// `run` returned `Ok`
    Succeeded,
    /// `run` returned an error or panicked
    Failed,
    /// Dropped without running after a stop
    Skipped,
}

impl RunState {
    /// States reachable from `self` in one step
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [RunState] {
        match self {
            Self::Idle => &[Self::Running],
            Self::Running => &[Self::Completed],
            Self::Completed => &[],
        }
    }

    /// Check a transition
    ///
    /// # Errors
    /// [`SchedulerError::IllegalTransition`] when `to` is not reachable
    pub fn transition(self, to: RunState) -> Result<RunState, SchedulerError> {
        if self.allowed_transitions().contains(&to) {
            Ok(to)
        } else {
            Err(SchedulerError::IllegalTransition { from: self, to })
        }
    }
}

impl UnitState {
    /// States reachable from `self` in one step
    #[must_use]
    pub fn allowed_transitions(self) -> &'static [UnitState] {
        match self {
            Self::Pending => &[Self::Running, Self::Skipped],
            Self::Running => &[Self::Succeeded, Self::Failed],
            Self::Succeeded | Self::Failed | Self::Skipped => &[],
        }
    }

    /// Whether the unit has reached an end state
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Check a transition
    ///
    /// # Errors
    /// [`SchedulerError::IllegalUnitTransition`] when `to` is not reachable
    pub fn transition(self, to: UnitState) -> Result<UnitState, SchedulerError> {
        if self.allowed_transitions().contains(&to) {
            Ok(to)
        } else {
            Err(SchedulerError::IllegalUnitTransition { from: self, to })
        }
    }
}
