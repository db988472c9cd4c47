//! Install job state machine
//!
//! `JobStateMachine` is the single owner of a job's lifecycle state. It only
//! allows the transitions below and rejects everything else with a
//! `JobTransitionError`.
//!
//! # State Flow
//!
//! ```text
//! Idle
//!   ↓
//! Running ──→ Completed
//!   │    └──→ CompletedWithRebootPending
//!   └───────→ Cancelled
//! ```
//!
//! A machine in a terminal state can be `reset()` to `Idle` for the next job.

use std::fmt;
use thiserror::Error;

/// Lifecycle of one install job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobState {
    /// No job has started
    #[default]
    Idle,

    /// Packages are being processed
    Running,

    /// Every descriptor was processed, no reboot needed
    Completed,

    /// Every descriptor was processed and at least one installed package
    /// asked for a restart
    CompletedWithRebootPending,

    /// The job was cancelled; unprocessed descriptors were skipped
    Cancelled,
}

impl JobState {
    /// Returns true for states a job ends in.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithRebootPending | Self::Cancelled
        )
    }

    /// Returns true if moving from `self` to `target` is allowed.
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::CompletedWithRebootPending)
                | (Self::Running, Self::Cancelled)
        )
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::CompletedWithRebootPending => "Completed (reboot pending)",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobTransitionError {
    /// The job already ended
    #[error("Cannot transition from terminal state {from}")]
    FromTerminalState { from: JobState },

    /// The transition is not part of the job lifecycle
    #[error("Invalid job transition from {from} to {to}")]
    Invalid { from: JobState, to: JobState },

    /// Attempted to transition to the same state
    #[error("Already in state {state}")]
    AlreadyInState { state: JobState },
}

/// Owns the state of a single job and validates every transition.
///
/// # Example
///
/// ```
/// use postinstall::install_state::{JobState, JobStateMachine};
///
/// let mut job = JobStateMachine::new();
/// job.start().unwrap();
/// assert_eq!(job.current(), JobState::Running);
///
/// // Idle can't be reached from Running
/// assert!(job.transition_to(JobState::Idle).is_err());
///
/// job.finish(false).unwrap();
/// assert_eq!(job.current(), JobState::Completed);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JobStateMachine {
    current: JobState,
}

impl JobStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn current(&self) -> JobState {
        self.current
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.current == JobState::Running
    }

    /// Move to `target` if the lifecycle allows it.
    ///
    /// # Errors
    ///
    /// - `AlreadyInState` if `target` is the current state
    /// - `FromTerminalState` if the job already ended
    /// - `Invalid` for any other transition not in the lifecycle
    pub fn transition_to(&mut self, target: JobState) -> Result<JobState, JobTransitionError> {
        if target == self.current {
            return Err(JobTransitionError::AlreadyInState { state: target });
        }
        if self.current.is_terminal() {
            return Err(JobTransitionError::FromTerminalState { from: self.current });
        }
        if !self.current.can_transition_to(target) {
            return Err(JobTransitionError::Invalid {
                from: self.current,
                to: target,
            });
        }

        tracing::debug!("Job state {} -> {}", self.current, target);
        self.current = target;
        Ok(target)
    }

    /// `Idle -> Running`
    pub fn start(&mut self) -> Result<JobState, JobTransitionError> {
        self.transition_to(JobState::Running)
    }

    /// `Running -> Completed` or `Running -> CompletedWithRebootPending`
    pub fn finish(&mut self, needs_reboot: bool) -> Result<JobState, JobTransitionError> {
        if needs_reboot {
            self.transition_to(JobState::CompletedWithRebootPending)
        } else {
            self.transition_to(JobState::Completed)
        }
    }

    /// `Running -> Cancelled`
    pub fn cancel(&mut self) -> Result<JobState, JobTransitionError> {
        self.transition_to(JobState::Cancelled)
    }

    /// Back to `Idle` from any state.
    pub fn reset(&mut self) {
        self.current = JobState::Idle;
    }
}
