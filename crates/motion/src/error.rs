//! Error and status types for the planner.

use thiserror::Error;

/// Errors surfaced by the move producers.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum PlannerError {
    /// The requested move is below the minimum plannable length or time.
    /// Planner state is unchanged; the caller may simply skip the move.
    #[error("move is below the minimum plannable length or time")]
    ZeroLengthMove,
    /// No write buffer was available. Producers must not be called without
    /// first checking capacity, so this indicates a contract violation in
    /// the caller.
    #[error("move buffer ring is full; capacity must be checked before queueing")]
    BufferFull,
}

/// Result of one [`crate::Planner::dispatch`] invocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The current run buffer completed and was recycled.
    Completed,
    /// The runner could not make progress (typically the motor queue is
    /// full). Re-enter the dispatcher later.
    Again,
    /// Nothing is queued; the dispatcher did no work.
    Idle,
    /// The runner hit an inconsistent state. The buffer was discarded and
    /// a trap recorded; motion continues with the next buffer.
    Fault,
}

/// Continuation status returned by the individual move runners.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum RunStatus {
    Done,
    Again,
    Fault,
}
