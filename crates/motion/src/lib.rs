//! # Cartesian Trajectory Planner
//!
//! This crate plans and executes cartesian motion for a CNC-class machine.
//! It sits below the G-code interpreter / canonical machine and above the
//! motor mapping and step queues, and is responsible only for cartesian
//! motions: lines, arcs, dwells and program control directives.
//!
//! ## Operation
//!
//! 1.  Producers ([`Planner::line`], [`Planner::aline`], [`Planner::arc`],
//!     [`Planner::dwell`], queued stop/start/end) acquire slots from a fixed
//!     ring of move buffers, fill them and commit them to the queue.
//!
//! 2.  An `aline` (acceleration-limited line) is decomposed into head, body
//!     and tail regions under a maximum-jerk constraint, producing an S-curve
//!     velocity profile. Each new `aline` triggers a backward replanning pass
//!     that raises junction velocities across already-queued moves while
//!     keeping the chain brakeable to a full stop.
//!
//! 3.  [`Planner::dispatch`] is the cooperative continuation driven by the
//!     outer controller loop. It routes the current run buffer to its
//!     type-specific runner; runners either complete a sub-move or report
//!     that the downstream motor queue is full and must be retried.
//!
//! All planning math is double-precision, in absolute millimeter coordinates
//! and minutes; times convert to integer microseconds at the motor-queue
//! boundary.

pub mod buffer;
pub mod config;
pub mod error;
pub mod kinematics;
pub mod math;
pub mod motor;
pub mod planner;
mod runtime;

// Re-export core types for easier access
pub use buffer::{ArcGeometry, BufferPool, BufferState, MoveBuffer, MoveState, MoveType};
pub use config::{PathMode, PlannerConfig};
pub use error::{DispatchOutcome, PlannerError};
pub use kinematics::{CartesianKinematics, Kinematics};
pub use motor::{MotorQueue, StepperControl, StopDirective};
pub use planner::Planner;

/// Number of cartesian axes handled by the planner (X, Y, Z, A, B, C).
pub const AXES: usize = 6;

/// Number of physical motor channels fed by the kinematics stage.
pub const MOTORS: usize = 4;

/// Axis indices into an [`AxisVector`].
pub const X: usize = 0;
pub const Y: usize = 1;
pub const Z: usize = 2;
pub const A: usize = 3;
pub const B: usize = 4;
pub const C: usize = 5;

/// An absolute position or travel vector in millimeters, one entry per axis.
pub type AxisVector = [f64; AXES];

/// Relative step counts per motor channel, as produced by the kinematics.
pub type MotorSteps = [f64; MOTORS];

/// Number of move buffers in the planning ring. An `aline` consumes three
/// (head, body, tail), so this supports eight fully queued alines.
pub const BUFFER_POOL_SIZE: usize = 24;

/// Maximum number of moves the backward replanner will walk before it traps.
pub const MAX_LOOKBACK_DEPTH: usize = 8;

/// Minutes-to-microseconds conversion factor.
pub const ONE_MINUTE_OF_MICROSECONDS: f64 = 60e6;
