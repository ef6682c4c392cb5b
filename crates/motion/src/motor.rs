//! Downstream motor-queue and stepper interfaces.
//!
//! The planner never touches hardware. It emits timed line, dwell and
//! control directives into a bounded motor queue that an interrupt-driven
//! stepper subsystem consumes, and pokes the steppers only through
//! [`StepperControl`].

use crate::MotorSteps;

/// Program-control directive carried through the motor queue so it executes
/// in order with the motion around it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopDirective {
    /// Restart the motors.
    Start,
    /// Stop the motors once the queue reaches this point.
    Stop,
    /// Stop the motors and end the program.
    End,
}

/// The bounded pulse-generation sink.
///
/// Runners must check [`MotorQueue::has_room`] before queueing and suspend
/// (return EAGAIN upward) when it reports false; implementations are never
/// expected to block.
pub trait MotorQueue {
    /// True when at least one more command can be accepted.
    fn has_room(&self) -> bool;
    /// Queue a straight pulse train: `steps` per motor over `microseconds`.
    fn queue_line(&mut self, steps: MotorSteps, microseconds: u32);
    /// Queue a timed pause with no pulses.
    fn queue_dwell(&mut self, microseconds: u32);
    /// Queue a stop/start/end directive.
    fn queue_stops(&mut self, directive: StopDirective);
}

/// Immediate stepper-subsystem controls. Safe to call from ISR context in
/// the embedded build; here they gate the simulated consumer.
pub trait StepperControl {
    fn start(&mut self);
    fn stop(&mut self);
    fn is_busy(&self) -> bool;
}
