//! Simulated motor queue and stepper subsystem.
//!
//! Implements the planner's downstream seams over a bounded in-memory
//! queue: commands are accepted while there is room (so the EAGAIN /
//! backpressure path behaves exactly as it does against the real pulse
//! buffer) and consumed by explicit [`FakeMotorQueue::drain`] calls playing
//! the role of the stepper interrupt.

use heapless::Deque;
use motion::{MotorQueue, MotorSteps, StepperControl, StopDirective};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One command as it crosses the motor-queue boundary.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub enum MotorCommand {
    Line { steps: MotorSteps, microseconds: u32 },
    Dwell { microseconds: u32 },
    Stop,
    Start,
    End,
}

/// A recorded command with its acceptance order.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TraceEntry {
    pub seq: usize,
    pub command: MotorCommand,
}

/// Bounded fake of the motor queue, `CAP` commands deep, doubling as the
/// stepper control surface.
#[derive(Debug)]
pub struct FakeMotorQueue<const CAP: usize> {
    queue: Deque<MotorCommand, CAP>,
    executed: Vec<MotorCommand>,
    trace: Vec<TraceEntry>,
    running: bool,
    seq: usize,
}

impl<const CAP: usize> Default for FakeMotorQueue<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> FakeMotorQueue<CAP> {
    pub fn new() -> Self {
        Self {
            queue: Deque::new(),
            executed: Vec::new(),
            trace: Vec::new(),
            running: true,
            seq: 0,
        }
    }

    fn accept(&mut self, command: MotorCommand) {
        debug!(seq = self.seq, ?command, "motor queue accepted command");
        self.trace.push(TraceEntry { seq: self.seq, command });
        self.seq += 1;
        // callers must check has_room first; a full queue here is a
        // planner-side contract violation worth failing loudly on
        self.queue
            .push_back(command)
            .expect("motor queue overrun: has_room not checked");
    }

    /// Consume up to `count` commands, as the stepper interrupt would.
    pub fn drain(&mut self, count: usize) {
        for _ in 0..count {
            match self.queue.pop_front() {
                Some(command) => {
                    if command == MotorCommand::End {
                        self.running = false;
                    }
                    self.executed.push(command);
                }
                None => break,
            }
        }
    }

    pub fn drain_all(&mut self) {
        self.drain(CAP);
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Commands consumed so far, in execution order.
    pub fn executed(&self) -> &[MotorCommand] {
        &self.executed
    }

    /// Every accepted command, in acceptance order.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Total millimeters of travel per motor across all accepted lines.
    pub fn travel_per_motor(&self, steps_per_mm: &[f64; motion::MOTORS]) -> [f64; motion::MOTORS] {
        let mut travel = [0.0; motion::MOTORS];
        for entry in &self.trace {
            if let MotorCommand::Line { steps, .. } = entry.command {
                for i in 0..motion::MOTORS {
                    travel[i] += steps[i] / steps_per_mm[i];
                }
            }
        }
        travel
    }
}

impl<const CAP: usize> MotorQueue for FakeMotorQueue<CAP> {
    fn has_room(&self) -> bool {
        !self.queue.is_full()
    }

    fn queue_line(&mut self, steps: MotorSteps, microseconds: u32) {
        self.accept(MotorCommand::Line { steps, microseconds });
    }

    fn queue_dwell(&mut self, microseconds: u32) {
        self.accept(MotorCommand::Dwell { microseconds });
    }

    fn queue_stops(&mut self, directive: StopDirective) {
        self.accept(match directive {
            StopDirective::Start => MotorCommand::Start,
            StopDirective::Stop => MotorCommand::Stop,
            StopDirective::End => MotorCommand::End,
        });
    }
}

impl<const CAP: usize> StepperControl for FakeMotorQueue<CAP> {
    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_busy(&self) -> bool {
        self.running && !self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backpressure_tracks_capacity() {
        let mut queue: FakeMotorQueue<2> = FakeMotorQueue::new();
        assert!(queue.has_room());
        queue.queue_dwell(1000);
        queue.queue_dwell(2000);
        assert!(!queue.has_room());

        queue.drain(1);
        assert!(queue.has_room());
        assert_eq!(queue.executed(), &[MotorCommand::Dwell { microseconds: 1000 }]);
    }

    #[test]
    fn end_directive_stops_the_steppers() {
        let mut queue: FakeMotorQueue<4> = FakeMotorQueue::new();
        queue.queue_stops(StopDirective::End);
        assert!(queue.is_busy());
        queue.drain_all();
        assert!(!queue.is_busy());
    }
}
