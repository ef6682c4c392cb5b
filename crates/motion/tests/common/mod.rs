#![allow(dead_code)]

use std::collections::VecDeque;

use motion::{
    AxisVector, CartesianKinematics, DispatchOutcome, MotorQueue, MotorSteps, Planner,
    StepperControl, StopDirective,
};

/// One command accepted by the recording motor queue.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Command {
    Line { steps: MotorSteps, microseconds: u32 },
    Dwell { microseconds: u32 },
    Stops(StopDirective),
}

/// Test double for the motor queue: bounded like the real pulse buffer,
/// records everything it accepts.
pub struct RecordingQueue {
    capacity: usize,
    pub pending: VecDeque<Command>,
    pub executed: Vec<Command>,
}

impl RecordingQueue {
    pub fn bounded(capacity: usize) -> Self {
        Self {
            capacity,
            pending: VecDeque::new(),
            executed: Vec::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::bounded(usize::MAX)
    }

    /// Consume up to `count` pending commands, as the stepper ISR would.
    pub fn drain(&mut self, count: usize) {
        for _ in 0..count {
            match self.pending.pop_front() {
                Some(cmd) => self.executed.push(cmd),
                None => break,
            }
        }
    }

    pub fn drain_all(&mut self) {
        let pending = self.pending.len();
        self.drain(pending);
    }

    /// All accepted commands in order, executed first.
    pub fn commands(&self) -> Vec<Command> {
        self.executed.iter().chain(self.pending.iter()).copied().collect()
    }

    /// Just the line commands, in order.
    pub fn lines(&self) -> Vec<(MotorSteps, u32)> {
        self.commands()
            .into_iter()
            .filter_map(|cmd| match cmd {
                Command::Line { steps, microseconds } => Some((steps, microseconds)),
                _ => None,
            })
            .collect()
    }
}

impl MotorQueue for RecordingQueue {
    fn has_room(&self) -> bool {
        self.pending.len() < self.capacity
    }

    fn queue_line(&mut self, steps: MotorSteps, microseconds: u32) {
        self.pending.push_back(Command::Line { steps, microseconds });
    }

    fn queue_dwell(&mut self, microseconds: u32) {
        self.pending.push_back(Command::Dwell { microseconds });
    }

    fn queue_stops(&mut self, directive: StopDirective) {
        self.pending.push_back(Command::Stops(directive));
    }
}

/// Stepper subsystem stand-in.
#[derive(Debug, Default)]
pub struct FakeSteppers {
    pub running: bool,
}

impl StepperControl for FakeSteppers {
    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_busy(&self) -> bool {
        self.running
    }
}

/// Kinematics with 1 step/mm on every motor so emitted steps read as mm.
pub fn unit_kinematics() -> CartesianKinematics {
    CartesianKinematics { steps_per_mm: [1.0; 4] }
}

pub fn axis(x: f64, y: f64, z: f64) -> AxisVector {
    [x, y, z, 0.0, 0.0, 0.0]
}

/// Drive the dispatcher until the queue is empty, draining the motor queue
/// whenever the runner reports backpressure. Returns the dispatch count.
pub fn run_to_idle(
    planner: &mut Planner,
    kinematics: &CartesianKinematics,
    queue: &mut RecordingQueue,
) -> usize {
    let mut dispatches = 0;
    loop {
        match planner.dispatch(kinematics, queue) {
            DispatchOutcome::Idle => break,
            DispatchOutcome::Again => queue.drain(1),
            DispatchOutcome::Completed | DispatchOutcome::Fault => {}
        }
        dispatches += 1;
        assert!(dispatches < 200_000, "dispatcher failed to drain the queue");
    }
    dispatches
}
