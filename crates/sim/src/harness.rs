//! Simulation harness: a planner wired to the fake motor queue.
//!
//! Drives the dispatcher the way the outer controller loop would and
//! captures the accepted command trace for analysis and CI validation.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Result};
use motion::{CartesianKinematics, DispatchOutcome, Planner, PlannerConfig};
use serde::Serialize;
use tracing::info;

use crate::fake_motor_queue::{FakeMotorQueue, TraceEntry};

/// Safety fuse for [`SimMachine::run_until_idle`].
const MAX_DISPATCHES: usize = 1_000_000;

/// Counters from one drain of the move queue.
#[derive(Debug, Default, Copy, Clone)]
pub struct RunStats {
    /// Dispatcher invocations.
    pub dispatches: usize,
    /// Moves that ran to completion.
    pub completed: usize,
    /// Dispatches that suspended on motor-queue backpressure.
    pub suspensions: usize,
}

#[derive(Serialize)]
struct TraceFile<'a> {
    config: &'a PlannerConfig,
    entries: &'a [TraceEntry],
}

/// A planner, a kinematic model and a fake motor queue, run in-process.
pub struct SimMachine<const CAP: usize = 16> {
    pub planner: Planner,
    pub kinematics: CartesianKinematics,
    pub motors: FakeMotorQueue<CAP>,
}

impl<const CAP: usize> SimMachine<CAP> {
    pub fn new(config: PlannerConfig) -> Self {
        Self::with_kinematics(config, CartesianKinematics::default())
    }

    pub fn with_kinematics(config: PlannerConfig, kinematics: CartesianKinematics) -> Self {
        Self {
            planner: Planner::new(config),
            kinematics,
            motors: FakeMotorQueue::new(),
        }
    }

    /// Make room for an `aline` by running queued moves, as the controller
    /// loop does while the parser is ahead of the machine.
    pub fn make_room_for_aline(&mut self) -> Result<()> {
        let mut dispatches = 0;
        while !self.planner.can_accept_aline() {
            if self.planner.dispatch(&self.kinematics, &mut self.motors) == DispatchOutcome::Again {
                self.motors.drain(1);
            }
            dispatches += 1;
            if dispatches > MAX_DISPATCHES {
                bail!("planner failed to free aline capacity");
            }
        }
        Ok(())
    }

    /// Drive the dispatcher until the move queue is empty, draining the
    /// motor queue whenever a runner suspends on backpressure.
    pub fn run_until_idle(&mut self) -> Result<RunStats> {
        let mut stats = RunStats::default();
        loop {
            match self.planner.dispatch(&self.kinematics, &mut self.motors) {
                DispatchOutcome::Idle => break,
                DispatchOutcome::Again => {
                    stats.suspensions += 1;
                    self.motors.drain(1);
                }
                DispatchOutcome::Completed => stats.completed += 1,
                DispatchOutcome::Fault => bail!("runner faulted"),
            }
            stats.dispatches += 1;
            if stats.dispatches > MAX_DISPATCHES {
                bail!("dispatcher failed to drain the move queue");
            }
        }
        self.motors.drain_all();
        info!(
            dispatches = stats.dispatches,
            completed = stats.completed,
            "simulation drained"
        );
        Ok(stats)
    }

    /// Dump the accepted command trace, with the planner config, as JSON.
    pub fn dump_trace(&self, path: &Path) -> Result<()> {
        info!(path = %path.display(), "dumping trace file");
        let trace = TraceFile {
            config: self.planner.config(),
            entries: self.motors.trace(),
        };
        let mut file = File::create(path)?;
        file.write_all(serde_json::to_string_pretty(&trace)?.as_bytes())?;
        Ok(())
    }

    /// Number of line commands accepted so far.
    pub fn emitted_lines(&self) -> usize {
        self.motors
            .trace()
            .iter()
            .filter(|entry| matches!(entry.command, crate::MotorCommand::Line { .. }))
            .count()
    }
}
