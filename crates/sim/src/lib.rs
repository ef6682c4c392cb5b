//! # In-Process Simulation Harness
//!
//! A deterministic simulation environment for exercising the motion planner
//! without hardware. [`FakeMotorQueue`] stands in for the bounded motor
//! buffer and the stepper subsystem, recording every command it accepts so
//! tests and CI can validate the emitted pulse trains. [`SimMachine`] wires
//! a planner, a kinematic model and the fake queue together and drives the
//! dispatcher the way the controller loop would.

pub mod fake_motor_queue;
pub mod harness;

pub use fake_motor_queue::{FakeMotorQueue, MotorCommand, TraceEntry};
pub use harness::{RunStats, SimMachine};
