//! Kinematics traits and implementations.

use crate::{AxisVector, MotorSteps, MOTORS};

/// A kinematic model translating cartesian travel into motor steps.
///
/// This is the inverse-kinematics seam between the planner and the motor
/// queue: a pure function from a relative travel vector (mm) to relative
/// step counts per motor channel. The move duration is passed through for
/// models that shape steps over time.
pub trait Kinematics {
    fn travel_to_steps(&self, travel: &AxisVector, microseconds: u32) -> MotorSteps;
}

/// Standard cartesian kinematics: the first [`MOTORS`] axes map one-to-one
/// onto the motor channels.
#[derive(Debug, Clone)]
pub struct CartesianKinematics {
    pub steps_per_mm: [f64; MOTORS],
}

impl Default for CartesianKinematics {
    fn default() -> Self {
        Self { steps_per_mm: [80.0; MOTORS] }
    }
}

impl Kinematics for CartesianKinematics {
    fn travel_to_steps(&self, travel: &AxisVector, _microseconds: u32) -> MotorSteps {
        let mut steps = [0.0; MOTORS];
        for i in 0..MOTORS {
            steps[i] = travel[i] * self.steps_per_mm[i];
        }
        steps
    }
}
