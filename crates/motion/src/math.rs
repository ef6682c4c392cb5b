//! Vector helpers and the jerk-limited motion relations.
//!
//! The acceleration and deceleration regions of a move obey a maximum-jerk
//! constraint. Two relations cover all region planning (see Ed Red's BYU
//! robotics course notes, ch. 5):
//!
//! * region length from a velocity change:
//!   `L = |Vf - Vi| * sqrt(|Vf - Vi| / Jm)`
//! * attainable velocity from a region length:
//!   `Vc = Jm^(1/3) * L^(2/3) + V`
//!
//! These are the constant-acceleration trapezoid relations with the jerk
//! limit folded in: the S-curve transition takes the same time as the
//! equivalent trapezoid, so moves are planned as trapezoids while the
//! runtime emits the S curve.

use crate::{AxisVector, AXES, ONE_MINUTE_OF_MICROSECONDS};

/// Cached jerk-derived scalars, recomputed only when the jerk limit changes.
#[derive(Debug, Clone, Copy)]
pub struct JerkTerms {
    /// Maximum linear jerk, mm/min^3.
    pub max: f64,
    /// Jm / 2, used by the segment velocity laws.
    pub div2: f64,
    /// Cube root of Jm, used by the velocity-from-length relation.
    pub cbrt: f64,
}

impl JerkTerms {
    pub fn new(linear_jerk_max: f64) -> Self {
        Self {
            max: linear_jerk_max,
            div2: linear_jerk_max / 2.0,
            cbrt: linear_jerk_max.cbrt(),
        }
    }
}

/// Length of an axis vector between two absolute positions.
pub fn vector_length(target: &AxisVector, position: &AxisVector) -> f64 {
    let mut length = 0.0;
    for i in 0..AXES {
        length += (target[i] - position[i]).powi(2);
    }
    length.sqrt()
}

/// Per-axis direction cosines from `position` toward `target`.
///
/// The distance between the two points must be non-zero.
pub fn unit_vector(target: &AxisVector, position: &AxisVector) -> AxisVector {
    let length = vector_length(target, position);
    let mut unit = [0.0; AXES];
    for i in 0..AXES {
        unit[i] = (target[i] - position[i]) / length;
    }
    unit
}

/// Distance required to change velocity from `vi` to `vf` at maximum jerk.
pub fn brake_length(vi: f64, vf: f64, jerk: &JerkTerms) -> f64 {
    let delta_v = (vf - vi).abs();
    delta_v * (delta_v / jerk.max).sqrt()
}

/// Highest velocity reachable from `v` over a region of length `len` at
/// maximum jerk. Inverse of [`brake_length`].
pub fn attainable_velocity(v: f64, len: f64, jerk: &JerkTerms) -> f64 {
    jerk.cbrt * len.powf(2.0 / 3.0) + v
}

/// Angular jerk factor for the junction between two unit direction vectors.
///
/// Returns the cosine of half the join angle: 1 for a straight-through
/// join, 0 for a 180 degree reversal. Junction velocity is scaled by this
/// factor to bound the cornering jerk.
pub fn angular_jerk_factor(unit_a: &AxisVector, unit_b: &AxisVector) -> f64 {
    let mut cosine = 0.0;
    for i in 0..AXES {
        cosine += unit_a[i] * unit_b[i];
    }
    // the dot product of two unit vectors can drift past +/-1 in the last bit
    (cosine.clamp(-1.0, 1.0).acos() / 2.0).cos()
}

/// Convert planner minutes to integer microseconds for the motor queue.
pub fn usec(minutes: f64) -> u32 {
    (minutes * ONE_MINUTE_OF_MICROSECONDS).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(v: [f64; 3]) -> AxisVector {
        [v[0], v[1], v[2], 0.0, 0.0, 0.0]
    }

    #[test]
    fn unit_vector_is_normalized() {
        let unit = unit_vector(&axis([3.0, 4.0, 0.0]), &axis([0.0, 0.0, 0.0]));
        assert!((vector_length(&unit, &[0.0; AXES]) - 1.0).abs() < 1e-12);
        assert!((unit[0] - 0.6).abs() < 1e-12);
        assert!((unit[1] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn length_velocity_relations_invert() {
        let jerk = JerkTerms::new(50_000_000.0);
        let len = brake_length(200.0, 900.0, &jerk);
        let back = attainable_velocity(200.0, len, &jerk);
        assert!((back - 900.0).abs() < 1e-6, "round trip gave {back}");
    }

    #[test]
    fn angular_jerk_factor_bounds() {
        let fwd = axis([1.0, 0.0, 0.0]);
        let rev = axis([-1.0, 0.0, 0.0]);
        let orth = axis([0.0, 1.0, 0.0]);
        assert!((angular_jerk_factor(&fwd, &fwd) - 1.0).abs() < 1e-12);
        assert!(angular_jerk_factor(&fwd, &rev).abs() < 1e-7);
        let right_angle = angular_jerk_factor(&fwd, &orth);
        assert!((right_angle - (std::f64::consts::FRAC_PI_4).cos()).abs() < 1e-12);
    }

    #[test]
    fn usec_rounds_to_integer_microseconds() {
        assert_eq!(usec(1.0), 60_000_000);
        assert_eq!(usec(0.1), 6_000_000);
        assert_eq!(usec(1.0 / ONE_MINUTE_OF_MICROSECONDS), 1);
    }
}
