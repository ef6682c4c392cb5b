//! Planner configuration.

/// Path control mode in effect when a new `aline` is planned.
///
/// Continuous mode joins moves at the highest velocity the cornering jerk
/// allows; exact-stop mode forces every junction to zero velocity. A move is
/// downgraded to exact stop automatically when there is nothing queued ahead
/// of it to join to.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub enum PathMode {
    #[default]
    Continuous,
    ExactPath,
    ExactStop,
}

/// Machine limits and planning floors consumed by the planner.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde-support", derive(serde::Serialize, serde::Deserialize))]
pub struct PlannerConfig {
    /// Maximum permitted linear jerk, in mm/min^3.
    pub linear_jerk_max: f64,
    /// Arc chord length floor, in mm. Arcs are rendered as chords of at
    /// least this length.
    pub min_segment_len: f64,
    /// Acceleration/deceleration segment time floor, in microseconds.
    /// Around 10 ms gives fine velocity resolution while keeping enough
    /// steps per segment that slow moves stay smooth.
    pub min_segment_time_us: f64,
    /// Shortest line the planner will accept, in mm. Shorter region splits
    /// are folded away.
    pub min_line_length: f64,
    /// Comparison tolerance for velocities (mm/min) and lengths (mm).
    pub epsilon: f64,
    /// Path control mode requested by the machine above.
    pub path_mode: PathMode,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            linear_jerk_max: 50_000_000.0,
            min_segment_len: 0.05,
            min_segment_time_us: 10_000.0,
            min_line_length: 0.03,
            epsilon: 1e-4,
            path_mode: PathMode::Continuous,
        }
    }
}
