//! Move execution: the cooperative dispatcher and the per-type runners.
//!
//! Runners are non-blocking continuations. Each dispatch call makes at most
//! one unit of progress (typically one motor-queue line) and either
//! completes the sub-move or reports `Again` so the outer controller loop
//! can interleave other work. Re-entry is driven by the buffer's
//! [`MoveState`]; runners never spin or sleep, and suspend whenever the
//! downstream motor queue has no room.
//!
//! Acceleration and deceleration regions execute as a train of fixed-time
//! segments tracing the S curve: a concave and a convex half, each cut into
//! `segments` slices, with one closing line at the exact endpoint to null
//! out accumulated rounding error.

use std::sync::atomic::Ordering;

use tracing::warn;

use crate::buffer::{MoveState, MoveType};
use crate::error::{DispatchOutcome, RunStatus};
use crate::math::{usec, vector_length};
use crate::motor::{MotorQueue, StopDirective};
use crate::planner::Planner;
use crate::{AxisVector, Kinematics, AXES, ONE_MINUTE_OF_MICROSECONDS};

/// Runtime-frame cursor: position and per-segment state of the move being
/// executed. Positions update as segments are queued, ahead of the motors.
#[derive(Debug, Default)]
pub(crate) struct MoveRuntime {
    pub position: AxisVector,
    pub target: AxisVector,

    pub length: f64,
    /// Total running time of the current sub-move, minutes.
    pub time: f64,
    /// Duration of the current line or segment, integer microseconds.
    pub microseconds: u32,
    /// Time into the current half, incremented per segment.
    pub elapsed_time: f64,
    pub midpoint_velocity: f64,
    pub midpoint_acceleration: f64,

    /// Segments per half (accel/decel) or per arc.
    pub segments: f64,
    pub segment_count: u32,
    pub segment_time: f64,
    pub segment_velocity: f64,
    pub segment_theta: f64,
    pub segment_length: f64,
    /// Arc center along the first and second plane axes.
    pub center_1: f64,
    pub center_2: f64,
}

impl Planner {
    /// Dequeue and execute moves: the continuation driven by the outer
    /// controller loop. Routes the current run buffer to its runner,
    /// surfaces `Again` untouched, and recycles the buffer on completion.
    pub fn dispatch(
        &mut self,
        kinematics: &dyn Kinematics,
        motors: &mut dyn MotorQueue,
    ) -> DispatchOutcome {
        let Some(ix) = self.pool.get_run_buffer() else {
            return DispatchOutcome::Idle;
        };
        if self.pool.get(ix).move_state == MoveState::New {
            self.run_flag.store(true, Ordering::Relaxed);
        }
        let status = match self.pool.get(ix).move_type {
            MoveType::Null => self.run_null(ix),
            MoveType::Accel => self.run_transition(ix, kinematics, motors, 1.0),
            MoveType::Cruise => self.run_cruise(ix, kinematics, motors),
            MoveType::Decel => self.run_transition(ix, kinematics, motors, -1.0),
            MoveType::Line => self.run_line(ix, kinematics, motors),
            MoveType::Arc => self.run_arc(ix, kinematics, motors),
            MoveType::Dwell => self.run_dwell(ix, motors),
            MoveType::Start | MoveType::Stop | MoveType::End => self.run_stops(ix, motors),
        };
        match status {
            RunStatus::Again => DispatchOutcome::Again,
            RunStatus::Done => {
                self.run_flag.store(false, Ordering::Relaxed);
                self.pool.finalize_run_buffer();
                DispatchOutcome::Completed
            }
            RunStatus::Fault => {
                self.run_flag.store(false, Ordering::Relaxed);
                self.pool.finalize_run_buffer();
                DispatchOutcome::Fault
            }
        }
    }

    /// Remove a null region from the queue.
    fn run_null(&mut self, ix: usize) -> RunStatus {
        self.pool.get_mut(ix).replannable = false;
        RunStatus::Done
    }

    /// Pass a queued stop/start/end directive through to the motor queue.
    fn run_stops(&mut self, ix: usize, motors: &mut dyn MotorQueue) -> RunStatus {
        if !motors.has_room() {
            return RunStatus::Again;
        }
        let directive = match self.pool.get(ix).move_type {
            MoveType::Start => StopDirective::Start,
            MoveType::Stop => StopDirective::Stop,
            _ => StopDirective::End,
        };
        motors.queue_stops(directive);
        RunStatus::Done
    }

    fn run_dwell(&mut self, ix: usize, motors: &mut dyn MotorQueue) -> RunStatus {
        if !motors.has_room() {
            return RunStatus::Again;
        }
        // dwell time is carried in seconds
        motors.queue_dwell((self.pool.get(ix).time * 1_000_000.0).round() as u32);
        RunStatus::Done
    }

    /// Load a simple line into the motor queue in one shot.
    fn run_line(
        &mut self,
        ix: usize,
        kinematics: &dyn Kinematics,
        motors: &mut dyn MotorQueue,
    ) -> RunStatus {
        if !motors.has_room() {
            return RunStatus::Again;
        }
        let bf = *self.pool.get(ix);
        let mut travel = [0.0; AXES];
        for i in 0..AXES {
            travel[i] = bf.target[i] - self.mr.position[i];
        }
        self.mr.microseconds = usec(bf.time);
        let steps = kinematics.travel_to_steps(&travel, self.mr.microseconds);
        motors.queue_line(steps, self.mr.microseconds);
        self.mr.position = bf.target;
        RunStatus::Done
    }

    /// Generate an arc as a train of short chords, one per dispatch call.
    fn run_arc(
        &mut self,
        ix: usize,
        kinematics: &dyn Kinematics,
        motors: &mut dyn MotorQueue,
    ) -> RunStatus {
        if !motors.has_room() {
            return RunStatus::Again;
        }
        if self.pool.get(ix).move_state == MoveState::New {
            let bf = *self.pool.get(ix);
            self.mr.segments = (bf.length / self.cfg.min_segment_len).ceil();
            self.mr.segment_count = self.mr.segments as u32;
            self.mr.segment_theta = bf.arc.angular_travel / self.mr.segments;
            self.mr.segment_length = bf.arc.linear_travel / self.mr.segments;
            self.mr.microseconds = usec(bf.time / self.mr.segments);
            self.mr.center_1 =
                self.mr.position[bf.arc.axis_1] - bf.arc.theta.sin() * bf.arc.radius;
            self.mr.center_2 =
                self.mr.position[bf.arc.axis_2] - bf.arc.theta.cos() * bf.arc.radius;
            // off-plane axes do not move during the arc
            self.mr.target = self.mr.position;
            self.pool.get_mut(ix).move_state = MoveState::Running1;
        }
        if self.pool.get(ix).move_state == MoveState::Running1 {
            let theta = {
                let bf = self.pool.get_mut(ix);
                bf.arc.theta += self.mr.segment_theta;
                bf.arc.theta
            };
            let arc = self.pool.get(ix).arc;
            self.mr.target[arc.axis_1] = self.mr.center_1 + theta.sin() * arc.radius;
            self.mr.target[arc.axis_2] = self.mr.center_2 + theta.cos() * arc.radius;
            self.mr.target[arc.axis_linear] += self.mr.segment_length;

            let mut travel = [0.0; AXES];
            for i in 0..AXES {
                travel[i] = self.mr.target[i] - self.mr.position[i];
            }
            let steps = kinematics.travel_to_steps(&travel, self.mr.microseconds);
            motors.queue_line(steps, self.mr.microseconds);
            self.mr.position = self.mr.target;
            self.mr.segment_count -= 1;
            if self.mr.segment_count > 0 {
                return RunStatus::Again;
            }
        }
        RunStatus::Done
    }

    /// Run a cruise region: one constant-velocity line.
    fn run_cruise(
        &mut self,
        ix: usize,
        kinematics: &dyn Kinematics,
        motors: &mut dyn MotorQueue,
    ) -> RunStatus {
        if !motors.has_room() {
            return RunStatus::Again;
        }
        self.pool.get_mut(ix).replannable = false;
        let bf = *self.pool.get(ix);
        // a zero-velocity cruise would never finish; toss it
        if bf.length < self.cfg.min_line_length || bf.end_velocity < self.cfg.epsilon {
            return RunStatus::Done;
        }
        self.mr.time = bf.length / bf.end_velocity;
        self.mr.microseconds = usec(self.mr.time);

        self.mr.target = bf.target;
        let mut segment_target = [0.0; AXES];
        let mut travel = [0.0; AXES];
        for i in 0..AXES {
            segment_target[i] = self.mr.position[i] + bf.unit_vec[i] * bf.length;
            travel[i] = segment_target[i] - self.mr.position[i];
        }
        let steps = kinematics.travel_to_steps(&travel, self.mr.microseconds);
        motors.queue_line(steps, self.mr.microseconds);
        self.mr.position = segment_target;
        RunStatus::Done
    }

    /// Run an acceleration (`direction = 1.0`) or deceleration
    /// (`direction = -1.0`) region as two halves of fixed-time segments.
    ///
    /// For acceleration the first half is the concave portion of the S
    /// curve and the second convex; deceleration mirrors both.
    fn run_transition(
        &mut self,
        ix: usize,
        kinematics: &dyn Kinematics,
        motors: &mut dyn MotorQueue,
        direction: f64,
    ) -> RunStatus {
        if !motors.has_room() {
            return RunStatus::Again;
        }
        if self.pool.get(ix).move_state == MoveState::New {
            self.pool.get_mut(ix).replannable = false;
            let bf = *self.pool.get(ix);
            if bf.length < self.cfg.min_line_length {
                return RunStatus::Done;
            }
            self.mr.midpoint_velocity = (bf.start_velocity + bf.end_velocity) / 2.0;
            if self.mr.midpoint_velocity < self.cfg.epsilon {
                warn!(
                    start = bf.start_velocity,
                    end = bf.end_velocity,
                    "transition region has zero midpoint velocity"
                );
                return RunStatus::Done;
            }
            self.mr.time = bf.length / self.mr.midpoint_velocity;
            self.mr.midpoint_acceleration = self.mr.time * self.mm.jerk.div2;
            self.mr.target = bf.target;
            // number of segments in *each half*
            self.mr.segments = ((ONE_MINUTE_OF_MICROSECONDS * self.mr.time
                / self.cfg.min_segment_time_us)
                .round()
                / 2.0)
                .round();
            if self.mr.segments as u32 == 0 {
                warn!(length = bf.length, "transition too short to segment");
                return RunStatus::Done;
            }
            self.mr.segment_time = self.mr.time / (2.0 * self.mr.segments);
            self.mr.elapsed_time = self.mr.segment_time / 2.0; // position from segment midpoint
            self.mr.microseconds = usec(self.mr.segment_time);
            self.mr.segment_count = self.mr.segments as u32;
            self.pool.get_mut(ix).move_state = MoveState::Running1;
        }
        // first half
        if self.pool.get(ix).move_state == MoveState::Running1 {
            let bf = *self.pool.get(ix);
            self.mr.segment_velocity = bf.start_velocity
                + direction * self.mm.jerk.div2 * self.mr.elapsed_time.powi(2);
            if self.run_segment(ix, kinematics, motors) == RunStatus::Again {
                return RunStatus::Again;
            }
            // set up the second half
            self.mr.segment_count = self.mr.segments as u32;
            self.mr.elapsed_time = self.mr.segment_time / 2.0;
            self.pool.get_mut(ix).move_state = MoveState::Running2;
            return RunStatus::Again; // no guarantee of another motor buffer
        }
        // second half
        if self.pool.get(ix).move_state == MoveState::Running2 {
            if self.mr.segment_count > 1 {
                self.mr.segment_velocity = self.mr.midpoint_velocity
                    + direction
                        * (self.mr.elapsed_time * self.mr.midpoint_acceleration
                            - self.mm.jerk.div2 * self.mr.elapsed_time.powi(2));
                return self.run_segment(ix, kinematics, motors);
            }
            self.run_finalize(ix, kinematics, motors);
            return RunStatus::Done;
        }
        RunStatus::Fault
    }

    /// Emit one fixed-time segment at the current segment velocity.
    fn run_segment(
        &mut self,
        ix: usize,
        kinematics: &dyn Kinematics,
        motors: &mut dyn MotorQueue,
    ) -> RunStatus {
        let bf = *self.pool.get(ix);
        let mut segment_target = [0.0; AXES];
        let mut travel = [0.0; AXES];
        for i in 0..AXES {
            segment_target[i] = self.mr.position[i]
                + bf.unit_vec[i] * self.mr.segment_velocity * self.mr.segment_time;
            travel[i] = segment_target[i] - self.mr.position[i];
        }
        let steps = kinematics.travel_to_steps(&travel, self.mr.microseconds);
        motors.queue_line(steps, self.mr.microseconds);
        self.mr.elapsed_time += self.mr.segment_time;
        self.mr.position = segment_target;
        self.mr.segment_count -= 1;
        if self.mr.segment_count > 0 {
            RunStatus::Again
        } else {
            RunStatus::Done
        }
    }

    /// Close the region with one line to the analytic endpoint, so the
    /// runtime position matches the planned endpoint exactly.
    fn run_finalize(
        &mut self,
        ix: usize,
        kinematics: &dyn Kinematics,
        motors: &mut dyn MotorQueue,
    ) {
        let bf = *self.pool.get(ix);
        self.mr.length = vector_length(&self.mr.target, &self.mr.position);
        if self.mr.length < self.cfg.min_line_length || bf.end_velocity < self.cfg.epsilon {
            return;
        }
        self.mr.time = self.mr.length / bf.end_velocity;
        self.mr.microseconds = usec(self.mr.time);

        let mut travel = [0.0; AXES];
        for i in 0..AXES {
            travel[i] = self.mr.target[i] - self.mr.position[i];
        }
        let steps = kinematics.travel_to_steps(&travel, self.mr.microseconds);
        motors.queue_line(steps, self.mr.microseconds);
        self.mr.position = self.mr.target;
    }
}
