//! The trajectory planner: move producers and the jerk-limited region
//! solver with backward replanning.
//!
//! An `aline` is divided into three regions:
//!
//! * head - acceleration to the target velocity,
//! * body - the bulk of the move at target velocity,
//! * tail - deceleration to the exit velocity.
//!
//! The tail is always planned as an exact-stop tail so that the machine can
//! brake to zero if no further move arrives. When a following line does
//! arrive, the moves before it are recomputed backwards ("backplanned") to
//! blend with it, raising junction velocities to the highest value the
//! cornering jerk allows while the chain stays brakeable.
//!
//! For planning purposes regions behave as trapezoids: the jerk-limited
//! S-curve transitions take the same time as their constant-acceleration
//! equivalents, so only the runtime (see `runtime`) deals in S curves.

use std::sync::atomic::AtomicBool;

use tracing::{debug, error, warn};

use crate::buffer::{BufferPool, BufferState, MoveType};
use crate::config::{PathMode, PlannerConfig};
use crate::error::PlannerError;
use crate::math::{
    angular_jerk_factor, attainable_velocity, brake_length, unit_vector, vector_length, JerkTerms,
};
use crate::runtime::MoveRuntime;
use crate::{AxisVector, AXES, MAX_LOOKBACK_DEPTH};

/// Iteration cap for the head/tail convergence loop.
const MAX_REGION_ITERATIONS: usize = 100;

/// Planning-frame cursor: where the machine will be once everything queued
/// so far has executed, plus the jerk scalars for the current move.
#[derive(Debug)]
pub(crate) struct MoveMaster {
    pub position: AxisVector,
    pub target: AxisVector,
    pub unit_vec: AxisVector,
    pub jerk: JerkTerms,
}

/// Scratch structure used to compute or recompute the three regions of a
/// move. Holds both the requested and the achieved velocities; buffer
/// indices are valid only after the plan has been queued or reconstructed.
#[derive(Debug, Default, Copy, Clone)]
struct MovePlan {
    path_mode: PathMode,

    head: usize,
    body: usize,
    tail: usize,

    length: f64,
    head_length: f64,
    body_length: f64,
    tail_length: f64,

    /// Requested initial velocity (Vir).
    initial_velocity_req: f64,
    /// Actual initial velocity, which may be Vir or less.
    initial_velocity: f64,
    /// Requested target velocity (Vt).
    target_velocity: f64,
    /// Actual achieved cruise velocity, which may be Vt or less.
    cruise_velocity: f64,
    /// Actual exit velocity.
    final_velocity: f64,
}

/// The cartesian trajectory planner.
///
/// Owns the move buffer ring, the planning cursor and the runtime cursor.
/// All state lives here; independent instances do not interact, which keeps
/// the module testable. The planner is single-threaded and cooperative:
/// producers and [`Planner::dispatch`] share one execution context, and
/// only the interrupt-driven consumer of the motor queue runs concurrently.
#[derive(Debug)]
pub struct Planner {
    pub(crate) cfg: PlannerConfig,
    pub(crate) pool: BufferPool,
    pub(crate) mm: MoveMaster,
    pub(crate) mr: MoveRuntime,
    /// True while a move is being executed. Read by [`Planner::is_busy`],
    /// possibly from another observer; a word-sized atomic keeps the read
    /// coherent.
    pub(crate) run_flag: AtomicBool,
}

impl Planner {
    pub fn new(cfg: PlannerConfig) -> Self {
        let jerk = JerkTerms::new(cfg.linear_jerk_max);
        Self {
            cfg,
            pool: BufferPool::new(),
            mm: MoveMaster {
                position: [0.0; AXES],
                target: [0.0; AXES],
                unit_vec: [0.0; AXES],
                jerk,
            },
            mr: MoveRuntime::default(),
            run_flag: AtomicBool::new(false),
        }
    }

    /// Drop all queued moves and return both position cursors to zero, as
    /// after power-up. Used by [`Planner::async_end`].
    pub fn reset(&mut self) {
        *self = Self::new(self.cfg.clone());
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.cfg
    }

    /// Read access to the buffer ring, mainly for tests and diagnostics.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Where planning will continue from: the endpoint of everything queued.
    pub fn planned_position(&self) -> &AxisVector {
        &self.mm.position
    }

    /// Endpoint of everything already handed to the motor queue. Note that
    /// the motors lag this: positions update as soon as they are computed.
    pub fn runtime_position(&self) -> &AxisVector {
        &self.mr.position
    }

    /// Path control mode applied to subsequent `aline` calls.
    pub fn set_path_mode(&mut self, mode: PathMode) {
        self.cfg.path_mode = mode;
    }

    /// True when an `aline` can be queued without violating the capacity
    /// contract (three free write buffers).
    pub fn can_accept_aline(&self) -> bool {
        self.pool.check_write_buffers(3)
    }

    /// Absolute position teleport (G92 support). Updates both the planning
    /// and the runtime cursor.
    pub fn set_position(&mut self, position: &AxisVector) {
        self.mm.position = *position;
        self.mr.position = *position;
    }

    /// Queue a simple linear move with no accel/decel management.
    ///
    /// Feed rate has already been converted to a duration in minutes.
    pub fn line(&mut self, target: &AxisVector, minutes: f64) -> Result<(), PlannerError> {
        if minutes < self.cfg.epsilon {
            return Err(PlannerError::ZeroLengthMove);
        }
        let Some(ix) = self.pool.get_write_buffer() else {
            warn!("no write buffer available for line");
            return Err(PlannerError::BufferFull);
        };
        let length = vector_length(target, &self.mr.position);
        if length < self.cfg.min_line_length {
            self.pool.unget_write_buffer();
            return Err(PlannerError::ZeroLengthMove);
        }
        let bf = self.pool.get_mut(ix);
        bf.time = minutes;
        bf.target = *target;
        bf.length = length;
        bf.request_velocity = length / minutes;
        self.pool.queue_write_buffer(MoveType::Line);
        self.mm.position = *target;
        Ok(())
    }

    /// Queue a dwell. Dwells ride through the motor queue so they execute
    /// in order; the stepper side times them without emitting pulses.
    pub fn dwell(&mut self, seconds: f64) -> Result<(), PlannerError> {
        let Some(ix) = self.pool.get_write_buffer() else {
            warn!("no write buffer available for dwell");
            return Err(PlannerError::BufferFull);
        };
        self.pool.get_mut(ix).time = seconds;
        self.pool.queue_write_buffer(MoveType::Dwell);
        Ok(())
    }

    /// Queue a motor stop, ordered within the move queue.
    pub fn queued_stop(&mut self) -> Result<(), PlannerError> {
        self.queue_directive(MoveType::Stop)
    }

    /// Queue a motor (re)start, ordered within the move queue.
    pub fn queued_start(&mut self) -> Result<(), PlannerError> {
        self.queue_directive(MoveType::Start)
    }

    /// Queue an end-of-program: stop motion once the current block
    /// completes. The directive itself does not re-initialize queued
    /// planner state; a full reset is [`Planner::async_end`]'s job.
    pub fn queued_end(&mut self) -> Result<(), PlannerError> {
        self.queue_directive(MoveType::End)
    }

    fn queue_directive(&mut self, move_type: MoveType) -> Result<(), PlannerError> {
        if self.pool.get_write_buffer().is_none() {
            warn!(?move_type, "no write buffer available for control directive");
            return Err(PlannerError::BufferFull);
        }
        self.pool.queue_write_buffer(move_type);
        Ok(())
    }

    /// Stop current motion immediately. Safe from ISR context.
    pub fn async_stop(&self, steppers: &mut dyn crate::StepperControl) {
        steppers.stop();
    }

    /// (Re)start motion immediately. Safe from ISR context.
    pub fn async_start(&self, steppers: &mut dyn crate::StepperControl) {
        steppers.start();
    }

    /// Stop immediately and re-initialize the planner.
    pub fn async_end(&mut self, steppers: &mut dyn crate::StepperControl) {
        steppers.stop();
        self.reset();
    }

    /// True while the machine is moving. Waiting for this to go false
    /// synchronizes a caller with queue drain.
    pub fn is_busy(&self, steppers: &dyn crate::StepperControl) -> bool {
        steppers.is_busy() || self.run_flag.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Set up and queue an arc move. The arc is rendered at runtime as a
    /// series of short chords; see `runtime`.
    ///
    /// `theta` is the starting angle on the circle, `angular_travel` the
    /// signed radians along the arc (+CW, -CCW) and `linear_travel` the
    /// travel along the transverse axis for helical motion.
    #[allow(clippy::too_many_arguments)]
    pub fn arc(
        &mut self,
        target: &AxisVector,
        i: f64,
        j: f64,
        k: f64,
        theta: f64,
        radius: f64,
        angular_travel: f64,
        linear_travel: f64,
        axis_1: usize,
        axis_2: usize,
        axis_linear: usize,
        minutes: f64,
    ) -> Result<(), PlannerError> {
        let Some(ix) = self.pool.get_write_buffer() else {
            warn!("no write buffer available for arc");
            return Err(PlannerError::BufferFull);
        };
        // total travel of the helix (or just the arc)
        let length = (angular_travel * radius).hypot(linear_travel.abs());
        if length < self.cfg.min_segment_len {
            self.pool.unget_write_buffer();
            return Err(PlannerError::ZeroLengthMove);
        }
        debug!(i, j, k, length, "arc enqueued");

        let bf = self.pool.get_mut(ix);
        bf.target = *target;
        bf.length = length;
        bf.time = minutes;
        bf.arc.theta = theta;
        bf.arc.radius = radius;
        bf.arc.angular_travel = angular_travel;
        bf.arc.linear_travel = linear_travel;
        bf.arc.axis_1 = axis_1;
        bf.arc.axis_2 = axis_2;
        bf.arc.axis_linear = axis_linear;
        bf.start_velocity = length / minutes; // for trajectory planning
        bf.end_velocity = bf.start_velocity;

        self.mm.position = *target;
        self.pool.queue_write_buffer(MoveType::Arc);
        Ok(())
    }

    /// Queue a linear move with jerk-limited acceleration and deceleration.
    ///
    /// Commits up to three region buffers; the caller must have verified
    /// [`Planner::can_accept_aline`] or this can fail fatally. After
    /// queueing, earlier moves are backplanned to blend with this one.
    pub fn aline(&mut self, target: &AxisVector, minutes: f64) -> Result<(), PlannerError> {
        if minutes < self.cfg.epsilon {
            return Err(PlannerError::ZeroLengthMove);
        }
        let mut m = MovePlan::default();
        self.mm.target = *target;
        m.length = vector_length(&self.mm.target, &self.mm.position);
        if m.length < self.cfg.min_line_length {
            return Err(PlannerError::ZeroLengthMove);
        }
        m.target_velocity = m.length / minutes;
        self.mm.unit_vec = unit_vector(&self.mm.target, &self.mm.position);
        self.mm.jerk = JerkTerms::new(self.cfg.linear_jerk_max);

        let prev_ix = self.pool.prev_buffer_implicit();
        let prev = *self.pool.get(prev_ix);

        // a queued or running arc ahead of us: join at the arc's exit
        // velocity, with no angular-jerk correction and no backplanning
        if prev.move_type == MoveType::Arc && prev.state != BufferState::Empty {
            m.initial_velocity_req = prev.end_velocity;
            let (vir, vt) = (m.initial_velocity_req, m.target_velocity);
            self.compute_regions(&mut m, vir, vt, 0.0);
            self.queue_move(&mut m)?;
            return Ok(());
        }

        m.path_mode = self.cfg.path_mode;
        if prev.state != BufferState::Queued {
            // empty queue, or the previous move already committed to stop:
            // this move must start from standstill
            m.path_mode = PathMode::ExactStop;
            m.initial_velocity_req = 0.0;
        } else {
            let factor = angular_jerk_factor(&self.mm.unit_vec, &prev.unit_vec);
            m.initial_velocity_req = (prev.request_velocity * factor).min(m.target_velocity);
        }

        let (vir, vt) = (m.initial_velocity_req, m.target_velocity);
        if self.compute_regions(&mut m, vir, vt, 0.0) == 0 {
            return Ok(()); // line too short to plan
        }
        self.queue_move(&mut m)?;
        self.backplan(m);
        Ok(())
    }

    /// Compute the region lengths and velocity contour for a move.
    ///
    /// Inputs are the requested initial velocity `vir`, the requested
    /// target velocity `vt` and the required final velocity `vf`; `m.length`
    /// must already be set. On return `m` holds the achieved initial and
    /// cruise velocities and the three region lengths. Returns the number
    /// of regions (0-3):
    ///
    /// * 3 - length supports an optimal head, body and tail (sub-minimum
    ///   heads or tails are folded into the body),
    /// * 2 - head and tail join directly at a reduced cruise velocity,
    /// * 1 - a single region: pure tail (`vf` unreachable downward), pure
    ///   head (`vf` unreachable upward), or pure body (all velocities equal),
    /// * 0 - too short to plan at all.
    fn compute_regions(&self, m: &mut MovePlan, vir: f64, vt: f64, vf: f64) -> usize {
        let eps = self.cfg.epsilon;
        let jerk = &self.mm.jerk;

        m.initial_velocity_req = vir;
        m.initial_velocity = vir;
        m.target_velocity = vt;
        m.cruise_velocity = vt;
        m.final_velocity = vf;
        m.head_length = 0.0;
        m.body_length = 0.0;
        m.tail_length = 0.0;

        if m.length < self.cfg.min_line_length {
            warn!(length = m.length, "line below minimum plannable length");
            return 0;
        }

        // optimal head and tail both fit
        m.head_length = brake_length(vir, vt, jerk);
        m.tail_length = brake_length(vt, vf, jerk);
        m.body_length = m.length - m.head_length - m.tail_length;
        if m.body_length > 0.0 {
            if m.head_length < self.cfg.min_line_length {
                m.body_length += m.head_length;
                m.head_length = 0.0;
            }
            if m.tail_length < self.cfg.min_line_length {
                m.body_length += m.tail_length;
                m.tail_length = 0.0;
            }
            return 3;
        }

        // single-region cases
        m.body_length = 0.0;
        if vf < vir && m.length < m.tail_length {
            // too short to brake from Vir: lower the entry velocity instead
            m.head_length = 0.0;
            m.tail_length = m.length;
            m.initial_velocity = attainable_velocity(vf, m.tail_length, jerk);
            m.cruise_velocity = m.initial_velocity;
            return 1;
        }
        if vf > vir && m.length < m.head_length {
            // too short to reach Vf: accelerate as far as the length allows
            m.head_length = m.length;
            m.tail_length = 0.0;
            m.initial_velocity = m.initial_velocity_req;
            m.cruise_velocity = attainable_velocity(vir, m.head_length, jerk);
            m.final_velocity = m.cruise_velocity;
            return 1;
        }
        if (vf - vir).abs() < eps && (vf - vt).abs() < eps {
            m.head_length = 0.0;
            m.tail_length = 0.0;
            m.body_length = m.length;
            return 1;
        }

        // no body fits: iterate head and tail against each other until the
        // split converges on a reduced cruise velocity
        let mut iterations = 0;
        loop {
            let delta_vh = (m.initial_velocity - m.cruise_velocity).abs();
            m.head_length =
                m.length * (delta_vh / (delta_vh + (m.cruise_velocity - m.final_velocity).abs()));
            m.cruise_velocity = attainable_velocity(m.initial_velocity, m.head_length, jerk);
            m.head_length = brake_length(m.cruise_velocity, m.initial_velocity, jerk);
            m.tail_length = brake_length(m.cruise_velocity, m.final_velocity, jerk);
            let previous_body = m.body_length;
            m.body_length = m.length - m.head_length - m.tail_length;
            iterations += 1;
            if iterations > MAX_REGION_ITERATIONS {
                warn!(residue = m.body_length, "head/tail split failed to converge");
                break;
            }
            if (previous_body - m.body_length).abs() <= eps {
                break;
            }
        }
        if m.body_length > 0.01 {
            warn!(residue = m.body_length, "head/tail split left a body residue");
        }
        m.body_length = 0.0;
        if m.head_length < eps {
            m.head_length = 0.0;
        }
        if m.tail_length < eps {
            m.tail_length = 0.0;
        }
        2
        // If the split leaves a head or tail shorter than the minimum line
        // length it is queued anyway: the resulting junction velocity error
        // is small precisely because the region is short.
    }

    /// Commit a computed plan as three region buffers.
    fn queue_move(&mut self, m: &mut MovePlan) -> Result<(), PlannerError> {
        m.head = self.queue_buffer(
            m.initial_velocity,
            m.cruise_velocity,
            m.initial_velocity_req,
            m.head_length,
        )?;
        m.body = self.queue_buffer(
            m.cruise_velocity,
            m.cruise_velocity,
            m.target_velocity,
            m.body_length,
        )?;
        m.tail = self.queue_buffer(
            m.cruise_velocity,
            m.final_velocity,
            m.target_velocity,
            m.tail_length,
        )?;
        Ok(())
    }

    /// Fill and commit one region buffer, integrating the planning position
    /// forward along the unit vector.
    fn queue_buffer(&mut self, vs: f64, ve: f64, vr: f64, len: f64) -> Result<usize, PlannerError> {
        let Some(ix) = self.pool.get_write_buffer() else {
            error!("write buffer underrun while committing aline regions");
            return Err(PlannerError::BufferFull);
        };
        for i in 0..AXES {
            self.mm.position[i] += len * self.mm.unit_vec[i];
        }
        let unit_vec = self.mm.unit_vec;
        let target = self.mm.position;

        let bf = self.pool.get_mut(ix);
        bf.start_velocity = vs;
        bf.end_velocity = ve;
        bf.request_velocity = vr;
        bf.length = len;
        bf.unit_vec = unit_vec;
        bf.target = target;
        bf.replannable = true;

        let move_type = self.region_move_type(ix);
        self.pool.queue_write_buffer(move_type);
        Ok(ix)
    }

    /// Region type from the conditions in the buffer.
    fn region_move_type(&self, ix: usize) -> MoveType {
        let bf = self.pool.get(ix);
        if bf.length < self.cfg.min_line_length {
            MoveType::Null
        } else if (bf.start_velocity - bf.end_velocity).abs() < self.cfg.epsilon {
            MoveType::Cruise
        } else if bf.start_velocity < bf.end_velocity {
            MoveType::Accel
        } else {
            MoveType::Decel
        }
    }

    /// Recompute the moves before `m` to fit the new junction velocity.
    ///
    /// Walks backwards from the newest move until it finds one that cannot
    /// be replanned: already optimal, fenced by exact-stop path control, or
    /// executing (a running head is fine, a running body or tail is not).
    fn backplan(&mut self, m: MovePlan) {
        // an exact stop fences the join: the previous move may never be
        // re-opened to blend with this one
        if m.path_mode == PathMode::ExactStop {
            let (head, body, tail) = self.previous_region_indices(m.head);
            self.pool.get_mut(head).replannable = false;
            self.pool.get_mut(body).replannable = false;
            self.pool.get_mut(tail).replannable = false;
            return;
        }

        let mut m = m;
        self.set_braking_velocity(&mut m);

        let mut depth = 0;
        while let Some(mut p) = self.make_previous_move(&m) {
            let (vir, vt, join_v) = (p.initial_velocity_req, p.target_velocity, m.initial_velocity);
            self.compute_regions(&mut p, vir, vt, join_v);
            self.update_move(&p, &m);
            m = p; // walk backwards
            depth += 1;
            if depth > MAX_LOOKBACK_DEPTH {
                error!(length = m.length, "backplan exceeded lookback depth");
                break;
            }
        }
    }

    /// Indices of the three region buffers immediately before `head`.
    fn previous_region_indices(&self, head: usize) -> (usize, usize, usize) {
        let tail = self.pool.prev_of(head);
        let body = self.pool.prev_of(tail);
        let head = self.pool.prev_of(body);
        (head, body, tail)
    }

    /// Bound the newest move's requested initial velocity so that the whole
    /// replannable chain behind it can still brake to a full stop.
    ///
    /// Accumulates the length of the newest move plus every contiguous
    /// replannable predecessor, then clamps Vir to the largest velocity
    /// that distance can absorb at maximum jerk.
    fn set_braking_velocity(&self, m: &mut MovePlan) {
        let mut chain_length = m.length;
        let mut head = m.head;
        let mut depth = 0;
        loop {
            let (prev_head, prev_body, prev_tail) = self.previous_region_indices(head);
            if !(self.pool.get(prev_head).replannable
                && self.pool.get(prev_body).replannable
                && self.pool.get(prev_tail).replannable)
            {
                break;
            }
            chain_length += self.pool.get(prev_head).length
                + self.pool.get(prev_body).length
                + self.pool.get(prev_tail).length;
            head = prev_head;
            depth += 1;
            if depth > MAX_LOOKBACK_DEPTH {
                error!(chain_length, "braking walk exceeded lookback depth");
                break;
            }
        }
        let braking_velocity = attainable_velocity(0.0, chain_length, &self.mm.jerk);
        m.initial_velocity_req = m.initial_velocity_req.min(braking_velocity);
    }

    /// Reconstruct the planning struct for the move before `m` from its
    /// region buffers. Returns `None` when that move is empty, finished,
    /// already executing its body or tail, or otherwise non-replannable.
    fn make_previous_move(&self, m: &MovePlan) -> Option<MovePlan> {
        let (head, body, tail) = self.previous_region_indices(m.head);
        let hb = self.pool.get(head);
        let bb = self.pool.get(body);
        let tb = self.pool.get(tail);

        // a running head is still blendable; a running body or tail is not
        if !tb.replannable
            || !bb.replannable
            || tb.state == BufferState::Running
            || bb.state == BufferState::Running
        {
            return None;
        }

        Some(MovePlan {
            head,
            body,
            tail,
            length: hb.length + bb.length + tb.length,
            head_length: hb.length,
            body_length: bb.length,
            tail_length: tb.length,
            initial_velocity_req: hb.request_velocity,
            initial_velocity: hb.start_velocity,
            target_velocity: bb.request_velocity,
            cruise_velocity: bb.start_velocity,
            final_velocity: tb.end_velocity,
            ..MovePlan::default()
        })
    }

    /// Write a recomputed plan `p` back to its buffers. `m` is the next
    /// move in the chain and is not modified. A move that now hits all its
    /// requested velocities is optimally planned and stops replanning.
    fn update_move(&mut self, p: &MovePlan, m: &MovePlan) {
        let eps = self.cfg.epsilon;

        {
            let head = self.pool.get_mut(p.head);
            head.start_velocity = p.initial_velocity;
            head.end_velocity = p.cruise_velocity;
            head.request_velocity = p.initial_velocity_req;
            head.length = p.head_length;
        }
        let head_type = self.region_move_type(p.head);
        self.pool.get_mut(p.head).move_type = head_type;

        {
            let body = self.pool.get_mut(p.body);
            body.start_velocity = p.cruise_velocity;
            body.end_velocity = p.cruise_velocity;
            body.request_velocity = p.target_velocity;
            body.length = p.body_length;
        }
        let body_type = self.region_move_type(p.body);
        self.pool.get_mut(p.body).move_type = body_type;

        {
            let tail = self.pool.get_mut(p.tail);
            tail.start_velocity = p.cruise_velocity;
            tail.end_velocity = p.final_velocity;
            tail.request_velocity = p.final_velocity;
            tail.length = p.tail_length;
        }
        let tail_type = self.region_move_type(p.tail);
        self.pool.get_mut(p.tail).move_type = tail_type;

        let optimal = (p.initial_velocity - p.initial_velocity_req).abs() < eps
            && (p.cruise_velocity - p.target_velocity).abs() < eps
            && (p.final_velocity - m.initial_velocity_req).abs() < eps;
        if optimal {
            self.pool.get_mut(p.head).replannable = false;
            self.pool.get_mut(p.body).replannable = false;
            self.pool.get_mut(p.tail).replannable = false;
        }
    }
}
