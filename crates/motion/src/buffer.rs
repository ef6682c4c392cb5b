//! The move buffer ring.
//!
//! Moves and sub-moves live in a fixed ring of buffers with three cursors:
//! `w` (next slot a producer may claim), `q` (next claimed slot to commit to
//! the queue) and `r` (next committed slot to run). Claiming a write buffer
//! is decoupled from committing it so that an `aline` can commit its three
//! region buffers as a unit, and the `Pending` state pins the identity of
//! "the next buffer to start" so backward replanning can never rewrite a
//! buffer the runtime has already selected.
//!
//! A typical usage sequence is:
//!
//! 1.  test that three write buffers are free (for an `aline`),
//! 2.  peek at [`BufferPool::prev_buffer_implicit`] to read the previous
//!     move's tail,
//! 3.  claim write buffers as needed (releasing with
//!     [`BufferPool::unget_write_buffer`] on an exception path),
//! 4.  commit each with [`BufferPool::queue_write_buffer`],
//! 5.  the runner fetches the same run buffer across iterations and
//!     finalizes it when the sub-move completes.
//!
//! The write cursor only moves forward on commit and the run cursor only on
//! finalize; check, claim and unget do not advance them.

use crate::{AxisVector, BUFFER_POOL_SIZE};

/// Queueing lifecycle of a single buffer.
///
/// States advance only along
/// `Empty -> Loading -> Queued -> Pending -> Running -> Empty`
/// (`Pending` is optional). `Empty` must stay the zero value: clearing a
/// buffer re-initializes it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum BufferState {
    #[default]
    Empty = 0,
    /// Claimed by a producer, not yet committed.
    Loading,
    /// Committed, waiting to run.
    Queued,
    /// Marked as the next buffer to run.
    Pending,
    /// Currently executing.
    Running,
}

/// What a buffer asks the runtime to do. Selected by the dispatcher.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum MoveType {
    /// Placeholder region with no motion.
    #[default]
    Null = 0,
    /// Jerk-controlled acceleration region of an aline.
    Accel,
    /// Constant-velocity region of an aline.
    Cruise,
    /// Jerk-controlled deceleration region of an aline.
    Decel,
    /// Simple line with no accel/decel management.
    Line,
    /// Arc feed, rendered as chords at runtime.
    Arc,
    /// Timed delay with no movement.
    Dwell,
    /// Restart motors.
    Start,
    /// Stop motors.
    Stop,
    /// Stop motors and end the program.
    End,
}

/// Continuation state of the runner working a buffer. `New` must stay the
/// zero value for the same reason as [`BufferState::Empty`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum MoveState {
    #[default]
    New = 0,
    /// First half of the move or sub-move.
    Running1,
    /// Second half of the move or sub-move.
    Running2,
    /// Close out the move or sub-move.
    Finalize,
    /// Force the move to end.
    End,
}

/// Arc parameters carried by `MoveType::Arc` buffers.
#[derive(Debug, Default, Copy, Clone)]
pub struct ArcGeometry {
    /// Start angle, advanced chord by chord at runtime.
    pub theta: f64,
    /// Circle radius in mm.
    pub radius: f64,
    /// Signed radians along the arc (+CW, -CCW).
    pub angular_travel: f64,
    /// Travel along the linear axis for helical motion.
    pub linear_travel: f64,
    /// First circle-plane axis.
    pub axis_1: usize,
    /// Second circle-plane axis.
    pub axis_2: usize,
    /// Transverse axis for helical motion.
    pub axis_linear: usize,
}

/// One move or sub-move control block.
#[derive(Debug, Default, Copy, Clone)]
pub struct MoveBuffer {
    // ring neighbors, structural: set once at pool init, survive clear()
    pub(crate) next: usize,
    pub(crate) prev: usize,

    pub state: BufferState,
    pub move_type: MoveType,
    pub move_state: MoveState,
    /// True while this region may still be rewritten by backward replanning.
    pub replannable: bool,

    /// Absolute endpoint of the move, mm.
    pub target: AxisVector,
    /// Direction cosines for axis scaling and jerk computation.
    pub unit_vec: AxisVector,
    pub arc: ArcGeometry,

    /// Line, helix or dwell time. Minutes, except dwells which carry seconds.
    pub time: f64,
    /// Line or helix length in mm.
    pub length: f64,
    /// Actual starting velocity of the region, mm/min.
    pub start_velocity: f64,
    /// Actual ending velocity of the region, mm/min.
    pub end_velocity: f64,
    /// Requested initial, cruise, or end velocity for a head, body, or tail
    /// respectively, mm/min.
    pub request_velocity: f64,
}

impl MoveBuffer {
    /// Zero the payload while preserving the structural ring links.
    fn clear(&mut self) {
        let (next, prev) = (self.next, self.prev);
        *self = Self::default();
        self.next = next;
        self.prev = prev;
    }
}

/// Fixed ring of move buffers with write, commit and run cursors.
#[derive(Debug)]
pub struct BufferPool {
    bf: [MoveBuffer; BUFFER_POOL_SIZE],
    w: usize,
    q: usize,
    r: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        let mut bf = [MoveBuffer::default(); BUFFER_POOL_SIZE];
        for (i, buffer) in bf.iter_mut().enumerate() {
            buffer.next = (i + 1) % BUFFER_POOL_SIZE;
            buffer.prev = (i + BUFFER_POOL_SIZE - 1) % BUFFER_POOL_SIZE;
        }
        Self { bf, w: 0, q: 0, r: 0 }
    }

    /// True if the next `count` slots starting at the write cursor are all
    /// free. Does not advance anything.
    pub fn check_write_buffers(&self, count: usize) -> bool {
        let mut w = self.w;
        for _ in 0..count {
            if self.bf[w].state != BufferState::Empty {
                return false;
            }
            w = self.bf[w].next;
        }
        true
    }

    /// Claim the next free buffer for writing, or `None` if the ring is
    /// full. Multiple write buffers may be open at once; they commit in the
    /// order they were claimed.
    pub fn get_write_buffer(&mut self) -> Option<usize> {
        let w = self.w;
        if self.bf[w].state != BufferState::Empty {
            return None;
        }
        self.bf[w].clear();
        self.bf[w].state = BufferState::Loading;
        self.w = self.bf[w].next;
        Some(w)
    }

    /// Release the most recently claimed, still-loading write buffer.
    pub fn unget_write_buffer(&mut self) {
        self.w = self.bf[self.w].prev;
        self.bf[self.w].state = BufferState::Empty;
    }

    /// Commit the next claimed buffer to the queue with the given type.
    pub fn queue_write_buffer(&mut self, move_type: MoveType) {
        let q = self.q;
        self.bf[q].move_type = move_type;
        self.bf[q].move_state = MoveState::New;
        self.bf[q].state = BufferState::Queued;
        self.q = self.bf[q].next;
    }

    /// Promote and return the next buffer to run, or the currently running
    /// buffer when called again before finalize (supports continuations).
    /// Returns `None` when nothing is queued.
    pub fn get_run_buffer(&mut self) -> Option<usize> {
        let r = self.r;
        if matches!(self.bf[r].state, BufferState::Queued | BufferState::Pending) {
            self.bf[r].state = BufferState::Running;
        }
        (self.bf[r].state == BufferState::Running).then_some(r)
    }

    /// Recycle the current run buffer and advance to the next, pending it
    /// if it is already queued.
    pub fn finalize_run_buffer(&mut self) {
        self.bf[self.r].clear();
        self.r = self.bf[self.r].next;
        if self.bf[self.r].state == BufferState::Queued {
            self.bf[self.r].state = BufferState::Pending;
        }
    }

    /// The buffer immediately before the next write slot: the most recently
    /// queued buffer. Earlier buffers can be read through the backwards
    /// links. Never commit or finalize through this index.
    pub fn prev_buffer_implicit(&self) -> usize {
        self.bf[self.w].prev
    }

    /// Ring predecessor of `index`.
    pub fn prev_of(&self, index: usize) -> usize {
        self.bf[index].prev
    }

    pub fn get(&self, index: usize) -> &MoveBuffer {
        &self.bf[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut MoveBuffer {
        &mut self.bf[index]
    }

    /// True when every buffer is free and all cursors agree: the queue has
    /// been fully drained with no leaked slots.
    pub fn is_drained(&self) -> bool {
        self.bf.iter().all(|b| b.state == BufferState::Empty) && self.w == self.q && self.q == self.r
    }
}
