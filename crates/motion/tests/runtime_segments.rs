//! Runtime behavior: segment emission, arc chord generation, endpoint
//! accuracy and cooperative backpressure.

mod common;

use common::{axis, run_to_idle, unit_kinematics, Command, FakeSteppers, RecordingQueue};
use motion::math::{brake_length, JerkTerms};
use motion::{DispatchOutcome, Planner, PlannerConfig, StopDirective, ONE_MINUTE_OF_MICROSECONDS};

/// Velocity of an emitted line in mm/min, with 1 step/mm kinematics.
fn line_velocity(steps: &[f64; 4], microseconds: u32) -> f64 {
    let length = steps.iter().map(|s| s * s).sum::<f64>().sqrt();
    length / (microseconds as f64 / ONE_MINUTE_OF_MICROSECONDS)
}

#[test]
fn arc_chords_lie_on_circle() {
    let mut planner = Planner::new(PlannerConfig::default());
    let kin = unit_kinematics();
    let mut queue = RecordingQueue::unbounded();

    let radius = 10.0;
    planner
        .arc(
            &axis(0.0, radius, 0.0),
            -radius,
            0.0,
            0.0,
            0.0,
            radius,
            std::f64::consts::FRAC_PI_2,
            0.0,
            motion::X,
            motion::Y,
            motion::Z,
            0.1,
        )
        .unwrap();
    run_to_idle(&mut planner, &kin, &mut queue);

    let arc_length = std::f64::consts::FRAC_PI_2 * radius;
    let expected_segments = (arc_length / planner.config().min_segment_len).ceil() as usize;
    let lines = queue.lines();
    assert_eq!(lines.len(), expected_segments);

    // chord endpoints stay on the circle around (0, -radius)
    let mut pos = [0.0f64; 2];
    for (steps, _) in &lines {
        pos[0] += steps[0];
        pos[1] += steps[1];
        let r = (pos[0].powi(2) + (pos[1] + radius).powi(2)).sqrt();
        assert!(
            (r - radius).abs() < 1e-9,
            "chord endpoint ({}, {}) off circle by {}",
            pos[0],
            pos[1],
            (r - radius).abs()
        );
    }
    assert!(planner.pool().is_drained());
}

#[test]
fn transition_segments_trace_an_s_curve() {
    let mut planner = Planner::new(PlannerConfig::default());
    let kin = unit_kinematics();
    let mut queue = RecordingQueue::unbounded();

    planner.aline(&axis(10.0, 0.0, 0.0), 0.1).unwrap();
    run_to_idle(&mut planner, &kin, &mut queue);

    let lines = queue.lines();
    assert!(lines.len() > 30, "expected a segment train, got {}", lines.len());

    let velocities: Vec<f64> = lines
        .iter()
        .map(|(steps, us)| line_velocity(steps, *us))
        .collect();

    // velocity rises to the cruise and falls back to a stop, unimodally
    let peak = velocities.iter().cloned().fold(0.0, f64::max);
    assert!((peak - 100.0).abs() < 2.0, "peak velocity {peak}");
    let peak_at = velocities
        .iter()
        .position(|&v| (v - peak).abs() < 1e-9)
        .unwrap();
    for pair in velocities[..peak_at].windows(2) {
        assert!(pair[1] >= pair[0] - 1e-6, "accel not monotonic: {pair:?}");
    }
    for pair in velocities[peak_at..].windows(2) {
        assert!(pair[1] <= pair[0] + 1e-6, "decel not monotonic: {pair:?}");
    }

    // velocity steps between segments stay bounded by the midpoint
    // acceleration (the steepest point of the S curve)
    let jerk = JerkTerms::new(planner.config().linear_jerk_max);
    let head_length = brake_length(0.0, 100.0, &jerk);
    let head_time = 2.0 * head_length / 100.0; // head duration at Vmid = 50
    let segment_time = lines[1].1 as f64 / ONE_MINUTE_OF_MICROSECONDS;
    let bound = head_time * jerk.div2 * segment_time * 1.10;
    for pair in velocities.windows(2) {
        assert!(
            (pair[1] - pair[0]).abs() <= bound,
            "velocity step {} exceeds jerk bound {bound}",
            (pair[1] - pair[0]).abs()
        );
    }

    // the move lands on the endpoint, short only by closing lines below
    // the minimum line length (which the runtime drops)
    let total: f64 = lines.iter().map(|(steps, _)| steps[0]).sum();
    let min_line = planner.config().min_line_length;
    assert!(
        (total - 10.0).abs() < 2.0 * min_line,
        "end position {total}"
    );
    assert!(planner.pool().is_drained());
}

#[test]
fn full_motor_queue_suspends_the_runner() {
    let mut planner = Planner::new(PlannerConfig::default());
    let kin = unit_kinematics();
    let mut queue = RecordingQueue::bounded(2);

    planner.aline(&axis(10.0, 0.0, 0.0), 0.1).unwrap();

    // two segments fit, then the runner must suspend without progress
    assert_eq!(planner.dispatch(&kin, &mut queue), DispatchOutcome::Again);
    assert_eq!(planner.dispatch(&kin, &mut queue), DispatchOutcome::Again);
    let stalled = queue.pending.len();
    for _ in 0..5 {
        assert_eq!(planner.dispatch(&kin, &mut queue), DispatchOutcome::Again);
        assert_eq!(queue.pending.len(), stalled, "runner emitted while queue full");
    }

    // draining the consumer side lets the move finish
    run_to_idle(&mut planner, &kin, &mut queue);
    queue.drain_all();
    let total: f64 = queue.lines().iter().map(|(steps, _)| steps[0]).sum();
    let min_line = planner.config().min_line_length;
    assert!((total - 10.0).abs() < 2.0 * min_line, "end position {total}");
    assert!(planner.pool().is_drained());
}

#[test]
fn dwell_and_control_directives_flow_in_order() {
    let mut planner = Planner::new(PlannerConfig::default());
    let kin = unit_kinematics();
    let mut queue = RecordingQueue::unbounded();
    let steppers = FakeSteppers::default();

    planner.line(&axis(5.0, 0.0, 0.0), 0.01).unwrap();
    planner.dwell(0.5).unwrap();
    planner.queued_stop().unwrap();
    planner.queued_start().unwrap();
    planner.queued_end().unwrap();
    run_to_idle(&mut planner, &kin, &mut queue);

    let commands = queue.commands();
    assert_eq!(commands.len(), 5);
    assert!(matches!(commands[0], Command::Line { .. }));
    assert_eq!(commands[1], Command::Dwell { microseconds: 500_000 });
    assert_eq!(commands[2], Command::Stops(StopDirective::Stop));
    assert_eq!(commands[3], Command::Stops(StopDirective::Start));
    assert_eq!(commands[4], Command::Stops(StopDirective::End));

    assert!(!planner.is_busy(&steppers));
    assert!(planner.pool().is_drained());
}

#[test]
fn line_runner_updates_runtime_position() {
    let mut planner = Planner::new(PlannerConfig::default());
    let kin = unit_kinematics();
    let mut queue = RecordingQueue::unbounded();

    planner.set_position(&axis(1.0, 1.0, 0.0));
    planner.line(&axis(6.0, 1.0, 0.0), 0.01).unwrap();
    assert_eq!(planner.dispatch(&kin, &mut queue), DispatchOutcome::Completed);

    assert_eq!(planner.runtime_position(), &axis(6.0, 1.0, 0.0));
    let lines = queue.lines();
    assert_eq!(lines.len(), 1);
    assert!((lines[0].0[0] - 5.0).abs() < 1e-12);
    assert_eq!(lines[0].1, 600_000); // 0.01 min
}

#[test]
fn async_end_stops_steppers_and_resets_the_planner() {
    let mut planner = Planner::new(PlannerConfig::default());
    let mut steppers = FakeSteppers { running: true };

    planner.aline(&axis(10.0, 0.0, 0.0), 0.1).unwrap();
    assert!(!planner.pool().is_drained());

    planner.async_end(&mut steppers);
    assert!(!steppers.running);
    assert!(planner.pool().is_drained());
    assert_eq!(planner.planned_position(), &axis(0.0, 0.0, 0.0));
    assert!(!planner.is_busy(&steppers));

    planner.async_start(&mut steppers);
    assert!(steppers.running);
    planner.async_stop(&mut steppers);
    assert!(!steppers.running);
}

#[test]
fn mixed_program_leaves_no_buffers_behind() {
    let mut planner = Planner::new(PlannerConfig::default());
    let kin = unit_kinematics();
    let mut queue = RecordingQueue::unbounded();

    planner.aline(&axis(10.0, 0.0, 0.0), 0.1).unwrap();
    planner.aline(&axis(10.0, 10.0, 0.0), 0.1).unwrap();
    planner
        .arc(
            &axis(20.0, 10.0, 0.0),
            0.0,
            -5.0,
            0.0,
            0.0,
            5.0,
            std::f64::consts::PI,
            0.0,
            motion::X,
            motion::Y,
            motion::Z,
            0.05,
        )
        .unwrap();
    planner.dwell(0.1).unwrap();
    planner.line(&axis(0.0, 0.0, 0.0), 0.05).unwrap();
    run_to_idle(&mut planner, &kin, &mut queue);

    assert!(planner.pool().is_drained());
    assert!(planner.can_accept_aline());
}
