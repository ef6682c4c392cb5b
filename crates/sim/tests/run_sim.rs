//! End-to-end simulation runs: programs planned, dispatched and drained
//! against the fake motor queue.

use motion::{AxisVector, PlannerConfig, AXES};
use sim::{MotorCommand, SimMachine};

fn axis(x: f64, y: f64, z: f64) -> AxisVector {
    let mut v = [0.0; AXES];
    v[0] = x;
    v[1] = y;
    v[2] = z;
    v
}

#[test]
fn square_program_executes_in_order_and_drains() {
    let mut machine: SimMachine = SimMachine::new(PlannerConfig::default());
    let corners = [
        axis(20.0, 0.0, 0.0),
        axis(20.0, 20.0, 0.0),
        axis(0.0, 20.0, 0.0),
        axis(0.0, 0.0, 0.0),
    ];
    for corner in &corners {
        machine.make_room_for_aline().unwrap();
        machine.planner.aline(corner, 0.1).unwrap();
    }
    machine.planner.dwell(0.25).unwrap();
    machine.planner.queued_end().unwrap();

    let stats = machine.run_until_idle().unwrap();
    assert!(stats.completed >= 14, "completed {} moves", stats.completed);
    assert!(machine.planner.pool().is_drained());

    // the program ends with the dwell then the end directive, in order
    let executed = machine.motors.executed();
    let len = executed.len();
    assert_eq!(executed[len - 1], MotorCommand::End);
    assert_eq!(executed[len - 2], MotorCommand::Dwell { microseconds: 250_000 });
    assert!(machine.emitted_lines() > 50);

    // net travel around the square is zero on every motor
    let travel = machine.motors.travel_per_motor(&machine.kinematics.steps_per_mm);
    for (motor, mm) in travel.iter().enumerate() {
        assert!(mm.abs() < 0.2, "motor {motor} drifted {mm} mm");
    }
}

#[test]
fn tiny_motor_queue_forces_interleaving() {
    let mut machine: SimMachine<2> = SimMachine::new(PlannerConfig::default());
    machine.planner.aline(&axis(10.0, 0.0, 0.0), 0.1).unwrap();

    let stats = machine.run_until_idle().unwrap();
    assert!(
        stats.suspensions > stats.completed,
        "expected heavy backpressure, got {stats:?}"
    );
    assert!(machine.planner.pool().is_drained());
    assert!(machine.motors.in_flight() == 0);
}

#[test]
fn trace_round_trips_through_json() {
    let mut machine: SimMachine = SimMachine::new(PlannerConfig::default());
    machine.planner.line(&axis(5.0, 0.0, 0.0), 0.01).unwrap();
    machine.planner.dwell(0.1).unwrap();
    machine.run_until_idle().unwrap();

    let path = std::env::temp_dir().join("motion_sim_trace.json");
    machine.dump_trace(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["entries"].as_array().unwrap().len(), 2);
    assert!(value["config"]["linear_jerk_max"].as_f64().unwrap() > 0.0);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn stop_and_start_bracket_motion() {
    let mut machine: SimMachine = SimMachine::new(PlannerConfig::default());
    machine.planner.queued_stop().unwrap();
    machine.planner.line(&axis(1.0, 0.0, 0.0), 0.01).unwrap();
    machine.planner.queued_start().unwrap();

    machine.run_until_idle().unwrap();
    let executed = machine.motors.executed();
    assert_eq!(executed[0], MotorCommand::Stop);
    assert!(matches!(executed[1], MotorCommand::Line { .. }));
    assert_eq!(executed[2], MotorCommand::Start);
}
