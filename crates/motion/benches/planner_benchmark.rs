use criterion::{black_box, criterion_group, criterion_main, Criterion};
use motion::{
    AxisVector, CartesianKinematics, DispatchOutcome, MotorQueue, MotorSteps, Planner,
    PlannerConfig, StopDirective, AXES,
};

/// Motor queue that discards everything; never reports backpressure.
struct NullQueue;

impl MotorQueue for NullQueue {
    fn has_room(&self) -> bool {
        true
    }
    fn queue_line(&mut self, steps: MotorSteps, microseconds: u32) {
        black_box((steps, microseconds));
    }
    fn queue_dwell(&mut self, microseconds: u32) {
        black_box(microseconds);
    }
    fn queue_stops(&mut self, directive: StopDirective) {
        black_box(directive);
    }
}

fn zigzag_targets(count: usize) -> Vec<AxisVector> {
    (0..count)
        .map(|i| {
            let mut target = [0.0; AXES];
            target[0] = (i + 1) as f64 * 5.0;
            target[1] = if i % 2 == 0 { 0.0 } else { 2.5 };
            target
        })
        .collect()
}

/// Plan and fully execute a chain of alines: region decomposition, backward
/// replanning across the queue, and S-curve segment emission.
fn benchmark_planner(c: &mut Criterion) {
    let kinematics = CartesianKinematics::default();
    let targets = zigzag_targets(6);

    c.bench_function("aline_chain_plan_and_run", |b| {
        b.iter(|| {
            let mut planner = Planner::new(PlannerConfig::default());
            let mut queue = NullQueue;
            for target in &targets {
                while !planner.can_accept_aline() {
                    planner.dispatch(&kinematics, &mut queue);
                }
                planner.aline(black_box(target), 0.05).unwrap();
            }
            while planner.dispatch(&kinematics, &mut queue) != DispatchOutcome::Idle {}
        })
    });
}

criterion_group!(benches, benchmark_planner);
criterion_main!(benches);
