//! # MPC Solve Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use comms_if::tlm::Telemetry;
use mpc_lib::{
    model::VehicleState,
    mpc::TrajOptimiser,
    mpc_ctrl::{MpcCtrl, MpcCtrlParams},
    ref_fit::{self, Pose2},
    sim::{Track, TrackParams},
};
use nalgebra::Vector2;

fn mpc_solve_benchmark(c: &mut Criterion) {
    // ---- Build a telemetry message from the default track ----

    let track = Track::from_params(&TrackParams::default()).unwrap();
    let start = track.point(0);
    let heading = track.heading_rad(0);

    // Slightly off the track and moving
    let position = start + Vector2::new(1.0, 0.0);
    let (waypoints_x_m, waypoints_y_m) = track.lookahead(&position, 6);

    let tlm = Telemetry {
        waypoints_x_m,
        waypoints_y_m,
        x_m: position[0],
        y_m: position[1],
        psi_rad: heading + 0.05,
        speed: 15.0,
        steering_norm: Some(0.0),
        throttle_norm: Some(0.5),
    };

    let params = MpcCtrlParams {
        archive: false,
        ..Default::default()
    };

    // Bench the fit on its own
    let pose = Pose2::new(tlm.x_m, tlm.y_m, tlm.psi_rad);
    c.bench_function("ref_fit::fit", |b| {
        b.iter(|| ref_fit::fit(&tlm.waypoints_x_m, &tlm.waypoints_y_m, &pose).unwrap())
    });

    // Bench the optimiser on its own
    let fit = ref_fit::fit(&tlm.waypoints_x_m, &tlm.waypoints_y_m, &pose).unwrap();
    let state = VehicleState::at_origin(tlm.speed, fit.cte_m, fit.epsi_rad);
    let optimiser = TrajOptimiser::new(params.mpc.clone()).unwrap();

    c.bench_function("TrajOptimiser::solve", |b| {
        b.iter(|| optimiser.solve(&state, &fit.poly))
    });

    // Bench a full control cycle
    let mut mpc_ctrl = MpcCtrl::new(params).unwrap();

    c.bench_function("MpcCtrl::cycle", |b| b.iter(|| mpc_ctrl.cycle(&tlm)));
}

criterion_group!(benches, mpc_solve_benchmark);
criterion_main!(benches);
