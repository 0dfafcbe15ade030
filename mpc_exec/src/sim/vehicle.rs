//! Simulated vehicle
//!
//! The vehicle integrates the same kinematic bicycle model as the controller,
//! but in the world frame and with a finer step. Commands only take effect
//! once the actuation latency has elapsed in simulation time.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use serde::Serialize;
use std::collections::VecDeque;

use super::{SimParams, Track};
use crate::model::{kinematic_step, Actuation, VehicleState};
use crate::mpc_ctrl::{actuation_from_norm, steer_to_norm};
use comms_if::{cmd::SteerCmd, tlm::Telemetry};
use util::maths::wrap_pi;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A vehicle driven by steering commands.
#[derive(Debug, Clone)]
pub struct SimVehicle {
    /// World frame state, only position, heading and speed are used.
    state: VehicleState,

    /// The actuation currently applied, in model units.
    applied: Actuation,

    /// Commands waiting for the latency to elapse, oldest first, tagged with
    /// the time they take effect.
    pending: VecDeque<(f64, Actuation)>,

    /// Units: seconds
    time_s: f64,

    lf_m: f64,
    max_steer_rad: f64,
    sim_step_s: f64,
    latency_s: f64,
    accel_scale: f64,
}

/// A snapshot of the vehicle for saving.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PathPoint {
    pub time_s: f64,
    pub x_m: f64,
    pub y_m: f64,
    pub psi_rad: f64,
    pub speed: f64,
    pub delta_rad: f64,
    pub accel: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimVehicle {
    /// Place a vehicle on the track's start point, facing along the track.
    pub fn on_track(params: &SimParams, track: &Track, lf_m: f64, max_steer_rad: f64) -> Self {
        let start = track.point(params.start_index);

        let state = VehicleState {
            x: start[0],
            y: start[1],
            psi: track.heading_rad(params.start_index),
            v: params.initial_speed,
            ..Default::default()
        };

        Self::new(params, state, lf_m, max_steer_rad)
    }

    pub fn new(params: &SimParams, state: VehicleState, lf_m: f64, max_steer_rad: f64) -> Self {
        Self {
            state,
            applied: Actuation::default(),
            pending: VecDeque::new(),
            time_s: 0.0,
            lf_m,
            max_steer_rad,
            sim_step_s: params.sim_step_s,
            latency_s: params.latency_s.max(0.0),
            accel_scale: params.accel_scale,
        }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn applied(&self) -> &Actuation {
        &self.applied
    }

    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    pub fn position_m(&self) -> Vector2<f64> {
        Vector2::new(self.state.x, self.state.y)
    }

    /// Queue a command, it is applied once the latency has elapsed.
    pub fn command(&mut self, cmd: &SteerCmd) {
        let act = actuation_from_norm(
            cmd.steering_norm.max(-1.0).min(1.0),
            cmd.throttle_norm.max(-1.0).min(1.0),
            self.max_steer_rad
        );

        self.pending.push_back((self.time_s + self.latency_s, act));
    }

    /// Advance the simulation by `duration_s`.
    pub fn step(&mut self, duration_s: f64) {
        if !(duration_s > 0.0) {
            return;
        }

        let num_steps = ((duration_s / self.sim_step_s).round() as usize).max(1);
        let h = duration_s / num_steps as f64;

        for _ in 0..num_steps {
            while let Some((apply_at, act)) = self.pending.front().cloned() {
                if apply_at > self.time_s + 1e-9 {
                    break;
                }
                self.applied = act;
                self.pending.pop_front();
            }

            let act = Actuation {
                delta: self.applied.delta,
                a: self.applied.a * self.accel_scale,
            };
            self.state = kinematic_step(&self.state, &act, self.lf_m, h);
            self.time_s += h;
        }
    }

    /// Build the telemetry message the vehicle would publish now.
    pub fn telemetry(&self, track: &Track, lookahead: usize) -> Telemetry {
        let (waypoints_x_m, waypoints_y_m) = track.lookahead(&self.position_m(), lookahead);

        Telemetry {
            waypoints_x_m,
            waypoints_y_m,
            x_m: self.state.x,
            y_m: self.state.y,
            psi_rad: wrap_pi(self.state.psi),
            speed: self.state.v,
            steering_norm: Some(steer_to_norm(self.applied.delta, self.max_steer_rad)),
            throttle_norm: Some(self.applied.a),
        }
    }

    pub fn path_point(&self) -> PathPoint {
        PathPoint {
            time_s: self.time_s,
            x_m: self.state.x,
            y_m: self.state.y,
            psi_rad: self.state.psi,
            speed: self.state.v,
            delta_rad: self.applied.delta,
            accel: self.applied.a,
        }
    }
}
