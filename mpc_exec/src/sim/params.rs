//! Parameters structures for the simulation

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the closed loop simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Time between telemetry messages.
    ///
    /// Units: seconds
    pub cycle_period_s: f64,

    /// Integration step of the vehicle model.
    ///
    /// Units: seconds
    pub sim_step_s: f64,

    /// Delay between a command being issued and the vehicle applying it.
    ///
    /// Units: seconds
    pub latency_s: f64,

    /// If true the executable sleeps for `latency_s` of wall clock time
    /// before forwarding each command, emulating a real actuation delay.
    pub realtime: bool,

    /// Number of control cycles to run.
    pub num_cycles: usize,

    /// Number of track waypoints published in each telemetry message.
    pub lookahead: usize,

    /// Index of the track point the vehicle starts on.
    pub start_index: usize,

    /// Initial speed of the vehicle.
    pub initial_speed: f64,

    /// Acceleration produced by full throttle.
    pub accel_scale: f64,

    /// Number of failed cycles in a row after which the run is aborted.
    pub max_consecutive_failures: usize,
}

/// Parameters describing the track.
///
/// If no waypoints are listed an ellipse is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackParams {
    /// Units: meters,
    /// Frame: World
    pub waypoints_x_m: Vec<f64>,

    /// Units: meters,
    /// Frame: World
    pub waypoints_y_m: Vec<f64>,

    /// Semi-axis along world X of the generated ellipse.
    ///
    /// Units: meters
    pub ellipse_semi_x_m: f64,

    /// Semi-axis along world Y of the generated ellipse.
    ///
    /// Units: meters
    pub ellipse_semi_y_m: f64,

    /// Approximate spacing of the generated ellipse's waypoints.
    ///
    /// Units: meters
    pub ellipse_spacing_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            cycle_period_s: 0.1,
            sim_step_s: 0.01,
            latency_s: 0.1,
            realtime: false,
            num_cycles: 600,
            lookahead: 6,
            start_index: 0,
            initial_speed: 0.0,
            accel_scale: 1.0,
            max_consecutive_failures: 5,
        }
    }
}

impl Default for TrackParams {
    fn default() -> Self {
        Self {
            waypoints_x_m: Vec::new(),
            waypoints_y_m: Vec::new(),
            ellipse_semi_x_m: 150.0,
            ellipse_semi_y_m: 80.0,
            ellipse_spacing_m: 10.0,
        }
    }
}
