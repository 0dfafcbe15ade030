//! # MPC controller library.
//!
//! This library contains the receding-horizon trajectory controller and the
//! simulation used to exercise it, so that the executable, benchmarks and
//! tests can all reach the same items.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Latency compensation - projects the state forward over the actuation delay
pub mod latency_comp;

/// Vehicle model - the kinematic bicycle shared by the optimiser, compensator and simulation
pub mod model;

/// Trajectory optimiser - builds and solves the finite horizon optimal control problem
pub mod mpc;

/// MPC control - runs one fit, compensate, solve cycle per telemetry message
pub mod mpc_ctrl;

/// Reference fitter - moves waypoints into the vehicle frame and fits the reference curve
pub mod ref_fit;

/// Closed loop vehicle simulation used to drive the controller without a vehicle
pub mod sim;
