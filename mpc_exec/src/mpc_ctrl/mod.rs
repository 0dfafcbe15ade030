//! # MPC control module
//!
//! MpcCtrl runs one control cycle for each telemetry message:
//!
//!  1. Fit the reference curve to the waypoints in the vehicle frame.
//!  1. Project the vehicle state over the actuation latency using the last
//!     applied actuation.
//!  1. Solve the trajectory optimisation from the projected state.
//!  1. Normalise the first actuation and package it with the predicted and
//!     reference trajectories.
//!
//! Steering leaves the module as the steering angle divided by the steering
//! limit, clamped to [-1, 1]. Throttle is the acceleration demand clamped to
//! [-1, 1]. A steering value reported back in telemetry uses the same
//! convention.
//!
//! A failed cycle is reported as an error, choosing a fallback command is
//! left to the caller.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use params::*;
pub use state::*;

use crate::mpc::{ParamsError, SolveError};
use crate::ref_fit::FitError;
use util::{archive::ArchiveError, params::LoadError};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during MpcCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum MpcCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(LoadError),

    #[error("Invalid parameters: {0}")]
    ParamsError(#[from] ParamsError),

    #[error("Could not initialise the archive: {0}")]
    ArchiveError(ArchiveError),

    #[error("MpcCtrl has not been initialised")]
    NotInitialised,

    #[error("Could not fit the reference curve: {0}")]
    FitError(#[from] FitError),

    #[error("Trajectory optimisation failed: {0}")]
    SolveError(#[from] SolveError),
}
