//! # Latency compensation
//!
//! Commands issued by the controller only take effect after a fixed actuation
//! delay. To account for this the vehicle frame state is projected forward
//! over the delay using the previously applied actuation, and the optimiser
//! then plans from the projected state rather than the measured one.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::model::{kinematic_step, Actuation, VehicleState};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Project the state forward by `latency_s` seconds using the previous
/// actuation.
///
/// A single Euler step of the kinematic model is taken. If the latency is not
/// positive the state is returned unchanged.
pub fn compensate(
    state: &VehicleState,
    prev_actuation: &Actuation,
    latency_s: f64,
    lf_m: f64
) -> VehicleState {
    if !(latency_s > 0.0) {
        return *state;
    }

    kinematic_step(state, prev_actuation, lf_m, latency_s)
}
