//! # Reference fitter
//!
//! The reference fitter turns the world frame waypoints provided in telemetry
//! into a cubic reference curve `y = f(x)` in the vehicle frame, in which the
//! vehicle sits at the origin facing along +X.
//!
//! Once the curve is known the errors at the vehicle are simply:
//!
//! - cross track error `cte = f(0)`
//! - heading error `epsi = -atan(f'(0))`
//!
//! Degenerate waypoint sets are rejected rather than fitted, since extreme
//! coefficients would destabilise the optimiser.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod frames;
pub mod poly;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::debug;
use serde::Serialize;

pub use frames::*;
pub use poly::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The result of fitting the reference curve.
#[derive(Debug, Clone, Serialize)]
pub struct RefFit {
    /// The fitted curve in the vehicle frame.
    pub poly: RefPoly,

    /// Cross track error at the vehicle.
    ///
    /// Units: meters
    pub cte_m: f64,

    /// Heading error at the vehicle.
    ///
    /// Units: radians
    pub epsi_rad: f64,

    /// Waypoint X coordinates.
    ///
    /// Units: meters,
    /// Frame: Vehicle
    pub waypoints_x_m_vf: Vec<f64>,

    /// Waypoint Y coordinates.
    ///
    /// Units: meters,
    /// Frame: Vehicle
    pub waypoints_y_m_vf: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reasons a reference curve cannot be fitted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("Got {num_x} waypoint X coordinates but {num_y} Y coordinates")]
    MismatchedLengths { num_x: usize, num_y: usize },

    #[error("Expected at least {required} waypoints, found {found}")]
    TooFewWaypoints { found: usize, required: usize },

    #[error("Expected at least {required} distinct waypoint X coordinates, found {found}")]
    TooFewDistinctX { found: usize, required: usize },

    #[error("Waypoints or pose contain a non-finite value")]
    NotFinite,

    #[error("The fit is numerically degenerate (normal equation condition number {condition:e})")]
    IllConditioned { condition: f64 },
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Fit the reference curve to world frame waypoints as seen from `pose`.
pub fn fit(xs_m_w: &[f64], ys_m_w: &[f64], pose: &Pose2) -> Result<RefFit, FitError> {
    if xs_m_w.len() != ys_m_w.len() {
        return Err(FitError::MismatchedLengths {
            num_x: xs_m_w.len(),
            num_y: ys_m_w.len(),
        });
    }

    if !(pose.position_m.iter().all(|p| p.is_finite()) && pose.heading_rad.is_finite()) {
        return Err(FitError::NotFinite);
    }

    let (xs_vf, ys_vf) = world_to_vehicle(xs_m_w, ys_m_w, pose);

    let poly = RefPoly::fit(&xs_vf, &ys_vf)?;

    let fit = RefFit {
        cte_m: poly.cte(),
        epsi_rad: poly.epsi(),
        poly,
        waypoints_x_m_vf: xs_vf,
        waypoints_y_m_vf: ys_vf,
    };

    debug!(
        "Reference fit: coeffs {:?}, cte {:.4} m, epsi {:.4} rad",
        fit.poly.coeffs, fit.cte_m, fit.epsi_rad
    );

    Ok(fit)
}
