//! # Vehicle model
//!
//! The kinematic bicycle model used throughout the controller. All functions
//! are generic over [`DualNum`] so that the same equations are evaluated for
//! values (`f64`) and for derivatives (`Dual64`) inside the optimiser.
//!
//! The model, integrated with a single Euler step of length `dt`, is:
//!
//! ```text
//! x'    = x + v cos(psi) dt
//! y'    = y + v sin(psi) dt
//! psi'  = psi - v/Lf delta dt
//! v'    = v + a dt
//! cte'  = cte + v sin(epsi) dt
//! epsi' = epsi - v/Lf delta dt
//! ```
//!
//! A positive steering angle therefore decreases the heading. The simulator
//! this was tuned against counts headings clockwise, so in its frame a
//! positive steering angle is a left hand turn.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use num_dual::DualNum;
use serde::{Deserialize, Serialize};

// Internal
use crate::ref_fit::RefPoly;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of fields in the vehicle state.
pub const NUM_STATES: usize = 6;

/// Number of actuators.
pub const NUM_ACTUATORS: usize = 2;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The state of the vehicle.
///
/// Position is in the vehicle frame or world frame depending on where the
/// state is used, the optimiser always works in the vehicle frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState<T = f64> {
    /// Units: meters
    pub x: T,

    /// Units: meters
    pub y: T,

    /// Heading.
    ///
    /// Units: radians
    pub psi: T,

    /// Speed.
    pub v: T,

    /// Cross track error, signed lateral offset of the reference curve from
    /// the vehicle.
    ///
    /// Units: meters
    pub cte: T,

    /// Heading error relative to the reference curve's tangent.
    ///
    /// Units: radians
    pub epsi: T,
}

/// Actuator demands in model units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuation<T = f64> {
    /// Steering angle.
    ///
    /// Units: radians
    pub delta: T,

    /// Acceleration, normalised so that 1.0 is full throttle.
    pub a: T,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: Copy> VehicleState<T> {
    /// The fields of the state in decision vector order.
    pub fn to_array(&self) -> [T; NUM_STATES] {
        [self.x, self.y, self.psi, self.v, self.cte, self.epsi]
    }

    /// Build a state from its fields in decision vector order.
    pub fn from_array(a: [T; NUM_STATES]) -> Self {
        Self {
            x: a[0],
            y: a[1],
            psi: a[2],
            v: a[3],
            cte: a[4],
            epsi: a[5],
        }
    }
}

impl VehicleState<f64> {
    /// A state at the origin of the vehicle frame, pointing along +X.
    pub fn at_origin(v: f64, cte: f64, epsi: f64) -> Self {
        Self {
            v,
            cte,
            epsi,
            ..Default::default()
        }
    }

    /// True if every field is finite.
    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|f| f.is_finite())
    }
}

impl<T: Copy> Actuation<T> {
    /// The actuators in decision vector order.
    pub fn to_array(&self) -> [T; NUM_ACTUATORS] {
        [self.delta, self.a]
    }

    /// Build an actuation from its fields in decision vector order.
    pub fn from_array(a: [T; NUM_ACTUATORS]) -> Self {
        Self { delta: a[0], a: a[1] }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Lift a constant into the number type being evaluated.
#[inline]
pub fn lift<D: From<f64>>(value: f64) -> D {
    D::from(value)
}

/// Advance the state by one Euler step of the kinematic model, propagating
/// the errors with their own rates.
pub fn kinematic_step<D>(
    state: &VehicleState<D>,
    act: &Actuation<D>,
    lf_m: f64,
    dt_s: f64
) -> VehicleState<D>
where
    D: DualNum<f64> + Copy
{
    let dt: D = lift::<D>(dt_s);
    let yaw_step = state.v / lift::<D>(lf_m) * act.delta * dt;

    VehicleState {
        x: state.x + state.v * state.psi.cos() * dt,
        y: state.y + state.v * state.psi.sin() * dt,
        psi: state.psi - yaw_step,
        v: state.v + act.a * dt,
        cte: state.cte + state.v * state.epsi.sin() * dt,
        epsi: state.epsi - yaw_step,
    }
}

/// Advance the state by one Euler step, recomputing the errors against the
/// reference curve at the current position.
///
/// This is the transition encoded by the optimiser's dynamics constraints:
///
/// ```text
/// cte'  = (f(x) - y) + v sin(epsi) dt
/// epsi' = (psi - atan(f'(x))) - v/Lf delta dt
/// ```
pub fn tracking_step<D>(
    state: &VehicleState<D>,
    act: &Actuation<D>,
    poly: &RefPoly,
    lf_m: f64,
    dt_s: f64
) -> VehicleState<D>
where
    D: DualNum<f64> + Copy
{
    let dt: D = lift::<D>(dt_s);
    let f_x = poly.eval(state.x);
    let psi_des = poly.slope(state.x).atan();

    let mut next = kinematic_step(state, act, lf_m, dt_s);
    next.cte = (f_x - state.y) + state.v * state.epsi.sin() * dt;
    next.epsi = (state.psi - psi_des) - state.v / lift::<D>(lf_m) * act.delta * dt;

    next
}
