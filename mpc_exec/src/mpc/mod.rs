//! # Trajectory optimiser module
//!
//! The trajectory optimiser plans the vehicle's motion over a short horizon
//! of `N` steps, each `dt` seconds long, and returns the first actuation of
//! the plan. It is re-solved from scratch every control cycle (receding
//! horizon control).
//!
//! The plan is the solution of a nonlinear program over the decision vector
//! described in [`layout`]:
//!
//! - The cost penalises cross track and heading errors most heavily, then
//!   speed deviations from the reference, actuator use, and changes in
//!   actuation between steps.
//! - The first state of the horizon is pinned to the supplied state, and
//!   each later state must equal the model's prediction from the one before
//!   it. The prediction recomputes the errors against the reference curve,
//!   see [`crate::model::tracking_step`].
//! - Steering and acceleration are bounded, states are not.
//!
//! The program is solved over the actuation alone, with the states rolled
//! out through the model, by a [`NlpSolver`] given a wall clock budget. The
//! default is [`PanocSolver`]. A solve which runs out of time, hits its
//! iteration limit or ends up violating the dynamics is reported as a
//! [`SolveError`], never as a solution.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod layout;
pub mod optimiser;
pub mod params;
pub mod problem;
pub mod solver;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

pub use layout::*;
pub use optimiser::*;
pub use params::*;
pub use problem::*;
pub use solver::*;
