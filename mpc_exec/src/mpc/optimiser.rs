//! Trajectory optimiser
//!
//! The horizon is solved over the actuation alone (single shooting): the
//! solver only sees the steering and acceleration sequence, the states being
//! rolled out through the model. The rolled out decision vector is then
//! checked against the dynamics constraints like any other solution.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use serde::Serialize;

// Internal
use super::{
    layout::Var,
    params::{MpcParams, ParamsError},
    problem::MpcProblem,
    solver::{NlpProblem, NlpSolver, PanocSolver, SolveError, SolveStats},
};
use crate::model::{Actuation, VehicleState};
use crate::ref_fit::RefPoly;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Builds and solves one horizon per call.
///
/// The optimiser holds only read-only configuration, nothing is carried from
/// one solve to the next.
#[derive(Debug, Clone)]
pub struct TrajOptimiser<S = PanocSolver> {
    params: MpcParams,
    solver: S,
}

/// The solution of one horizon.
#[derive(Debug, Clone, Serialize)]
pub struct MpcSolution {
    /// The first actuation of the horizon, in model units.
    pub actuation: Actuation,

    /// Predicted positions for steps `1..N`.
    ///
    /// Units: meters,
    /// Frame: Vehicle
    pub predicted_m_vf: Vec<(f64, f64)>,

    /// The full decision vector.
    pub vars: Vec<f64>,

    /// Cost of the solution.
    pub cost: f64,

    pub stats: SolveStats,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TrajOptimiser<PanocSolver> {
    /// Create an optimiser using the PANOC solver.
    pub fn new(params: MpcParams) -> Result<Self, ParamsError> {
        let solver = PanocSolver::new(params.solver.clone());
        Self::with_solver(params, solver)
    }
}

impl<S: NlpSolver> TrajOptimiser<S> {
    /// Create an optimiser using any solver.
    pub fn with_solver(params: MpcParams, solver: S) -> Result<Self, ParamsError> {
        params.validate()?;

        Ok(Self { params, solver })
    }

    pub fn params(&self) -> &MpcParams {
        &self.params
    }

    /// Solve the horizon starting from `state` (vehicle frame) and tracking
    /// `poly`.
    ///
    /// A failed solve is always an error, the initial guess is never
    /// returned in place of a solution.
    pub fn solve(&self, state: &VehicleState, poly: &RefPoly)
        -> Result<MpcSolution, SolveError>
    {
        if !(state.is_finite() && poly.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        let problem = MpcProblem::new(&self.params, *state, *poly);

        // Start from coasting, which is also the initial guess's actuation
        let mut actuation = vec![0f64; problem.layout().num_actuation()];
        let stats = self.solver.solve(&problem.condensed(), &mut actuation)?;

        let vars = problem.rollout(&actuation);

        if !vars.iter().all(|v| v.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        let max_residual = problem.max_residual(&vars);
        if !(max_residual <= self.params.solver.feasibility_tolerance) {
            return Err(SolveError::Infeasible { max_residual });
        }

        let view = problem.layout().view(&vars);
        let actuation = view.actuation(0);

        if !(actuation.delta.is_finite() && actuation.a.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        let cost = problem.cost(&vars);
        let predicted_m_vf = problem.predicted_positions(&vars);

        debug!(
            "Solved horizon: delta {:.4} rad, a {:.4}, cost {:.4}",
            actuation.delta, actuation.a, cost
        );
        trace!("Predicted cte: {:?}", view.series(Var::Cte));
        trace!("Predicted trajectory: {:?}", predicted_m_vf);

        Ok(MpcSolution {
            actuation,
            predicted_m_vf,
            vars,
            cost,
            stats,
        })
    }
}
