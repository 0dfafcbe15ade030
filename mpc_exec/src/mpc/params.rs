//! Parameters structure for the trajectory optimiser

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use util::maths::deg2rad;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Shortest wall clock budget a solve may be given.
///
/// Units: seconds
pub const MIN_SOLVE_DURATION_S: f64 = 1e-3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the trajectory optimiser.
///
/// Any field missing from a parameter file takes its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcParams {

    // ---- HORIZON ----

    /// Number of steps in the prediction horizon.
    pub horizon: usize,

    /// Length of each step.
    ///
    /// Units: seconds
    pub dt_s: f64,

    // ---- VEHICLE ----

    /// Distance between the front axle and the centre of gravity, tuned so
    /// the model's turning radius matches the vehicle's.
    ///
    /// Units: meters
    pub lf_m: f64,

    /// Speed the optimiser tries to hold.
    pub ref_speed: f64,

    /// Magnitude of the steering angle limit.
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Magnitude of the acceleration limit, normalised.
    pub max_accel: f64,

    // ---- COST ----

    pub weights: CostWeights,

    // ---- SOLVER ----

    pub solver: SolverParams,
}

/// Weights applied to each term of the cost function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Squared cross track error
    pub cte: f64,

    /// Squared heading error
    pub epsi: f64,

    /// Squared deviation from the reference speed
    pub speed: f64,

    /// Squared steering angle
    pub steer: f64,

    /// Squared acceleration
    pub accel: f64,

    /// Squared change in steering between steps
    pub steer_rate: f64,

    /// Squared change in acceleration between steps
    pub accel_rate: f64,
}

/// Tuning for the nonlinear solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Wall clock budget for one solve, at least [`MIN_SOLVE_DURATION_S`].
    ///
    /// Units: seconds
    pub max_duration_s: f64,

    /// Tolerance on PANOC's fixed point residual. Problems with bounds only
    /// are rescaled to unit curvature first, so this is in scaled
    /// variables for them.
    pub tolerance: f64,

    /// Inner tolerance used in the first outer iteration, must not be lower
    /// than `tolerance`.
    pub initial_inner_tolerance: f64,

    /// Tolerance on the constraint violation between outer iterations.
    pub delta_tolerance: f64,

    /// Augmented Lagrangian iterations, only used for problems with
    /// equality constraints.
    pub max_outer_iterations: usize,

    /// PANOC iterations per solve, or per outer iteration with equality
    /// constraints.
    pub max_inner_iterations: usize,

    /// Initial penalty on the constraint violation.
    pub initial_penalty: f64,

    /// Factor the penalty is multiplied by when the violation does not drop.
    pub penalty_update_factor: f64,

    /// Number of past iterates kept by the L-BFGS direction.
    pub lbfgs_memory: usize,

    /// Largest absolute constraint residual accepted in a converged
    /// solution.
    pub feasibility_tolerance: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Invalid optimiser configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamsError {
    #[error("The horizon must contain at least 2 steps, found {0}")]
    HorizonTooShort(usize),

    #[error("Parameter `{name}` must be strictly positive, found {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("Cost weight `{name}` must be non-negative, found {value}")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("The penalty update factor must be greater than 1, found {0}")]
    PenaltyFactorTooLow(f64),

    #[error(
        "The initial inner tolerance ({initial}) must not be lower than the tolerance \
        ({tolerance})"
    )]
    InnerToleranceTooLow { initial: f64, tolerance: f64 },

    #[error("The solve budget of {value} s is below the minimum of {min} s")]
    BudgetTooShort { value: f64, min: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MpcParams {
    fn default() -> Self {
        Self {
            horizon: 10,
            dt_s: 0.1,
            lf_m: 2.67,
            ref_speed: 100.0,
            max_steer_rad: deg2rad(25.0),
            max_accel: 1.0,
            weights: CostWeights::default(),
            solver: SolverParams::default(),
        }
    }
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            cte: 2500.0,
            epsi: 2000.0,
            speed: 1.0,
            steer: 5.0,
            accel: 5.0,
            steer_rate: 200.0,
            accel_rate: 10.0,
        }
    }
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_duration_s: 0.5,
            tolerance: 1e-5,
            initial_inner_tolerance: 1e-1,
            delta_tolerance: 1e-3,
            max_outer_iterations: 30,
            max_inner_iterations: 2000,
            initial_penalty: 1e3,
            penalty_update_factor: 5.0,
            lbfgs_memory: 20,
            feasibility_tolerance: 1e-2,
        }
    }
}

impl MpcParams {
    /// Check the parameters describe a well posed problem.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.horizon < 2 {
            return Err(ParamsError::HorizonTooShort(self.horizon));
        }

        let positives = [
            ("dt_s", self.dt_s),
            ("lf_m", self.lf_m),
            ("max_steer_rad", self.max_steer_rad),
            ("max_accel", self.max_accel),
            ("solver.max_duration_s", self.solver.max_duration_s),
            ("solver.tolerance", self.solver.tolerance),
            ("solver.delta_tolerance", self.solver.delta_tolerance),
            ("solver.initial_penalty", self.solver.initial_penalty),
            ("solver.feasibility_tolerance", self.solver.feasibility_tolerance),
        ];
        for &(name, value) in positives.iter() {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ParamsError::NotPositive { name, value });
            }
        }

        if self.solver.max_duration_s < MIN_SOLVE_DURATION_S {
            return Err(ParamsError::BudgetTooShort {
                value: self.solver.max_duration_s,
                min: MIN_SOLVE_DURATION_S,
            });
        }

        let counts = [
            ("solver.max_outer_iterations", self.solver.max_outer_iterations),
            ("solver.max_inner_iterations", self.solver.max_inner_iterations),
            ("solver.lbfgs_memory", self.solver.lbfgs_memory),
        ];
        for &(name, value) in counts.iter() {
            if value == 0 {
                return Err(ParamsError::NotPositive { name, value: 0.0 });
            }
        }

        if !(self.solver.penalty_update_factor > 1.0) {
            return Err(ParamsError::PenaltyFactorTooLow(self.solver.penalty_update_factor));
        }

        if self.solver.initial_inner_tolerance < self.solver.tolerance {
            return Err(ParamsError::InnerToleranceTooLow {
                initial: self.solver.initial_inner_tolerance,
                tolerance: self.solver.tolerance,
            });
        }

        let w = &self.weights;
        let weights = [
            ("cte", w.cte),
            ("epsi", w.epsi),
            ("speed", w.speed),
            ("steer", w.steer),
            ("accel", w.accel),
            ("steer_rate", w.steer_rate),
            ("accel_rate", w.accel_rate),
        ];
        for &(name, value) in weights.iter() {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ParamsError::NegativeWeight { name, value });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = MpcParams::default();

        assert_eq!(p.horizon, 10);
        assert_eq!(p.ref_speed, 100.0);
        assert!((p.max_steer_rad - 0.436332).abs() < 1e-6);
        assert_eq!(p.weights.cte, 2500.0);
        assert_eq!(p.weights.steer_rate, 200.0);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let p: MpcParams = util::params::from_str(
            "horizon = 12\nref_speed = 40.0\n[weights]\ncte = 100.0\n"
        ).unwrap();

        assert_eq!(p.horizon, 12);
        assert_eq!(p.ref_speed, 40.0);
        assert_eq!(p.weights.cte, 100.0);
        assert_eq!(p.weights.epsi, 2000.0);
        assert_eq!(p.dt_s, 0.1);
        assert_eq!(p.solver, SolverParams::default());
    }

    #[test]
    fn test_validate() {
        let mut p = MpcParams::default();
        p.horizon = 1;
        assert_eq!(p.validate(), Err(ParamsError::HorizonTooShort(1)));

        let mut p = MpcParams::default();
        p.lf_m = 0.0;
        assert!(matches!(p.validate(), Err(ParamsError::NotPositive { name: "lf_m", .. })));

        let mut p = MpcParams::default();
        p.weights.accel = -1.0;
        assert!(matches!(p.validate(), Err(ParamsError::NegativeWeight { name: "accel", .. })));

        let mut p = MpcParams::default();
        p.solver.initial_inner_tolerance = 1e-6;
        assert!(matches!(p.validate(), Err(ParamsError::InnerToleranceTooLow { .. })));
    }

    #[test]
    fn test_validate_budget() {
        let mut p = MpcParams::default();

        p.solver.max_duration_s = 1e-9;
        assert_eq!(
            p.validate(),
            Err(ParamsError::BudgetTooShort { value: 1e-9, min: MIN_SOLVE_DURATION_S })
        );

        p.solver.max_duration_s = 0.0;
        assert!(matches!(
            p.validate(),
            Err(ParamsError::NotPositive { name: "solver.max_duration_s", .. })
        ));

        p.solver.max_duration_s = MIN_SOLVE_DURATION_S;
        assert!(p.validate().is_ok());
    }
}
