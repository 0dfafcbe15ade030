//! Nonlinear solver interface and its `optimization_engine` implementation
//!
//! The optimiser only needs "given cost and residual evaluators, bounds and
//! an initial guess, return a feasible local optimum or a failure". The
//! [`NlpProblem`] and [`NlpSolver`] traits capture that contract, and
//! [`PanocSolver`] fulfils it with `optimization_engine`:
//!
//! - A problem with no equality constraints is solved by PANOC directly,
//!   after a diagonal rescaling of the variables. PANOC stops on the size of
//!   its projected gradient step, which is only meaningful once every
//!   variable sees a curvature of about one.
//! - Otherwise the augmented Lagrangian method is used, with PANOC solving
//!   the inner problems. All equality constraints are expressed as a mapping
//!   `F1(u)` which must lie in the zero set.
//!
//! In both cases the variable bounds are a rectangle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::time::Duration;
use log::{debug, trace};
use optimization_engine::{
    alm::*,
    constraints::{BallInf, Rectangle, Zero},
    core::ExitStatus,
    panoc::{PANOCCache, PANOCOptimizer},
    Optimizer, Problem, SolverError,
};
use serde::Serialize;

// Internal
use super::params::{SolverParams, MIN_SOLVE_DURATION_S};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Radius of the box the Lagrange multipliers are kept inside.
const MULTIPLIER_BOUND: f64 = 1e12;

/// Relative step of the central differences used to estimate curvatures.
const CURVATURE_STEP: f64 = 1e-4;

/// Smallest curvature used when scaling a variable.
const MIN_CURVATURE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A bound constrained nonlinear program with equality constraints
/// `g(u) = 0`.
pub trait NlpProblem {
    /// Length of the decision vector.
    fn num_vars(&self) -> usize;

    /// Length of the residual vector.
    fn num_constraints(&self) -> usize;

    fn lower_bounds(&self) -> &[f64];

    fn upper_bounds(&self) -> &[f64];

    /// The scalar cost at `vars`.
    fn cost(&self, vars: &[f64]) -> f64;

    /// The gradient of the cost, written into `grad`.
    fn cost_gradient(&self, vars: &[f64], grad: &mut [f64]);

    /// The residuals `g(vars)`, written into `out`.
    fn constraints(&self, vars: &[f64], out: &mut [f64]);

    /// The product `J_g(vars)^T d`, written into `out`.
    fn constraints_jacobian_t_product(&self, vars: &[f64], d: &[f64], out: &mut [f64]);

    /// Largest absolute residual at `vars`.
    fn max_residual(&self, vars: &[f64]) -> f64 {
        let mut out = vec![0f64; self.num_constraints()];
        self.constraints(vars, &mut out);
        out.iter().fold(0f64, |m, r| m.max(r.abs()))
    }
}

/// Something able to solve an [`NlpProblem`].
pub trait NlpSolver {
    /// Solve `problem` starting from `vars`, leaving the solution in `vars`.
    ///
    /// On error the contents of `vars` are unspecified and must not be used
    /// as a solution.
    fn solve<P: NlpProblem>(&self, problem: &P, vars: &mut [f64])
        -> Result<SolveStats, SolveError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Statistics of a successful solve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SolveStats {
    /// Augmented Lagrangian iterations, 1 for a problem without equality
    /// constraints.
    pub outer_iters: usize,

    /// PANOC iterations over all outer iterations.
    pub inner_iters: usize,

    /// Units: seconds
    pub solve_time_s: f64,
}

/// PANOC based solver, wrapped in the augmented Lagrangian method when the
/// problem has equality constraints.
#[derive(Debug, Clone, Default)]
pub struct PanocSolver {
    params: SolverParams,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Reasons a solve produced no usable solution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("The solver ran out of time")]
    Timeout,

    #[error(
        "The solver hit its iteration limit ({outer_iters} outer, {inner_iters} inner) \
        without converging"
    )]
    NotConverged { outer_iters: usize, inner_iters: usize },

    #[error("The solution violates the dynamics (max residual {max_residual:e})")]
    Infeasible { max_residual: f64 },

    #[error("A non-finite value was found in the problem or its solution")]
    NonFinite,

    #[error("Internal solver error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl PanocSolver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Solve a problem whose only constraints are its bounds.
    fn solve_box<P: NlpProblem>(&self, problem: &P, vars: &mut [f64])
        -> Result<SolveStats, SolveError>
    {
        let p = &self.params;
        let n = vars.len();

        // ---- SCALING ----

        // The solver works on z = u / s
        let scale = jacobi_scaling(problem, vars);
        trace!("Variable scaling: {:?}", scale);

        let unscale = |z: &[f64]| -> Vec<f64> {
            z.iter().zip(scale.iter()).map(|(z, s)| z * s).collect()
        };

        let lower: Vec<f64> = problem.lower_bounds()
            .iter()
            .zip(scale.iter())
            .map(|(b, s)| b / s)
            .collect();
        let upper: Vec<f64> = problem.upper_bounds()
            .iter()
            .zip(scale.iter())
            .map(|(b, s)| b / s)
            .collect();
        let bounds = Rectangle::new(Some(&lower), Some(&upper));

        // ---- PROBLEM DEFINITION ----

        let f = |z: &[f64], cost: &mut f64| -> Result<(), SolverError> {
            *cost = problem.cost(&unscale(z));

            if cost.is_finite() {
                Ok(())
            }
            else {
                Err(SolverError::NotFiniteComputation)
            }
        };

        let df = |z: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
            problem.cost_gradient(&unscale(z), grad);
            grad.iter_mut().zip(scale.iter()).for_each(|(g, s)| *g *= s);

            if grad.iter().all(|g| g.is_finite()) {
                Ok(())
            }
            else {
                Err(SolverError::NotFiniteComputation)
            }
        };

        // ---- SOLVE ----

        let mut z: Vec<f64> = vars.iter().zip(scale.iter()).map(|(u, s)| u / s).collect();

        let mut cache = PANOCCache::new(n, p.tolerance, p.lbfgs_memory);
        let mut optimiser = PANOCOptimizer::new(Problem::new(&bounds, df, f), &mut cache)
            .with_max_iter(p.max_inner_iterations)
            .with_max_duration(Duration::from_secs_f64(p.max_duration_s));

        let status = optimiser.solve(&mut z).map_err(map_solver_error)?;

        trace!("PANOC status: {:?}", status);

        let stats = SolveStats {
            outer_iters: 1,
            inner_iters: status.iterations(),
            solve_time_s: status.solve_time().as_secs_f64(),
        };

        check_exit_status(status.exit_status(), &stats)?;

        // Rounding may push a variable sitting on a bound just outside it
        let (lb, ub) = (problem.lower_bounds(), problem.upper_bounds());
        for i in 0..n {
            vars[i] = (z[i] * scale[i]).max(lb[i]).min(ub[i]);
        }

        Ok(stats)
    }

    /// Solve a problem with equality constraints.
    fn solve_alm<P: NlpProblem>(&self, problem: &P, vars: &mut [f64])
        -> Result<SolveStats, SolveError>
    {
        let p = &self.params;
        let n = vars.len();
        let n1 = problem.num_constraints();

        // ---- PROBLEM DEFINITION ----

        let f = |u: &[f64], cost: &mut f64| -> Result<(), SolverError> {
            *cost = problem.cost(u);
            Ok(())
        };

        let df = |u: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
            problem.cost_gradient(u, grad);
            Ok(())
        };

        let f1 = |u: &[f64], out: &mut [f64]| -> Result<(), SolverError> {
            problem.constraints(u, out);
            Ok(())
        };

        let jf1t = |u: &[f64], d: &[f64], out: &mut [f64]| -> Result<(), SolverError> {
            problem.constraints_jacobian_t_product(u, d, out);
            Ok(())
        };

        let bounds = Rectangle::new(
            Some(problem.lower_bounds()),
            Some(problem.upper_bounds())
        );

        let factory = AlmFactory::new(
            f,
            df,
            Some(f1),
            Some(jf1t),
            NO_MAPPING,
            NO_JACOBIAN_MAPPING,
            Some(Zero::new()),
            0,
        );

        let alm_problem = AlmProblem::new(
            bounds,
            Some(Zero::new()),
            Some(BallInf::new(None, MULTIPLIER_BOUND)),
            |u: &[f64], xi: &[f64], cost: &mut f64| -> Result<(), SolverError> {
                factory.psi(u, xi, cost)
            },
            |u: &[f64], xi: &[f64], grad: &mut [f64]| -> Result<(), SolverError> {
                factory.d_psi(u, xi, grad)
            },
            Some(f1),
            NO_MAPPING,
            n1,
            0,
        );

        // ---- SOLVE ----

        let panoc_cache = PANOCCache::new(n, p.tolerance, p.lbfgs_memory);
        let mut alm_cache = AlmCache::new(panoc_cache, n1, 0);

        let mut optimiser = AlmOptimizer::new(&mut alm_cache, alm_problem)
            .with_delta_tolerance(p.delta_tolerance)
            .with_epsilon_tolerance(p.tolerance)
            .with_initial_inner_tolerance(p.initial_inner_tolerance)
            .with_max_outer_iterations(p.max_outer_iterations)
            .with_max_inner_iterations(p.max_inner_iterations)
            .with_max_duration(Duration::from_secs_f64(p.max_duration_s))
            .with_initial_penalty(p.initial_penalty)
            .with_penalty_update_factor(p.penalty_update_factor);

        let status = optimiser.solve(vars).map_err(map_solver_error)?;

        trace!("ALM status: {:?}", status);

        let stats = SolveStats {
            outer_iters: status.num_outer_iterations(),
            inner_iters: status.num_inner_iterations(),
            solve_time_s: status.solve_time().as_secs_f64(),
        };

        check_exit_status(status.exit_status(), &stats)?;

        Ok(stats)
    }
}

impl NlpSolver for PanocSolver {
    fn solve<P: NlpProblem>(&self, problem: &P, vars: &mut [f64])
        -> Result<SolveStats, SolveError>
    {
        let n = problem.num_vars();

        if vars.len() != n {
            return Err(SolveError::Internal(format!(
                "Expected a decision vector of length {}, found {}", n, vars.len()
            )));
        }

        let (lb, ub) = (problem.lower_bounds(), problem.upper_bounds());
        if lb.len() != n || ub.len() != n || lb.iter().zip(ub.iter()).any(|(l, u)| !(l <= u)) {
            return Err(SolveError::Internal(String::from("Inconsistent variable bounds")));
        }

        // optimization_engine cannot report on a solve which has no time to
        // start
        if !(self.params.max_duration_s >= MIN_SOLVE_DURATION_S) {
            return Err(SolveError::Timeout);
        }

        let stats = if problem.num_constraints() == 0 {
            self.solve_box(problem, vars)?
        }
        else {
            self.solve_alm(problem, vars)?
        };

        // ---- CHECK ----

        if !vars.iter().all(|v| v.is_finite()) {
            return Err(SolveError::NonFinite);
        }

        let max_residual = problem.max_residual(vars);
        if !(max_residual <= self.params.feasibility_tolerance) {
            return Err(SolveError::Infeasible { max_residual });
        }

        debug!(
            "Solve converged in {} outer, {} inner iterations ({:.3} s, max residual {:e})",
            stats.outer_iters, stats.inner_iters, stats.solve_time_s, max_residual
        );

        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Scale factors `s_i = 1 / sqrt(|H_ii|)` from the diagonal of the cost's
/// Hessian at `u`, estimated by central differences of the gradient.
fn jacobi_scaling<P: NlpProblem>(problem: &P, u: &[f64]) -> Vec<f64> {
    let n = u.len();
    let mut shifted = u.to_vec();
    let mut grad_up = vec![0f64; n];
    let mut grad_down = vec![0f64; n];

    (0..n)
        .map(|i| {
            let h = CURVATURE_STEP * (1.0 + u[i].abs());

            shifted[i] = u[i] + h;
            problem.cost_gradient(&shifted, &mut grad_up);
            shifted[i] = u[i] - h;
            problem.cost_gradient(&shifted, &mut grad_down);
            shifted[i] = u[i];

            let curvature = ((grad_up[i] - grad_down[i]) / (2.0 * h)).abs();

            if curvature.is_finite() {
                1.0 / curvature.max(MIN_CURVATURE).sqrt()
            }
            else {
                1.0
            }
        })
        .collect()
}

fn map_solver_error(e: SolverError) -> SolveError {
    match e {
        SolverError::NotFiniteComputation => SolveError::NonFinite,
        e => SolveError::Internal(format!("{:?}", e)),
    }
}

fn check_exit_status(status: ExitStatus, stats: &SolveStats) -> Result<(), SolveError> {
    match status {
        ExitStatus::Converged => Ok(()),
        ExitStatus::NotConvergedOutOfTime => Err(SolveError::Timeout),
        ExitStatus::NotConvergedIterations => Err(SolveError::NotConverged {
            outer_iters: stats.outer_iters,
            inner_iters: stats.inner_iters,
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::thread;

    /// Separable quadratic `sum w_i (u_i - c_i)^2` in a box, optionally
    /// constrained to `u_0 + u_1 = 1`.
    struct Quadratic {
        weights: Vec<f64>,
        targets: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
        sum_to_one: bool,
    }

    /// Rosenbrock's function in `[-5, 5]^2`, sleeping on every cost
    /// evaluation. Optionally constrained to `u_0 = u_1`.
    struct SlowRosenbrock {
        bounds: [Vec<f64>; 2],
        diagonal: bool,
    }

    impl NlpProblem for Quadratic {
        fn num_vars(&self) -> usize {
            self.weights.len()
        }

        fn num_constraints(&self) -> usize {
            if self.sum_to_one { 1 } else { 0 }
        }

        fn lower_bounds(&self) -> &[f64] {
            &self.lower
        }

        fn upper_bounds(&self) -> &[f64] {
            &self.upper
        }

        fn cost(&self, u: &[f64]) -> f64 {
            (0..u.len())
                .map(|i| self.weights[i] * (u[i] - self.targets[i]).powi(2))
                .sum()
        }

        fn cost_gradient(&self, u: &[f64], grad: &mut [f64]) {
            for i in 0..u.len() {
                grad[i] = 2.0 * self.weights[i] * (u[i] - self.targets[i]);
            }
        }

        fn constraints(&self, u: &[f64], out: &mut [f64]) {
            if self.sum_to_one {
                out[0] = u[0] + u[1] - 1.0;
            }
        }

        fn constraints_jacobian_t_product(&self, _: &[f64], d: &[f64], out: &mut [f64]) {
            out.iter_mut().for_each(|o| *o = 0.0);
            if self.sum_to_one {
                out[0] = d[0];
                out[1] = d[0];
            }
        }
    }

    impl NlpProblem for SlowRosenbrock {
        fn num_vars(&self) -> usize {
            2
        }

        fn num_constraints(&self) -> usize {
            if self.diagonal { 1 } else { 0 }
        }

        fn lower_bounds(&self) -> &[f64] {
            &self.bounds[0]
        }

        fn upper_bounds(&self) -> &[f64] {
            &self.bounds[1]
        }

        fn cost(&self, u: &[f64]) -> f64 {
            thread::sleep(Duration::from_millis(2));
            (1.0 - u[0]).powi(2) + 100.0 * (u[1] - u[0] * u[0]).powi(2)
        }

        fn cost_gradient(&self, u: &[f64], grad: &mut [f64]) {
            grad[0] = -2.0 * (1.0 - u[0]) - 400.0 * u[0] * (u[1] - u[0] * u[0]);
            grad[1] = 200.0 * (u[1] - u[0] * u[0]);
        }

        fn constraints(&self, u: &[f64], out: &mut [f64]) {
            if self.diagonal {
                out[0] = u[0] - u[1];
            }
        }

        fn constraints_jacobian_t_product(&self, _: &[f64], d: &[f64], out: &mut [f64]) {
            out.iter_mut().for_each(|o| *o = 0.0);
            if self.diagonal {
                out[0] = d[0];
                out[1] = -d[0];
            }
        }
    }

    fn slow_rosenbrock(diagonal: bool) -> SlowRosenbrock {
        SlowRosenbrock {
            bounds: [vec![-5.0; 2], vec![5.0; 2]],
            diagonal,
        }
    }

    #[test]
    fn test_badly_scaled_box() {
        // Curvatures eight orders of magnitude apart, the second variable
        // ends up on its upper bound
        let problem = Quadratic {
            weights: vec![1e8, 1.0],
            targets: vec![0.1, 0.5],
            lower: vec![-1.0, -1.0],
            upper: vec![1.0, 0.3],
            sum_to_one: false,
        };
        let solver = PanocSolver::default();

        let mut u = vec![0.0, 0.0];
        let stats = solver.solve(&problem, &mut u).unwrap();

        assert_abs_diff_eq!(u[0], 0.1, epsilon = 1e-6);
        assert_abs_diff_eq!(u[1], 0.3, epsilon = 1e-6);
        assert_eq!(stats.outer_iters, 1);
        assert!(stats.solve_time_s <= solver.params().max_duration_s);
    }

    #[test]
    fn test_jacobi_scaling() {
        let problem = Quadratic {
            weights: vec![1e8, 1.0, 0.0],
            targets: vec![0.0; 3],
            lower: vec![-1.0; 3],
            upper: vec![1.0; 3],
            sum_to_one: false,
        };

        let s = jacobi_scaling(&problem, &[0.5, -2.0, 0.0]);

        assert_abs_diff_eq!(s[0], 1.0 / 2e8_f64.sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(s[1], 1.0 / 2f64.sqrt(), epsilon = 1e-6);
        assert_abs_diff_eq!(s[2], 1.0 / MIN_CURVATURE.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_equality_constrained() {
        let problem = Quadratic {
            weights: vec![1.0, 1.0],
            targets: vec![1.0, 2.0],
            lower: vec![-10.0; 2],
            upper: vec![10.0; 2],
            sum_to_one: true,
        };
        let solver = PanocSolver::default();

        let mut u = vec![0.0, 0.0];
        let stats = solver.solve(&problem, &mut u).unwrap();

        assert_abs_diff_eq!(u[0], 0.0, epsilon = 1e-2);
        assert_abs_diff_eq!(u[1], 1.0, epsilon = 1e-2);
        assert!(stats.outer_iters >= 1);
        assert!(problem.max_residual(&u) <= solver.params().feasibility_tolerance);
    }

    #[test]
    fn test_timeout() {
        // Every cost evaluation alone takes longer than the budget
        let solver = PanocSolver::new(SolverParams {
            max_duration_s: MIN_SOLVE_DURATION_S,
            tolerance: 1e-12,
            ..Default::default()
        });

        for diagonal in [false, true].iter() {
            let mut u = vec![-1.5, 0.9];
            assert_eq!(
                solver.solve(&slow_rosenbrock(*diagonal), &mut u),
                Err(SolveError::Timeout),
                "with equality constraint: {}", diagonal
            );
        }
    }

    #[test]
    fn test_budget_below_minimum() {
        let solver = PanocSolver::new(SolverParams {
            max_duration_s: 1e-9,
            ..Default::default()
        });

        for diagonal in [false, true].iter() {
            let mut u = vec![-1.5, 0.9];
            assert_eq!(
                solver.solve(&slow_rosenbrock(*diagonal), &mut u),
                Err(SolveError::Timeout)
            );
        }
    }

    #[test]
    fn test_bad_inputs() {
        let solver = PanocSolver::default();

        let mut u = vec![0.0; 3];
        assert!(matches!(
            solver.solve(&slow_rosenbrock(false), &mut u),
            Err(SolveError::Internal(_))
        ));

        let problem = Quadratic {
            weights: vec![1.0],
            targets: vec![0.0],
            lower: vec![1.0],
            upper: vec![-1.0],
            sum_to_one: false,
        };
        let mut u = vec![0.0];
        assert!(matches!(solver.solve(&problem, &mut u), Err(SolveError::Internal(_))));
    }
}
