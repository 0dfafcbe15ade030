//! The finite horizon optimal control problem
//!
//! [`MpcProblem`] evaluates the cost, the constraint residuals and their
//! derivatives for one control cycle. The formulas are written once,
//! generically over [`DualNum`], and derivatives are taken with forward mode
//! dual numbers.
//!
//! Every cost term and every dynamics block only touches a handful of
//! variables, so derivatives are accumulated term by term, seeding one of
//! the term's variables at a time, rather than over the whole vector.
//!
//! [`CondensedProblem`] is the same program over the actuation alone. The
//! states are rolled out from the initial state, so the dynamics hold by
//! construction and only the actuator bounds are left.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use num_dual::{Dual64, DualNum};

// Internal
use super::{
    layout::{Var, VarLayout, ACTUATORS, STATES},
    params::{CostWeights, MpcParams},
    solver::NlpProblem,
};
use crate::model::{lift, tracking_step, Actuation, VehicleState, NUM_ACTUATORS, NUM_STATES};
use crate::ref_fit::RefPoly;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Bound used for variables that are not limited.
pub const UNBOUNDED: f64 = 1.0e19;

/// Number of variables one dynamics block depends on: the previous state and
/// the previous actuation.
const NUM_STEP_INPUTS: usize = NUM_STATES + NUM_ACTUATORS;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One control cycle's optimisation problem over the full decision vector.
#[derive(Debug, Clone)]
pub struct MpcProblem {
    layout: VarLayout,
    dt_s: f64,
    lf_m: f64,
    ref_speed: f64,
    weights: CostWeights,

    /// The state the horizon starts from.
    init: VehicleState,

    /// The reference curve in the vehicle frame.
    poly: RefPoly,

    lower: Vec<f64>,
    upper: Vec<f64>,
}

/// [`MpcProblem`] with the states eliminated, the decision vector being
/// `[delta(N-1) | a(N-1)]`.
#[derive(Debug, Clone, Copy)]
pub struct CondensedProblem<'a> {
    full: &'a MpcProblem,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MpcProblem {
    /// Build the problem for the given parameters, initial state and
    /// reference curve.
    pub fn new(params: &MpcParams, init: VehicleState, poly: RefPoly) -> Self {
        let layout = VarLayout::new(params.horizon);

        let mut lower = vec![-UNBOUNDED; layout.num_vars()];
        let mut upper = vec![UNBOUNDED; layout.num_vars()];

        for (var, bound) in [
            (Var::Delta, params.max_steer_rad),
            (Var::A, params.max_accel)
        ].iter() {
            for i in layout.range(*var) {
                lower[i] = -bound;
                upper[i] = *bound;
            }
        }

        Self {
            layout,
            dt_s: params.dt_s,
            lf_m: params.lf_m,
            ref_speed: params.ref_speed,
            weights: params.weights,
            init,
            poly,
            lower,
            upper,
        }
    }

    pub fn layout(&self) -> &VarLayout {
        &self.layout
    }

    pub fn init(&self) -> &VehicleState {
        &self.init
    }

    /// A dynamically feasible starting point.
    ///
    /// The initial state is rolled forward through the dynamics with zero
    /// actuation, so every residual is zero at the guess.
    pub fn initial_guess(&self) -> Vec<f64> {
        self.rollout(&vec![0f64; self.layout.num_actuation()])
    }

    /// The full decision vector obtained by applying `actuation`, laid out
    /// as `[delta(N-1) | a(N-1)]`, from the initial state.
    pub fn rollout(&self, actuation: &[f64]) -> Vec<f64> {
        self.rollout_generic(actuation)
    }

    /// Generic rollout, see [`MpcProblem::rollout`].
    pub fn rollout_generic<D: DualNum<f64> + Copy>(&self, actuation: &[D]) -> Vec<D> {
        let l = &self.layout;
        debug_assert_eq!(actuation.len(), l.num_actuation());

        let mut vars = vec![lift::<D>(0.0); l.num_vars()];
        vars[l.actuation_range()].copy_from_slice(actuation);

        let mut state = VehicleState::from_array(self.init.to_array().map(lift::<D>));
        for t in 0..l.horizon() {
            if t > 0 {
                let act = Actuation::from_array(ACTUATORS.map(|v| vars[l.index(v, t - 1)]));
                state = tracking_step(&state, &act, &self.poly, self.lf_m, self.dt_s);
            }

            for (var, value) in STATES.iter().zip(state.to_array().iter()) {
                vars[l.index(*var, t)] = *value;
            }
        }

        vars
    }

    /// The problem over the actuation alone.
    pub fn condensed(&self) -> CondensedProblem<'_> {
        CondensedProblem { full: self }
    }

    /// Generic cost evaluation.
    pub fn cost_generic<D: DualNum<f64> + Copy>(&self, vars: &[D]) -> D {
        let l = &self.layout;
        let view = l.view(vars);
        let n = l.horizon();
        let mut cost: D = lift::<D>(0.0);

        for t in 0..n {
            cost = cost + self.tracking_cost(
                view.get(Var::Cte, t), view.get(Var::Epsi, t), view.get(Var::V, t)
            );
        }

        for t in 0..n - 1 {
            cost = cost + self.actuator_cost(view.get(Var::Delta, t), view.get(Var::A, t));
        }

        for t in 0..n.saturating_sub(2) {
            cost = cost + self.rate_cost(
                [view.get(Var::Delta, t), view.get(Var::Delta, t + 1)],
                [view.get(Var::A, t), view.get(Var::A, t + 1)]
            );
        }

        cost
    }

    /// Generic residual evaluation for one step.
    ///
    /// Step 0 pins the initial state, later steps hold the difference
    /// between the decision variable and the model's prediction from the
    /// previous step.
    pub fn residual_generic<D: DualNum<f64> + Copy>(
        &self,
        state: &VehicleState<D>,
        prev: Option<(&VehicleState<D>, &Actuation<D>)>
    ) -> [D; NUM_STATES] {
        let target: [D; NUM_STATES] = match prev {
            Some((s, a)) => tracking_step(s, a, &self.poly, self.lf_m, self.dt_s).to_array(),
            None => self.init.to_array().map(lift::<D>),
        };

        let mut r = state.to_array();
        for k in 0..NUM_STATES {
            r[k] = r[k] - target[k];
        }

        r
    }

    /// The predicted positions for steps `1..N`.
    pub fn predicted_positions(&self, vars: &[f64]) -> Vec<(f64, f64)> {
        let view = self.layout.view(vars);

        (1..self.layout.horizon())
            .map(|t| (view.get(Var::X, t), view.get(Var::Y, t)))
            .collect()
    }

    // ---- COST TERMS ----

    fn tracking_cost<D: DualNum<f64> + Copy>(&self, cte: D, epsi: D, v: D) -> D {
        let w = &self.weights;
        let dv = v - lift::<D>(self.ref_speed);

        cte * cte * lift::<D>(w.cte)
            + epsi * epsi * lift::<D>(w.epsi)
            + dv * dv * lift::<D>(w.speed)
    }

    fn actuator_cost<D: DualNum<f64> + Copy>(&self, delta: D, a: D) -> D {
        let w = &self.weights;

        delta * delta * lift::<D>(w.steer) + a * a * lift::<D>(w.accel)
    }

    fn rate_cost<D: DualNum<f64> + Copy>(&self, delta: [D; 2], a: [D; 2]) -> D {
        let dd = delta[1] - delta[0];
        let da = a[1] - a[0];

        let w = &self.weights;

        dd * dd * lift::<D>(w.steer_rate) + da * da * lift::<D>(w.accel_rate)
    }
}

impl NlpProblem for MpcProblem {
    fn num_vars(&self) -> usize {
        self.layout.num_vars()
    }

    fn num_constraints(&self) -> usize {
        self.layout.num_constraints()
    }

    fn lower_bounds(&self) -> &[f64] {
        &self.lower
    }

    fn upper_bounds(&self) -> &[f64] {
        &self.upper
    }

    fn cost(&self, vars: &[f64]) -> f64 {
        self.cost_generic(vars)
    }

    fn cost_gradient(&self, vars: &[f64], grad: &mut [f64]) {
        let l = self.layout;
        let n = l.horizon();

        grad.iter_mut().for_each(|g| *g = 0.0);

        for t in 0..n {
            let idx = [l.index(Var::Cte, t), l.index(Var::Epsi, t), l.index(Var::V, t)];
            accumulate_gradient(vars, &idx, grad, |x| self.tracking_cost(x[0], x[1], x[2]));
        }

        for t in 0..n - 1 {
            let idx = [l.index(Var::Delta, t), l.index(Var::A, t)];
            accumulate_gradient(vars, &idx, grad, |x| self.actuator_cost(x[0], x[1]));
        }

        for t in 0..n.saturating_sub(2) {
            let idx = [
                l.index(Var::Delta, t),
                l.index(Var::Delta, t + 1),
                l.index(Var::A, t),
                l.index(Var::A, t + 1),
            ];
            accumulate_gradient(vars, &idx, grad, |x| self.rate_cost([x[0], x[1]], [x[2], x[3]]));
        }
    }

    fn constraints(&self, vars: &[f64], out: &mut [f64]) {
        let l = &self.layout;
        let view = l.view(vars);

        for t in 0..l.horizon() {
            let state = view.state(t);
            let r = if t == 0 {
                self.residual_generic(&state, None)
            }
            else {
                self.residual_generic(&state, Some((&view.state(t - 1), &view.actuation(t - 1))))
            };

            for (var, value) in STATES.iter().zip(r.iter()) {
                out[l.constraint_index(*var, t)] = *value;
            }
        }
    }

    fn constraints_jacobian_t_product(&self, vars: &[f64], d: &[f64], out: &mut [f64]) {
        let l = self.layout;

        out.iter_mut().for_each(|o| *o = 0.0);

        // Every residual depends on its own variable with unit slope
        for t in 0..l.horizon() {
            for var in STATES.iter() {
                out[l.index(*var, t)] += d[l.constraint_index(*var, t)];
            }
        }

        // Dynamics blocks also depend on the previous state and actuation
        // through the negated model prediction
        for t in 1..l.horizon() {
            let input_idx = step_input_indices(&l, t - 1);
            let inputs = input_idx.map(|i| vars[i]);

            for j in 0..NUM_STEP_INPUTS {
                let mut seeded = inputs.map(Dual64::from);
                seeded[j].eps = 1.0;

                let mut s = [Dual64::from(0.0); NUM_STATES];
                s.copy_from_slice(&seeded[..NUM_STATES]);
                let state = VehicleState::from_array(s);
                let act = Actuation {
                    delta: seeded[NUM_STATES],
                    a: seeded[NUM_STATES + 1],
                };

                let pred = tracking_step(&state, &act, &self.poly, self.lf_m, self.dt_s);

                let dot = STATES
                    .iter()
                    .zip(pred.to_array().iter())
                    .fold(0f64, |acc, (var, p)| acc + d[l.constraint_index(*var, t)] * p.eps);

                out[input_idx[j]] -= dot;
            }
        }
    }
}

impl<'a> CondensedProblem<'a> {
    pub fn full(&self) -> &'a MpcProblem {
        self.full
    }

    fn cost_generic<D: DualNum<f64> + Copy>(&self, actuation: &[D]) -> D {
        self.full.cost_generic(&self.full.rollout_generic(actuation))
    }
}

impl NlpProblem for CondensedProblem<'_> {
    fn num_vars(&self) -> usize {
        self.full.layout.num_actuation()
    }

    fn num_constraints(&self) -> usize {
        0
    }

    fn lower_bounds(&self) -> &[f64] {
        &self.full.lower[self.full.layout.actuation_range()]
    }

    fn upper_bounds(&self) -> &[f64] {
        &self.full.upper[self.full.layout.actuation_range()]
    }

    fn cost(&self, actuation: &[f64]) -> f64 {
        self.cost_generic(actuation)
    }

    /// Every actuator influences every later state, so each one is seeded
    /// in turn over a whole rollout.
    fn cost_gradient(&self, actuation: &[f64], grad: &mut [f64]) {
        let mut seeded: Vec<Dual64> = actuation.iter().map(|u| Dual64::from(*u)).collect();

        for j in 0..seeded.len() {
            seeded[j].eps = 1.0;
            grad[j] = self.cost_generic(&seeded).eps;
            seeded[j].eps = 0.0;
        }
    }

    fn constraints(&self, _: &[f64], _: &mut [f64]) {}

    fn constraints_jacobian_t_product(&self, _: &[f64], _: &[f64], out: &mut [f64]) {
        out.iter_mut().for_each(|o| *o = 0.0);
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Indices of the variables the dynamics block from step `t` to `t + 1`
/// depends on, states first then actuators.
fn step_input_indices(l: &VarLayout, t: usize) -> [usize; NUM_STEP_INPUTS] {
    let mut idx = [0usize; NUM_STEP_INPUTS];

    for (k, var) in STATES.iter().chain(ACTUATORS.iter()).enumerate() {
        idx[k] = l.index(*var, t);
    }

    idx
}

/// Add the gradient of a term over the variables at `idx` into `grad`.
fn accumulate_gradient<F>(vars: &[f64], idx: &[usize], grad: &mut [f64], term: F)
where
    F: Fn(&[Dual64]) -> Dual64
{
    let mut local = [Dual64::from(0.0); 4];
    let local = &mut local[..idx.len()];

    for j in 0..idx.len() {
        for (k, i) in idx.iter().enumerate() {
            local[k] = Dual64::from(vars[*i]);
        }
        local[j].eps = 1.0;

        grad[idx[j]] += term(local).eps;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_problem() -> MpcProblem {
        let init = VehicleState {
            x: 0.3,
            y: -0.2,
            psi: 0.05,
            v: 30.0,
            cte: 0.4,
            epsi: -0.1,
        };
        let poly = RefPoly::new([0.5, 0.1, -0.01, 0.0005]);

        MpcProblem::new(&MpcParams::default(), init, poly)
    }

    /// A deterministic, not particularly feasible, decision vector.
    fn scrambled_vars(p: &MpcProblem) -> Vec<f64> {
        (0..p.num_vars())
            .map(|i| {
                let f = i as f64;
                0.3 * (0.7 * f).sin() + 0.01 * f
            })
            .collect()
    }

    #[test]
    fn test_bounds() {
        let p = test_problem();
        let l = p.layout();
        let params = MpcParams::default();

        for i in l.range(Var::X) {
            assert_eq!(p.lower_bounds()[i], -UNBOUNDED);
            assert_eq!(p.upper_bounds()[i], UNBOUNDED);
        }
        for i in l.range(Var::Delta) {
            assert_eq!(p.lower_bounds()[i], -params.max_steer_rad);
            assert_eq!(p.upper_bounds()[i], params.max_steer_rad);
        }
        for i in l.range(Var::A) {
            assert_eq!(p.lower_bounds()[i], -1.0);
            assert_eq!(p.upper_bounds()[i], 1.0);
        }
    }

    #[test]
    fn test_initial_state_pinned() {
        let p = test_problem();
        let l = *p.layout();

        // The initial state at t = 0 and zeros elsewhere
        let mut vars = vec![0f64; p.num_vars()];
        for (var, value) in STATES.iter().zip(p.init().to_array().iter()) {
            vars[l.index(*var, 0)] = *value;
        }

        let mut out = vec![std::f64::NAN; p.num_constraints()];
        p.constraints(&vars, &mut out);

        for var in STATES.iter() {
            assert_eq!(out[l.constraint_index(*var, 0)], 0.0);
        }
    }

    #[test]
    fn test_dynamics_residuals() {
        let p = test_problem();
        let l = *p.layout();
        let params = MpcParams::default();
        let vars = scrambled_vars(&p);
        let view = l.view(&vars);

        let mut out = vec![0f64; p.num_constraints()];
        p.constraints(&vars, &mut out);

        for t in 1..l.horizon() {
            let x = view.get(Var::X, t - 1);
            let y = view.get(Var::Y, t - 1);
            let psi = view.get(Var::Psi, t - 1);
            let v = view.get(Var::V, t - 1);
            let epsi = view.get(Var::Epsi, t - 1);
            let delta = view.get(Var::Delta, t - 1);
            let a = view.get(Var::A, t - 1);

            let c = p.poly.coeffs;
            let f = c[0] + c[1] * x + c[2] * x * x + c[3] * x * x * x;
            let psi_des = (c[1] + 2.0 * c[2] * x + 3.0 * c[3] * x * x).atan();
            let dt = params.dt_s;
            let lf = params.lf_m;

            let expected = [
                (Var::X, x + v * psi.cos() * dt),
                (Var::Y, y + v * psi.sin() * dt),
                (Var::Psi, psi - v / lf * delta * dt),
                (Var::V, v + a * dt),
                (Var::Cte, (f - y) + v * epsi.sin() * dt),
                (Var::Epsi, (psi - psi_des) - v / lf * delta * dt),
            ];

            for (var, pred) in expected.iter() {
                assert_abs_diff_eq!(
                    out[l.constraint_index(*var, t)],
                    view.get(*var, t) - pred,
                    epsilon = 1e-12
                );
            }
        }
    }

    #[test]
    fn test_initial_guess_feasible() {
        let p = test_problem();
        let vars = p.initial_guess();

        assert_eq!(vars.len(), p.num_vars());
        assert_eq!(p.max_residual(&vars), 0.0);

        let l = p.layout();
        assert!(l.range(Var::Delta).chain(l.range(Var::A)).all(|i| vars[i] == 0.0));
    }

    #[test]
    fn test_cost_gradient_matches_finite_difference() {
        let p = test_problem();
        let vars = scrambled_vars(&p);

        let mut grad = vec![0f64; p.num_vars()];
        p.cost_gradient(&vars, &mut grad);

        let h = 1e-6;
        for i in 0..p.num_vars() {
            let mut up = vars.clone();
            let mut down = vars.clone();
            up[i] += h;
            down[i] -= h;

            let fd = (p.cost(&up) - p.cost(&down)) / (2.0 * h);
            assert_abs_diff_eq!(grad[i], fd, epsilon = 1e-3 * (1.0 + fd.abs()));
        }
    }

    #[test]
    fn test_jacobian_t_product_matches_finite_difference() {
        let p = test_problem();
        let vars = scrambled_vars(&p);
        let d: Vec<f64> = (0..p.num_constraints()).map(|i| (1.3 * i as f64).cos()).collect();

        let mut jtd = vec![0f64; p.num_vars()];
        p.constraints_jacobian_t_product(&vars, &d, &mut jtd);

        // d . g(u) differentiated by central differences gives (J^T d)_i
        let dot = |u: &[f64]| {
            let mut g = vec![0f64; p.num_constraints()];
            p.constraints(u, &mut g);
            g.iter().zip(d.iter()).map(|(a, b)| a * b).sum::<f64>()
        };

        let h = 1e-6;
        for i in 0..p.num_vars() {
            let mut up = vars.clone();
            let mut down = vars.clone();
            up[i] += h;
            down[i] -= h;

            let fd = (dot(&up) - dot(&down)) / (2.0 * h);
            assert_abs_diff_eq!(jtd[i], fd, epsilon = 1e-5 * (1.0 + fd.abs()));
        }
    }

    #[test]
    fn test_rollout_feasible() {
        let p = test_problem();
        let l = *p.layout();
        let actuation: Vec<f64> = (0..l.num_actuation())
            .map(|i| 0.2 * (1.1 * i as f64).sin())
            .collect();

        let vars = p.rollout(&actuation);

        assert_eq!(&vars[l.actuation_range()], &actuation[..]);
        assert!(p.max_residual(&vars) < 1e-12);

        // The speed follows the acceleration
        let view = l.view(&vars);
        assert_abs_diff_eq!(
            view.get(Var::V, 1),
            p.init().v + view.get(Var::A, 0) * 0.1,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_condensed_matches_full() {
        let p = test_problem();
        let c = p.condensed();
        let l = *p.layout();

        assert_eq!(c.num_vars(), 18);
        assert_eq!(c.num_constraints(), 0);
        assert_eq!(c.max_residual(&vec![0f64; 18]), 0.0);
        assert_eq!(c.lower_bounds(), &p.lower_bounds()[l.actuation_range()]);
        assert_eq!(c.upper_bounds()[17], 1.0);

        let actuation: Vec<f64> = (0..c.num_vars()).map(|i| 0.05 * i as f64 - 0.3).collect();
        assert_eq!(c.cost(&actuation), p.cost(&p.rollout(&actuation)));
    }

    #[test]
    fn test_condensed_gradient_matches_finite_difference() {
        let p = test_problem();
        let c = p.condensed();
        let actuation: Vec<f64> = (0..c.num_vars()).map(|i| 0.1 * (0.9 * i as f64).cos()).collect();

        let mut grad = vec![0f64; c.num_vars()];
        c.cost_gradient(&actuation, &mut grad);

        let h = 1e-6;
        for i in 0..c.num_vars() {
            let mut up = actuation.clone();
            let mut down = actuation.clone();
            up[i] += h;
            down[i] -= h;

            let fd = (c.cost(&up) - c.cost(&down)) / (2.0 * h);
            assert_abs_diff_eq!(grad[i], fd, epsilon = 1e-4 * (1.0 + fd.abs()));
        }
    }

    #[test]
    fn test_zero_cost_on_reference() {
        let params = MpcParams::default();
        let init = VehicleState::at_origin(params.ref_speed, 0.0, 0.0);
        let p = MpcProblem::new(&params, init, RefPoly::default());

        let vars = p.initial_guess();
        assert_eq!(p.cost(&vars), 0.0);

        let mut grad = vec![1f64; p.num_vars()];
        p.cost_gradient(&vars, &mut grad);
        assert!(grad.iter().all(|g| *g == 0.0));
    }

    #[test]
    fn test_predicted_positions() {
        let p = test_problem();
        let vars = p.initial_guess();
        let pred = p.predicted_positions(&vars);
        let view = p.layout().view(&vars);

        assert_eq!(pred.len(), p.layout().horizon() - 1);
        assert_eq!(pred[0], (view.get(Var::X, 1), view.get(Var::Y, 1)));
    }
}
