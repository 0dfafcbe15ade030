//! Decision vector layout
//!
//! The solver sees the whole horizon as one flat vector. For a horizon of `N`
//! steps the vector holds `N` samples of each state field followed by `N - 1`
//! samples of each actuator:
//!
//! ```text
//! [ x(N) | y(N) | psi(N) | v(N) | cte(N) | epsi(N) | delta(N-1) | a(N-1) ]
//! ```
//!
//! The constraint vector mirrors the state blocks, so the residual pinning or
//! propagating `var` at step `t` sits at the same index as the variable
//! itself.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::ops::Range;

use crate::model::{Actuation, VehicleState, NUM_ACTUATORS, NUM_STATES};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// State variables in decision vector order.
pub const STATES: [Var; NUM_STATES] = [Var::X, Var::Y, Var::Psi, Var::V, Var::Cte, Var::Epsi];

/// Actuator variables in decision vector order.
pub const ACTUATORS: [Var; NUM_ACTUATORS] = [Var::Delta, Var::A];

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A logical variable in the decision vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    X,
    Y,
    Psi,
    V,
    Cte,
    Epsi,
    Delta,
    A,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Maps logical variables onto their ranges of the decision vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarLayout {
    horizon: usize,
}

/// A typed view onto a decision vector.
#[derive(Debug, Clone, Copy)]
pub struct VarsView<'a, T> {
    layout: VarLayout,
    vars: &'a [T],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Var {
    /// Position of this variable within its block of states or actuators.
    fn block_index(self) -> usize {
        match self {
            Var::X | Var::Delta => 0,
            Var::Y | Var::A => 1,
            Var::Psi => 2,
            Var::V => 3,
            Var::Cte => 4,
            Var::Epsi => 5,
        }
    }

    pub fn is_actuator(self) -> bool {
        matches!(self, Var::Delta | Var::A)
    }
}

impl VarLayout {
    /// Create the layout for a horizon of `horizon` steps.
    ///
    /// The horizon must be at least 2 steps, which `MpcParams::validate`
    /// guarantees.
    pub fn new(horizon: usize) -> Self {
        Self { horizon }
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Length of the decision vector, `6N + 2(N - 1)`.
    pub fn num_vars(&self) -> usize {
        NUM_STATES * self.horizon + NUM_ACTUATORS * (self.horizon - 1)
    }

    /// Length of the constraint vector, `6N`.
    pub fn num_constraints(&self) -> usize {
        NUM_STATES * self.horizon
    }

    /// Number of actuator samples, `2(N - 1)`.
    pub fn num_actuation(&self) -> usize {
        NUM_ACTUATORS * (self.horizon - 1)
    }

    /// The actuator blocks, which close the decision vector.
    pub fn actuation_range(&self) -> Range<usize> {
        self.start(ACTUATORS[0])..self.num_vars()
    }

    /// Number of samples of `var`.
    pub fn len(&self, var: Var) -> usize {
        if var.is_actuator() {
            self.horizon - 1
        }
        else {
            self.horizon
        }
    }

    /// Index of the first sample of `var`.
    pub fn start(&self, var: Var) -> usize {
        if var.is_actuator() {
            NUM_STATES * self.horizon + var.block_index() * (self.horizon - 1)
        }
        else {
            var.block_index() * self.horizon
        }
    }

    /// Index range holding every sample of `var`.
    pub fn range(&self, var: Var) -> Range<usize> {
        let start = self.start(var);
        start..start + self.len(var)
    }

    /// Index of `var` at step `t`.
    ///
    /// # Panics
    /// - If `t` is outside the samples of `var`, checked in debug builds.
    #[inline]
    pub fn index(&self, var: Var, t: usize) -> usize {
        debug_assert!(t < self.len(var), "step {} out of range for {:?}", t, var);
        self.start(var) + t
    }

    /// Index of the constraint residual for state `var` at step `t`.
    #[inline]
    pub fn constraint_index(&self, var: Var, t: usize) -> usize {
        debug_assert!(!var.is_actuator(), "actuators carry no constraints");
        self.index(var, t)
    }

    /// A typed view onto `vars`, which must be `num_vars` long.
    pub fn view<'a, T>(&self, vars: &'a [T]) -> VarsView<'a, T> {
        debug_assert_eq!(vars.len(), self.num_vars());
        VarsView { layout: *self, vars }
    }
}

impl<'a, T: Copy> VarsView<'a, T> {
    pub fn get(&self, var: Var, t: usize) -> T {
        self.vars[self.layout.index(var, t)]
    }

    /// Every sample of `var`.
    pub fn series(&self, var: Var) -> &'a [T] {
        &self.vars[self.layout.range(var)]
    }

    /// The state at step `t`.
    pub fn state(&self, t: usize) -> VehicleState<T> {
        VehicleState::from_array(STATES.map(|v| self.get(v, t)))
    }

    /// The actuation at step `t`, which must be below `N - 1`.
    pub fn actuation(&self, t: usize) -> Actuation<T> {
        Actuation::from_array(ACTUATORS.map(|v| self.get(v, t)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sizes() {
        let l = VarLayout::new(10);

        assert_eq!(l.num_vars(), 6 * 10 + 2 * 9);
        assert_eq!(l.num_constraints(), 60);
        assert_eq!(l.len(Var::Epsi), 10);
        assert_eq!(l.len(Var::A), 9);
    }

    #[test]
    fn test_blocks_tile_vector() {
        let l = VarLayout::new(7);
        let mut covered = vec![0u32; l.num_vars()];

        for var in STATES.iter().chain(ACTUATORS.iter()) {
            for i in l.range(*var) {
                covered[i] += 1;
            }
        }

        assert!(covered.iter().all(|c| *c == 1));
        assert_eq!(l.start(Var::X), 0);
        assert_eq!(l.start(Var::Epsi), 35);
        assert_eq!(l.start(Var::Delta), 42);
        assert_eq!(l.start(Var::A), 48);
        assert_eq!(l.index(Var::A, 5), l.num_vars() - 1);
        assert_eq!(l.actuation_range(), 42..54);
        assert_eq!(l.actuation_range().len(), l.num_actuation());
    }

    #[test]
    fn test_view() {
        let l = VarLayout::new(3);
        let vars: Vec<f64> = (0..l.num_vars()).map(|i| i as f64).collect();
        let view = l.view(&vars);

        let s = view.state(1);
        assert_eq!(s.to_array(), [1.0, 4.0, 7.0, 10.0, 13.0, 16.0]);

        let a = view.actuation(1);
        assert_eq!(a.to_array(), [19.0, 21.0]);

        assert_eq!(view.series(Var::Delta), &[18.0, 19.0]);
        assert_eq!(view.get(Var::V, 2), 11.0);
    }
}
