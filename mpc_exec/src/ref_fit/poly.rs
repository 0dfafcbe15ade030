//! Reference polynomial and least squares fitting

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use nalgebra::{DMatrix, DVector};
use num_dual::DualNum;
use serde::{Deserialize, Serialize};

// Internal
use super::FitError;
use crate::model::lift;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Order of the reference polynomial.
pub const POLY_ORDER: usize = 3;

/// Number of coefficients in the reference polynomial.
pub const NUM_COEFFS: usize = POLY_ORDER + 1;

/// Condition number of the normal equations above which a fit is rejected.
pub const MAX_CONDITION: f64 = 1e10;

/// Two abscissae closer than this are treated as the same point.
///
/// Units: meters
pub const DISTINCT_X_TOL_M: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A cubic `y = f(x)` in the vehicle frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RefPoly {
    /// Coefficients, lowest degree first.
    pub coeffs: [f64; NUM_COEFFS],
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RefPoly {
    pub fn new(coeffs: [f64; NUM_COEFFS]) -> Self {
        Self { coeffs }
    }

    /// Fit the reference polynomial to the given points.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, FitError> {
        let c = polyfit(xs, ys, POLY_ORDER)?;

        let mut coeffs = [0f64; NUM_COEFFS];
        coeffs.copy_from_slice(&c);

        Ok(Self { coeffs })
    }

    /// Evaluate `f(x)`.
    pub fn eval<D: DualNum<f64> + Copy>(&self, x: D) -> D {
        self.coeffs
            .iter()
            .rev()
            .fold(lift::<D>(0.0), |acc, c| acc * x + lift::<D>(*c))
    }

    /// Evaluate `f'(x)`.
    pub fn slope<D: DualNum<f64> + Copy>(&self, x: D) -> D {
        self.coeffs
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .fold(lift::<D>(0.0), |acc, (k, c)| acc * x + lift::<D>(k as f64 * c))
    }

    /// The cross track error at the vehicle frame origin, `f(0)`.
    pub fn cte(&self) -> f64 {
        self.coeffs[0]
    }

    /// The heading error at the vehicle frame origin, `-atan(f'(0))`.
    pub fn epsi(&self) -> f64 {
        -self.coeffs[1].atan()
    }

    /// Sample the curve at `num_pts` points spaced `spacing_m` apart along
    /// the vehicle X axis, starting at the origin.
    pub fn sample(&self, num_pts: usize, spacing_m: f64) -> (Vec<f64>, Vec<f64>) {
        (0..num_pts)
            .map(|i| {
                let x = i as f64 * spacing_m;
                (x, self.eval(x))
            })
            .unzip()
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Evaluate a polynomial with lowest degree first coefficients.
pub fn polyeval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Least squares fit of a polynomial of the given order, returning the
/// coefficients lowest degree first.
///
/// The abscissae are scaled into [-1, 1] before forming the normal
/// equations, and the coefficients are unscaled afterwards. The fit is
/// rejected if the normal equations are too badly conditioned to trust.
pub fn polyfit(xs: &[f64], ys: &[f64], order: usize) -> Result<Vec<f64>, FitError> {
    let num_coeffs = order + 1;

    if xs.len() != ys.len() {
        return Err(FitError::MismatchedLengths {
            num_x: xs.len(),
            num_y: ys.len(),
        });
    }

    if xs.len() < num_coeffs {
        return Err(FitError::TooFewWaypoints {
            found: xs.len(),
            required: num_coeffs,
        });
    }

    if !xs.iter().chain(ys.iter()).all(|v| v.is_finite()) {
        return Err(FitError::NotFinite);
    }

    let num_distinct = count_distinct(xs);
    if num_distinct < num_coeffs {
        return Err(FitError::TooFewDistinctX {
            found: num_distinct,
            required: num_coeffs,
        });
    }

    // Scale so the largest abscissa has unit magnitude. The distinct check
    // guarantees at least one non-zero x.
    let scale = xs.iter().fold(0f64, |m, x| m.max(x.abs()));

    let a = DMatrix::from_fn(xs.len(), num_coeffs, |r, c| (xs[r] / scale).powi(c as i32));
    let b = DVector::from_column_slice(ys);

    let ata = a.transpose() * &a;
    let atb = a.transpose() * b;

    let sv = ata.singular_values();
    let condition = sv.amax() / sv.amin();
    trace!("Normal equations condition number: {:e}", condition);

    if !(condition < MAX_CONDITION) {
        return Err(FitError::IllConditioned { condition });
    }

    let scaled = match ata.cholesky() {
        Some(c) => c.solve(&atb),
        None => return Err(FitError::IllConditioned { condition }),
    };

    Ok(scaled
        .iter()
        .enumerate()
        .map(|(k, c)| c / scale.powi(k as i32))
        .collect())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn count_distinct(xs: &[f64]) -> usize {
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    match sorted.first() {
        Some(first) => {
            let mut last = *first;
            let mut count = 1;
            for x in sorted.iter().skip(1) {
                if x - last > DISTINCT_X_TOL_M {
                    count += 1;
                    last = *x;
                }
            }
            count
        }
        None => 0,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use num_dual::Dual64;

    #[test]
    fn test_eval_and_slope() {
        let p = RefPoly::new([1.0, -2.0, 0.5, 0.1]);

        assert_relative_eq!(p.eval(2.0), 1.0 - 4.0 + 2.0 + 0.8, epsilon = 1e-12);
        assert_relative_eq!(p.slope(2.0), -2.0 + 2.0 + 1.2, epsilon = 1e-12);
        assert_relative_eq!(polyeval(&p.coeffs, 2.0), p.eval(2.0), epsilon = 1e-12);

        // The derivative of eval through a dual number is the slope
        let d = p.eval(Dual64::new(2.0, 1.0));
        assert_relative_eq!(d.eps, p.slope(2.0), epsilon = 1e-12);
    }

    #[test]
    fn test_errors_at_origin() {
        let p = RefPoly::new([0.7, 1.0, 3.0, -4.0]);

        assert_relative_eq!(p.cte(), 0.7, epsilon = 1e-12);
        assert_relative_eq!(p.epsi(), -std::f64::consts::FRAC_PI_4, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_exact() {
        let truth = [1.0, -0.5, 0.02, -0.001];
        let xs = [-5.0, 3.0, 12.5, 20.0, 31.0, 44.4, 60.0];
        let ys: Vec<f64> = xs.iter().map(|x| polyeval(&truth, *x)).collect();

        let p = RefPoly::fit(&xs, &ys).unwrap();

        for k in 0..NUM_COEFFS {
            assert_abs_diff_eq!(p.coeffs[k], truth[k], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_fit_least_squares() {
        // Noise on a straight line averages out to the line
        let xs = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0];
        let ys = [0.1, -0.1, 0.1, -0.1, 0.1, -0.1];

        let p = RefPoly::fit(&xs, &ys).unwrap();
        for x in xs.iter() {
            assert!(p.eval(*x).abs() < 0.2);
        }
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        assert!(matches!(
            RefPoly::fit(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]),
            Err(FitError::TooFewWaypoints { found: 3, required: 4 })
        ));

        assert!(matches!(
            RefPoly::fit(&[0.0, 1.0, 2.0, 3.0], &[0.0, 1.0, 2.0]),
            Err(FitError::MismatchedLengths { num_x: 4, num_y: 3 })
        ));

        assert!(matches!(
            RefPoly::fit(&[0.0, 1.0, 1.0, 2.0, 2.0], &[0.0, 1.0, 1.5, 2.0, 2.5]),
            Err(FitError::TooFewDistinctX { found: 3, required: 4 })
        ));

        assert!(matches!(
            RefPoly::fit(&[0.0, 1.0, std::f64::NAN, 2.0], &[0.0; 4]),
            Err(FitError::NotFinite)
        ));
    }

    #[test]
    fn test_fit_ill_conditioned() {
        let xs = [100.0, 100.0001, 100.0002, 100.0003];
        let ys = [0.0, 1.0, 0.0, 1.0];

        assert!(matches!(
            RefPoly::fit(&xs, &ys),
            Err(FitError::IllConditioned { .. })
        ));
    }

    #[test]
    fn test_sample() {
        let p = RefPoly::new([1.0, 0.5, 0.0, 0.0]);
        let (xs, ys) = p.sample(25, 2.0);

        assert_eq!(xs.len(), 25);
        assert_relative_eq!(xs[0], 0.0, epsilon = 1e-12);
        assert_relative_eq!(xs[24], 48.0, epsilon = 1e-12);
        assert_relative_eq!(ys[24], 25.0, epsilon = 1e-12);
    }
}
