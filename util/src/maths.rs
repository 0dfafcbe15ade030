//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Convert an angle in degrees to radians.
pub fn deg2rad<T: Float>(deg: T) -> T {
    deg.to_radians()
}

/// Convert an angle in radians to degrees.
pub fn rad2deg<T: Float>(rad: T) -> T {
    rad.to_degrees()
}

/// Wrap an angle into the range [-pi, pi).
pub fn wrap_pi<T>(value: T) -> T
where
    T: Float
{
    let pi_t = T::from(std::f64::consts::PI).unwrap_or_else(T::zero);
    let tau_t = pi_t + pi_t;

    rem_euclid(value + pi_t, tau_t) - pi_t
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
///
/// This function is taken from the std library as num is missing it.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_lin_map() {
        let bound = deg2rad(25f64);

        assert!((lin_map((-bound, bound), (-1.0, 1.0), bound) - 1.0).abs() < 1e-12);
        assert!((lin_map((-bound, bound), (-1.0, 1.0), -bound) + 1.0).abs() < 1e-12);
        assert!(lin_map((-bound, bound), (-1.0, 1.0), 0.0).abs() < 1e-12);
        assert!((lin_map((0.0, 10.0), (0.0, 1.0), 2.5) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_deg_rad() {
        assert!((deg2rad(25f64) - 0.436332).abs() < 1e-6);
        assert!((rad2deg(PI) - 180.0).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(0.5f64) - 0.5).abs() < 1e-12);
        assert!((wrap_pi(2.0 * PI + 0.5) - 0.5).abs() < 1e-12);
        assert!((wrap_pi(-2.0 * PI - 0.5) + 0.5).abs() < 1e-12);
        assert!((wrap_pi(PI + 0.1) - (-PI + 0.1)).abs() < 1e-12);
    }
}
