//! # Closed loop simulation
//!
//! A stand-in for the process that owns the vehicle. The simulated vehicle
//! drives around a closed track, publishing telemetry with the next few
//! track waypoints each cycle and applying the commands it receives after
//! the actuation latency.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod fallback;
mod params;
mod track;
mod vehicle;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Serialize;

pub use fallback::*;
pub use params::*;
pub use track::*;
pub use vehicle::*;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Running statistics of the distance from the track.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CteStats {
    pub num_samples: usize,

    /// Units: meters
    pub mean_abs_m: f64,

    /// Units: meters
    pub max_abs_m: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors in the simulation.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("A track needs at least 4 points, found {0}")]
    NotEnoughTrackPoints(usize),

    #[error("The track has {0} X coordinates but {1} Y coordinates")]
    MismatchedTrack(usize, usize),

    #[error("Ellipse track semi-axes and spacing must be positive")]
    InvalidEllipse,

    #[error("{0} control cycles failed in a row")]
    TooManyFailures(usize),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CteStats {
    pub fn update(&mut self, cte_m: f64) {
        let abs = cte_m.abs();

        self.num_samples += 1;
        self.mean_abs_m += (abs - self.mean_abs_m) / self.num_samples as f64;
        self.max_abs_m = self.max_abs_m.max(abs);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cte_stats() {
        let mut s = CteStats::default();
        for c in [0.5, -1.5, 1.0].iter() {
            s.update(*c);
        }

        assert_eq!(s.num_samples, 3);
        assert_abs_diff_eq!(s.mean_abs_m, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.max_abs_m, 1.5, epsilon = 1e-12);
    }
}
