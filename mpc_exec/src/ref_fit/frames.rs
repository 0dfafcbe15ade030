//! World and vehicle frame transforms

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The pose of the vehicle in the world frame.
///
/// The vehicle frame has its origin at `position_m` and its +X axis along
/// `heading_rad`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2 {
    /// Position of the vehicle.
    ///
    /// Units: meters,
    /// Frame: World
    pub position_m: Vector2<f64>,

    /// Heading of the vehicle, measured from the world +X axis.
    ///
    /// Units: radians,
    /// Frame: World
    pub heading_rad: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Pose2 {
    pub fn new(x_m: f64, y_m: f64, heading_rad: f64) -> Self {
        Self {
            position_m: Vector2::new(x_m, y_m),
            heading_rad,
        }
    }

    /// Express a world frame point in this pose's vehicle frame.
    ///
    /// The point is translated by the negated position and then rotated by
    /// the negated heading.
    pub fn world_to_vehicle(&self, point_m_w: &Vector2<f64>) -> Vector2<f64> {
        Rotation2::new(-self.heading_rad) * (point_m_w - self.position_m)
    }

    /// Express a vehicle frame point in the world frame.
    pub fn vehicle_to_world(&self, point_m_vf: &Vector2<f64>) -> Vector2<f64> {
        Rotation2::new(self.heading_rad) * point_m_vf + self.position_m
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Transform parallel world frame coordinate sequences into the vehicle frame
/// of `pose`.
///
/// The sequences are zipped, so any excess in the longer one is ignored.
pub fn world_to_vehicle(
    xs_m_w: &[f64],
    ys_m_w: &[f64],
    pose: &Pose2
) -> (Vec<f64>, Vec<f64>) {
    xs_m_w
        .iter()
        .zip(ys_m_w.iter())
        .map(|(x, y)| {
            let p = pose.world_to_vehicle(&Vector2::new(*x, *y));
            (p[0], p[1])
        })
        .unzip()
}

/// Transform parallel vehicle frame coordinate sequences into the world frame.
pub fn vehicle_to_world(
    xs_m_vf: &[f64],
    ys_m_vf: &[f64],
    pose: &Pose2
) -> (Vec<f64>, Vec<f64>) {
    xs_m_vf
        .iter()
        .zip(ys_m_vf.iter())
        .map(|(x, y)| {
            let p = pose.vehicle_to_world(&Vector2::new(*x, *y));
            (p[0], p[1])
        })
        .unzip()
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_ahead_is_positive_x() {
        // Facing +Y, a point 5 m north is 5 m ahead
        let pose = Pose2::new(1.0, 2.0, FRAC_PI_2);
        let p = pose.world_to_vehicle(&Vector2::new(1.0, 7.0));

        assert_abs_diff_eq!(p[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 0.0, epsilon = 1e-12);

        // And a point to the west is on the left (+Y)
        let p = pose.world_to_vehicle(&Vector2::new(-2.0, 2.0));
        assert_abs_diff_eq!(p[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_round_trip() {
        let poses = [
            Pose2::new(0.0, 0.0, 0.0),
            Pose2::new(-120.5, 33.2, 2.9),
            Pose2::new(1e3, -4e2, -PI),
            Pose2::new(7.0, 7.0, 11.0),
        ];
        let xs = [0.0, 15.2, -300.0, 1e3, 0.001];
        let ys = [0.0, -8.1, 42.0, -1e3, 0.002];

        for pose in poses.iter() {
            let (vx, vy) = world_to_vehicle(&xs, &ys, pose);
            let (wx, wy) = vehicle_to_world(&vx, &vy, pose);

            for i in 0..xs.len() {
                assert_abs_diff_eq!(wx[i], xs[i], epsilon = 1e-9);
                assert_abs_diff_eq!(wy[i], ys[i], epsilon = 1e-9);
            }
        }
    }
}
