//! Closed track of world frame waypoints

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector2;
use std::f64::consts::PI;

use super::{SimError, TrackParams};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A track needs at least this many points to give a fittable lookahead.
pub const MIN_TRACK_POINTS: usize = 4;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A closed polyline, the last point joins back onto the first.
#[derive(Debug, Clone)]
pub struct Track {
    points_m: Vec<Vector2<f64>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Track {
    /// Build the track described by the parameters.
    pub fn from_params(params: &TrackParams) -> Result<Self, SimError> {
        if params.waypoints_x_m.is_empty() && params.waypoints_y_m.is_empty() {
            return Self::ellipse(
                params.ellipse_semi_x_m,
                params.ellipse_semi_y_m,
                params.ellipse_spacing_m
            );
        }

        if params.waypoints_x_m.len() != params.waypoints_y_m.len() {
            return Err(SimError::MismatchedTrack(
                params.waypoints_x_m.len(),
                params.waypoints_y_m.len()
            ));
        }

        Self::from_points(
            params.waypoints_x_m
                .iter()
                .zip(params.waypoints_y_m.iter())
                .map(|(x, y)| Vector2::new(*x, *y))
                .collect()
        )
    }

    pub fn from_points(points_m: Vec<Vector2<f64>>) -> Result<Self, SimError> {
        if points_m.len() < MIN_TRACK_POINTS {
            return Err(SimError::NotEnoughTrackPoints(points_m.len()));
        }

        Ok(Self { points_m })
    }

    /// An anticlockwise ellipse centred on the origin, starting on the +X
    /// axis.
    pub fn ellipse(semi_x_m: f64, semi_y_m: f64, spacing_m: f64) -> Result<Self, SimError> {
        if !(semi_x_m > 0.0 && semi_y_m > 0.0 && spacing_m > 0.0) {
            return Err(SimError::InvalidEllipse);
        }

        // Ramanujan's approximation of the perimeter
        let (a, b) = (semi_x_m, semi_y_m);
        let perimeter = PI * (3.0 * (a + b) - ((3.0 * a + b) * (a + 3.0 * b)).sqrt());
        let num_points = ((perimeter / spacing_m).ceil() as usize).max(MIN_TRACK_POINTS);

        Self::from_points(
            (0..num_points)
                .map(|i| {
                    let theta = 2.0 * PI * i as f64 / num_points as f64;
                    Vector2::new(a * theta.cos(), b * theta.sin())
                })
                .collect()
        )
    }

    pub fn num_points(&self) -> usize {
        self.points_m.len()
    }

    /// The point at `index`, wrapping around the track.
    pub fn point(&self, index: usize) -> Vector2<f64> {
        self.points_m[index % self.points_m.len()]
    }

    /// Heading of the segment leaving the point at `index`.
    pub fn heading_rad(&self, index: usize) -> f64 {
        let d = self.point(index + 1) - self.point(index);
        d[1].atan2(d[0])
    }

    /// Index of the track point nearest to `position_m`.
    pub fn nearest_index(&self, position_m: &Vector2<f64>) -> usize {
        self.points_m
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - position_m).norm_squared()))
            .fold((0, std::f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
            .0
    }

    /// The `num` waypoints starting at the point nearest to `position_m`.
    pub fn lookahead(&self, position_m: &Vector2<f64>, num: usize) -> (Vec<f64>, Vec<f64>) {
        let start = self.nearest_index(position_m);

        (start..start + num)
            .map(|i| {
                let p = self.point(i);
                (p[0], p[1])
            })
            .unzip()
    }

    /// Distance from `position_m` to the nearest segment of the track.
    ///
    /// Units: meters
    pub fn distance_m(&self, position_m: &Vector2<f64>) -> f64 {
        (0..self.points_m.len())
            .map(|i| segment_distance(&self.point(i), &self.point(i + 1), position_m))
            .fold(std::f64::INFINITY, f64::min)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn segment_distance(a: &Vector2<f64>, b: &Vector2<f64>, p: &Vector2<f64>) -> f64 {
    let ab = b - a;
    let len_sq = ab.norm_squared();

    if len_sq == 0.0 {
        return (p - a).norm();
    }

    let s = ((p - a).dot(&ab) / len_sq).max(0.0).min(1.0);
    (p - (a + ab * s)).norm()
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square() -> Track {
        Track::from_points(vec![
            Vector2::new(0.0, 0.0),
            Vector2::new(10.0, 0.0),
            Vector2::new(10.0, 10.0),
            Vector2::new(0.0, 10.0),
        ]).unwrap()
    }

    #[test]
    fn test_too_few_points() {
        assert!(matches!(
            Track::from_points(vec![Vector2::new(0.0, 0.0); 3]),
            Err(SimError::NotEnoughTrackPoints(3))
        ));
    }

    #[test]
    fn test_nearest_and_lookahead() {
        let t = square();

        assert_eq!(t.nearest_index(&Vector2::new(9.0, 1.0)), 1);

        // Wraps back round to the start
        let (xs, ys) = t.lookahead(&Vector2::new(1.0, 9.0), 3);
        assert_eq!(xs, vec![0.0, 0.0, 10.0]);
        assert_eq!(ys, vec![10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_distance() {
        let t = square();

        assert_abs_diff_eq!(t.distance_m(&Vector2::new(5.0, 1.0)), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(t.distance_m(&Vector2::new(5.0, 5.0)), 5.0, epsilon = 1e-12);

        // Closing segment from (0, 10) back to (0, 0)
        assert_abs_diff_eq!(t.distance_m(&Vector2::new(-2.0, 5.0)), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ellipse() {
        let t = Track::from_params(&TrackParams::default()).unwrap();

        assert!(t.num_points() > 50);
        assert_abs_diff_eq!(t.point(0)[0], 150.0, epsilon = 1e-9);

        // Anticlockwise, so the first segment heads north
        let h = t.heading_rad(0);
        assert!(h > 1.0 && h < 2.0, "heading {}", h);

        for i in 0..t.num_points() {
            let p = t.point(i);
            let r = (p[0] / 150.0).powi(2) + (p[1] / 80.0).powi(2);
            assert_abs_diff_eq!(r, 1.0, epsilon = 1e-9);
        }
    }
}
