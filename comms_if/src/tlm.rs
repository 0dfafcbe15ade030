//! # Telemetry
//!
//! One telemetry message is received per control cycle. It carries the
//! upcoming reference waypoints and the vehicle's pose in the world (map)
//! frame.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::MsgError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry from the vehicle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// X coordinates of the reference waypoints.
    ///
    /// Units: meters,
    /// Frame: World
    #[serde(rename = "ptsx")]
    pub waypoints_x_m: Vec<f64>,

    /// Y coordinates of the reference waypoints, same length as `waypoints_x_m`.
    ///
    /// Units: meters,
    /// Frame: World
    #[serde(rename = "ptsy")]
    pub waypoints_y_m: Vec<f64>,

    /// Vehicle X position.
    ///
    /// Units: meters,
    /// Frame: World
    #[serde(rename = "x")]
    pub x_m: f64,

    /// Vehicle Y position.
    ///
    /// Units: meters,
    /// Frame: World
    #[serde(rename = "y")]
    pub y_m: f64,

    /// Vehicle heading, anticlockwise from the world X axis.
    ///
    /// Units: radians
    #[serde(rename = "psi")]
    pub psi_rad: f64,

    /// Vehicle speed.
    ///
    /// Units: same as the controller's reference speed
    #[serde(rename = "speed")]
    pub speed: f64,

    /// The steering command most recently applied to the vehicle, if the
    /// vehicle reports it.
    ///
    /// Units: normalised, [-1, 1] (the same convention as `SteerCmd`)
    #[serde(rename = "steering_angle", default, skip_serializing_if = "Option::is_none")]
    pub steering_norm: Option<f64>,

    /// The throttle most recently applied to the vehicle, if the vehicle
    /// reports it.
    ///
    /// Units: normalised, [-1, 1]
    #[serde(rename = "throttle", default, skip_serializing_if = "Option::is_none")]
    pub throttle_norm: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Telemetry {
    /// Parse a telemetry message from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, MsgError> {
        serde_json::from_str(json).map_err(MsgError::DeserialiseError)
    }

    /// Number of waypoints in the message.
    ///
    /// If the X and Y sequences are of different lengths the shorter one is
    /// used.
    pub fn num_waypoints(&self) -> usize {
        self.waypoints_x_m.len().min(self.waypoints_y_m.len())
    }

    /// The previously applied actuation, only if the vehicle reported both
    /// the steering and throttle values.
    pub fn prev_actuation_norm(&self) -> Option<(f64, f64)> {
        match (self.steering_norm, self.throttle_norm) {
            (Some(s), Some(t)) => Some((s, t)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_json() {
        let json = r#"{
            "ptsx": [-32.16, -43.49, -61.09, -78.29],
            "ptsy": [113.36, 105.94, 92.88, 78.73],
            "x": -40.62, "y": 108.73, "psi": 3.733651, "speed": 0.4380182,
            "steering_angle": 0.0, "throttle": 0.0
        }"#;

        let tlm = Telemetry::from_json(json).unwrap();

        assert_eq!(tlm.num_waypoints(), 4);
        assert_eq!(tlm.x_m, -40.62);
        assert_eq!(tlm.psi_rad, 3.733651);
        assert_eq!(tlm.prev_actuation_norm(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_optional_actuation() {
        let json = r#"{"ptsx": [], "ptsy": [], "x": 0, "y": 0, "psi": 0, "speed": 10}"#;

        let tlm = Telemetry::from_json(json).unwrap();

        assert_eq!(tlm.steering_norm, None);
        assert_eq!(tlm.prev_actuation_norm(), None);
    }

    #[test]
    fn test_missing_field() {
        match Telemetry::from_json(r#"{"ptsx": [], "ptsy": []}"#) {
            Err(MsgError::DeserialiseError(_)) => (),
            r => panic!("Expected a deserialise error, got {:?}", r),
        }
    }
}
