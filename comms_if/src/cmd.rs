//! # Steering commands
//!
//! The outbound payload of a control cycle: the actuation to apply now and
//! the trajectories to overlay on the vehicle's display. All trajectories are
//! in the vehicle frame (vehicle at the origin, heading along +X).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::MsgError;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A steering command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteerCmd {
    /// Steering demand, the steering angle divided by the steering limit.
    ///
    /// Units: normalised, [-1, 1]
    #[serde(rename = "steering_angle")]
    pub steering_norm: f64,

    /// Throttle demand, negative values brake.
    ///
    /// Units: normalised, [-1, 1]
    #[serde(rename = "throttle")]
    pub throttle_norm: f64,

    /// X coordinates of the predicted trajectory.
    ///
    /// Units: meters,
    /// Frame: Vehicle
    #[serde(rename = "mpc_x")]
    pub predicted_x_m: Vec<f64>,

    /// Y coordinates of the predicted trajectory.
    ///
    /// Units: meters,
    /// Frame: Vehicle
    #[serde(rename = "mpc_y")]
    pub predicted_y_m: Vec<f64>,

    /// X coordinates of the sampled reference curve.
    ///
    /// Units: meters,
    /// Frame: Vehicle
    #[serde(rename = "next_x")]
    pub reference_x_m: Vec<f64>,

    /// Y coordinates of the sampled reference curve.
    ///
    /// Units: meters,
    /// Frame: Vehicle
    #[serde(rename = "next_y")]
    pub reference_y_m: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SteerCmd {
    /// A command which centres the steering and coasts, with no trajectories.
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Serialise the command into JSON.
    pub fn to_json(&self) -> Result<String, MsgError> {
        serde_json::to_string(self).map_err(MsgError::SerialiseError)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wire_keys() {
        let cmd = SteerCmd {
            steering_norm: -0.5,
            throttle_norm: 1.0,
            predicted_x_m: vec![1.0, 2.0],
            predicted_y_m: vec![0.0, 0.1],
            reference_x_m: vec![0.0],
            reference_y_m: vec![0.2],
        };

        let value: serde_json::Value = serde_json::from_str(&cmd.to_json().unwrap()).unwrap();

        assert_eq!(value["steering_angle"], -0.5);
        assert_eq!(value["throttle"], 1.0);
        assert_eq!(value["mpc_x"][1], 2.0);
        assert_eq!(value["mpc_y"][1], 0.1);
        assert_eq!(value["next_x"][0], 0.0);
        assert_eq!(value["next_y"][0], 0.2);
    }
}
