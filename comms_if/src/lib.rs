//! # Communications interface crate.
//!
//! Provides the messages exchanged between the controller and the process
//! which owns the vehicle (real or simulated). Field names on the wire match
//! the keys used by the existing simulator and visualiser.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Steering commands sent back to the vehicle
pub mod cmd;

/// Telemetry received from the vehicle once per control cycle
pub mod tlm;

// ------------------------------------------------------------------------------------------------
// ENUMERATIONS
// ------------------------------------------------------------------------------------------------

/// Errors that can occur while (de)serialising a message.
#[derive(Debug, thiserror::Error)]
pub enum MsgError {
    #[error("Could not deserialise the message: {0}")]
    DeserialiseError(serde_json::Error),

    #[error("Could not serialise the message: {0}")]
    SerialiseError(serde_json::Error),
}
