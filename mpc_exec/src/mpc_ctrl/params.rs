//! Parameters structure for MpcCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::mpc::MpcParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for MPC control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcCtrlParams {
    /// Trajectory optimiser configuration.
    pub mpc: MpcParams,

    pub latency_comp: LatencyCompParams,

    /// Number of points in the reference curve sent for display.
    pub num_ref_pts: usize,

    /// Spacing of the display reference points along the vehicle X axis.
    ///
    /// Units: meters
    pub ref_spacing_m: f64,

    /// If true one row per cycle is written to
    /// `arch/mpc_ctrl/status_report.csv`.
    pub archive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyCompParams {
    pub enabled: bool,

    /// Delay between issuing a command and it taking effect.
    ///
    /// Units: seconds
    pub latency_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for MpcCtrlParams {
    fn default() -> Self {
        Self {
            mpc: MpcParams::default(),
            latency_comp: LatencyCompParams::default(),
            num_ref_pts: 25,
            ref_spacing_m: 2.0,
            archive: true,
        }
    }
}

impl Default for LatencyCompParams {
    fn default() -> Self {
        Self {
            enabled: true,
            latency_s: 0.1,
        }
    }
}
