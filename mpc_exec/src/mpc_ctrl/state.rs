//! MPC control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, warn};
use serde::Serialize;

// Internal
use super::*;
use crate::latency_comp::compensate;
use crate::model::{Actuation, VehicleState};
use crate::mpc::{PanocSolver, MpcSolution, NlpSolver, TrajOptimiser};
use crate::ref_fit::{self, Pose2};
use comms_if::{cmd::SteerCmd, tlm::Telemetry};
use util::{
    archive::{Archived, Archiver},
    maths::lin_map,
    module::State,
    params,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Steering within this fraction of the limit is reported as saturated.
const SATURATION_MARGIN: f64 = 1e-3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// MPC control module state.
#[derive(Default)]
pub struct MpcCtrl<S = PanocSolver> {
    params: MpcCtrlParams,

    /// The optimiser, only `None` before initialisation.
    optimiser: Option<TrajOptimiser<S>>,

    /// The actuation issued by the previous successful cycle, in model units.
    last_actuation: Option<Actuation>,

    report: StatusReport,

    arch_report: Option<Archiver>,
}

/// The status report of one control cycle.
#[derive(Debug, Default, Copy, Clone, Serialize)]
pub struct StatusReport {
    /// Cross track error from the reference fit.
    pub cte_m: f64,

    /// Heading error from the reference fit.
    pub epsi_rad: f64,

    /// True if the state was projected over the actuation latency
    pub latency_compensated: bool,

    /// Speed the horizon was planned from.
    pub planned_speed: f64,

    pub steering_norm: f64,

    pub throttle_norm: f64,

    /// If true the steering demand is at its limit
    pub steering_saturated: bool,

    /// Cost of the optimal plan
    pub cost: f64,

    pub outer_iters: usize,

    pub inner_iters: usize,

    /// Units: seconds
    pub solve_time_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl MpcCtrl<PanocSolver> {
    /// Create the module directly from parameters, without archiving.
    pub fn new(params: MpcCtrlParams) -> Result<Self, MpcCtrlError> {
        let solver = PanocSolver::new(params.mpc.solver.clone());
        Self::with_solver(params, solver)
    }
}

impl State for MpcCtrl<PanocSolver> {
    type InitData = &'static str;
    type InitError = MpcCtrlError;

    type InputData = Telemetry;
    type OutputData = SteerCmd;
    type StatusReport = StatusReport;
    type ProcError = MpcCtrlError;

    /// Initialise the MpcCtrl module.
    ///
    /// Expected init data is the path to the parameter file
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        let params: MpcCtrlParams = params::load(init_data)
            .map_err(MpcCtrlError::ParamLoadError)?;

        *self = Self::new(params)?;

        if self.params.archive {
            self.arch_report = Some(
                Archiver::from_path(session, "mpc_ctrl/status_report.csv")
                    .map_err(MpcCtrlError::ArchiveError)?
            );
        }

        Ok(())
    }

    /// Perform one control cycle.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        self.cycle(input_data)
    }
}

impl<S: NlpSolver> MpcCtrl<S> {
    /// Create the module with a specific solver.
    pub fn with_solver(params: MpcCtrlParams, solver: S) -> Result<Self, MpcCtrlError> {
        let optimiser = TrajOptimiser::with_solver(params.mpc.clone(), solver)?;

        Ok(Self {
            params,
            optimiser: Some(optimiser),
            last_actuation: None,
            report: StatusReport::default(),
            arch_report: None,
        })
    }

    pub fn params(&self) -> &MpcCtrlParams {
        &self.params
    }

    /// The actuation issued by the last successful cycle, in model units.
    pub fn last_actuation(&self) -> Option<Actuation> {
        self.last_actuation
    }

    /// Run one fit, compensate, solve cycle.
    ///
    /// On error nothing is retained from the cycle, the previous actuation
    /// is still used for the next cycle's latency compensation.
    pub fn cycle(&mut self, tlm: &Telemetry) -> Result<(SteerCmd, StatusReport), MpcCtrlError> {
        let optimiser = match self.optimiser {
            Some(ref o) => o,
            None => return Err(MpcCtrlError::NotInitialised),
        };
        let mpc = optimiser.params();

        self.report = StatusReport::default();

        // ---- REFERENCE ----

        let pose = Pose2::new(tlm.x_m, tlm.y_m, tlm.psi_rad);
        let fit = ref_fit::fit(&tlm.waypoints_x_m, &tlm.waypoints_y_m, &pose)?;

        self.report.cte_m = fit.cte_m;
        self.report.epsi_rad = fit.epsi_rad;

        // ---- LATENCY ----

        let mut state = VehicleState::at_origin(tlm.speed, fit.cte_m, fit.epsi_rad);

        if self.params.latency_comp.enabled {
            // Prefer what the vehicle says it applied over what was sent
            let prev = match tlm.prev_actuation_norm() {
                Some((s, t)) => actuation_from_norm(s, t, mpc.max_steer_rad),
                None => self.last_actuation.unwrap_or_default(),
            };

            state = compensate(&state, &prev, self.params.latency_comp.latency_s, mpc.lf_m);
            self.report.latency_compensated = true;

            debug!("Latency compensated state: {:?}", state);
        }

        self.report.planned_speed = state.v;

        // ---- SOLVE ----

        let solution = optimiser.solve(&state, &fit.poly).map_err(|e| {
            warn!("Trajectory optimisation failed: {}", e);
            e
        })?;

        // ---- OUTPUT ----

        let cmd = self.build_cmd(&solution, &fit.poly);

        self.report.steering_norm = cmd.steering_norm;
        self.report.throttle_norm = cmd.throttle_norm;
        self.report.steering_saturated = solution.actuation.delta.abs()
            >= mpc.max_steer_rad * (1.0 - SATURATION_MARGIN);
        self.report.cost = solution.cost;
        self.report.outer_iters = solution.stats.outer_iters;
        self.report.inner_iters = solution.stats.inner_iters;
        self.report.solve_time_s = solution.stats.solve_time_s;

        self.last_actuation = Some(solution.actuation);

        if let Err(e) = self.write() {
            warn!("Could not archive MpcCtrl status: {}", e);
        }

        Ok((cmd, self.report))
    }

    fn build_cmd(&self, solution: &MpcSolution, poly: &ref_fit::RefPoly) -> SteerCmd {
        let max_steer_rad = self.params.mpc.max_steer_rad;

        let (predicted_x_m, predicted_y_m) = solution.predicted_m_vf.iter().cloned().unzip();
        let (reference_x_m, reference_y_m) =
            poly.sample(self.params.num_ref_pts, self.params.ref_spacing_m);

        SteerCmd {
            steering_norm: steer_to_norm(solution.actuation.delta, max_steer_rad),
            throttle_norm: solution.actuation.a.max(-1.0).min(1.0),
            predicted_x_m,
            predicted_y_m,
            reference_x_m,
            reference_y_m,
        }
    }
}

impl<S> Archived for MpcCtrl<S> {
    fn write(&mut self) -> Result<(), util::archive::ArchiveError> {
        match self.arch_report {
            Some(ref mut a) => a.serialise(&self.report),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Normalise a steering angle by the steering limit, clamped to [-1, 1].
pub fn steer_to_norm(delta_rad: f64, max_steer_rad: f64) -> f64 {
    lin_map((-max_steer_rad, max_steer_rad), (-1.0, 1.0), delta_rad)
        .max(-1.0)
        .min(1.0)
}

/// Convert a normalised steering and throttle pair back into model units.
pub fn actuation_from_norm(steering_norm: f64, throttle_norm: f64, max_steer_rad: f64)
    -> Actuation
{
    Actuation {
        delta: lin_map((-1.0, 1.0), (-max_steer_rad, max_steer_rad), steering_norm),
        a: throttle_norm,
    }
}
