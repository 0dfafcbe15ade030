//! Main MPC executable entry point.
//!
//! # Architecture
//!
//! The executable drives the MPC controller against the simulated vehicle:
//!
//!     - Initialise the session, logging and parameters
//!     - Build the track and place the vehicle on it
//!     - Main loop:
//!         - Telemetry acquisition from the vehicle
//!         - MPC control processing
//!         - Command forwarding, after the actuation latency
//!         - Vehicle propagation over one cycle
//!     - Save the driven path and the issued commands into the session
//!
//! A failed control cycle does not stop the vehicle. The last good command
//! is held until too many cycles fail in a row, at which point the run is
//! aborted.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, info, trace, warn};
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use comms_if::cmd::SteerCmd;
use mpc_lib::{
    mpc_ctrl::MpcCtrl,
    sim::{CteStats, Fallback, SimParams, SimVehicle, Track, TrackParams},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    maths::rad2deg,
    module::State,
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const CTRL_PARAMS_FILE: &str = "mpc_ctrl.toml";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Run the MPC controller around a simulated track.
#[derive(Debug, StructOpt)]
#[structopt(name = "mpc_exec")]
struct Args {
    /// Parameter file of the simulation, relative to the params directory.
    #[structopt(long, default_value = "sim.toml")]
    sim_params: String,

    /// Parameter file of the track.
    #[structopt(long, default_value = "track.toml")]
    track_params: String,

    /// Override the number of cycles to run.
    #[structopt(short, long)]
    cycles: Option<usize>,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("mpc_exec", "sessions")
        .wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session)
        .wrap_err("Failed to initialise logging")?;

    info!("MPC Executable\n");
    info!("Running on: {}", host::get_platform());
    info!("Session directory: {:?}\n", session.session_root);
    debug!("CLI arguments: {:?}", args);

    // ---- LOAD PARAMETERS ----

    let mut sim_params: SimParams = util::params::load(&args.sim_params)
        .wrap_err("Could not load sim params")?;
    let track_params: TrackParams = util::params::load(&args.track_params)
        .wrap_err("Could not load track params")?;

    if let Some(c) = args.cycles {
        sim_params.num_cycles = c;
    }

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut mpc_ctrl: MpcCtrl = MpcCtrl::default();
    mpc_ctrl.init(CTRL_PARAMS_FILE, &session)
        .wrap_err("Failed to initialise MpcCtrl")?;
    info!("MpcCtrl init complete");

    let track = Track::from_params(&track_params)
        .wrap_err("Failed to build the track")?;

    let mut vehicle = SimVehicle::on_track(
        &sim_params,
        &track,
        mpc_ctrl.params().mpc.lf_m,
        mpc_ctrl.params().mpc.max_steer_rad
    );

    info!(
        "Track has {} points, vehicle starts at ({:.2}, {:.2})\n",
        track.num_points(),
        vehicle.state().x,
        vehicle.state().y
    );

    // ---- MAIN LOOP ----

    let mut fallback = Fallback::new(sim_params.max_consecutive_failures);
    let mut cte_stats = CteStats::default();
    let mut path = Vec::with_capacity(sim_params.num_cycles + 1);
    let mut cmds: Vec<SteerCmd> = Vec::with_capacity(sim_params.num_cycles);

    path.push(vehicle.path_point());

    info!("Begining main loop\n");

    for cycle in 0..sim_params.num_cycles {
        // ---- DATA INPUT ----

        let tlm = vehicle.telemetry(&track, sim_params.lookahead);

        // ---- MPC CONTROL ----

        let cmd = match mpc_ctrl.proc(&tlm) {
            Ok((cmd, report)) => {
                trace!("Cycle {}: {:?}", cycle, report);

                if report.solve_time_s > sim_params.cycle_period_s {
                    warn!(
                        "Cycle {} overran: solve took {:.3} s",
                        cycle,
                        report.solve_time_s
                    );
                }

                fallback.success(&cmd);
                cmd
            }
            Err(e) => {
                warn!("Cycle {} failed: {}", cycle, e);
                fallback.failure().wrap_err("Aborting the run")?
            }
        };

        match cmd.to_json() {
            Ok(s) => trace!("Command: {}", s),
            Err(e) => warn!("Could not serialise the command: {}", e),
        }

        // ---- COMMAND FORWARDING ----

        if sim_params.realtime && sim_params.latency_s > 0.0 {
            thread::sleep(Duration::from_secs_f64(sim_params.latency_s));
        }

        vehicle.command(&cmd);
        vehicle.step(sim_params.cycle_period_s);

        // ---- RECORDING ----

        let cte_m = track.distance_m(&vehicle.position_m());
        cte_stats.update(cte_m);

        debug!(
            "t = {:.2} s, speed = {:.2}, steer = {:.1} deg, |CTE| = {:.3} m",
            vehicle.time_s(),
            vehicle.state().v,
            rad2deg(vehicle.applied().delta),
            cte_m
        );

        path.push(vehicle.path_point());
        cmds.push(cmd);
    }

    // ---- SHUTDOWN ----

    info!(
        "Run complete: {} cycles, mean |CTE| {:.3} m, max |CTE| {:.3} m",
        cte_stats.num_samples,
        cte_stats.mean_abs_m,
        cte_stats.max_abs_m
    );

    session.save("path.json", path);
    session.save("commands.json", cmds);
    session.save("cte_stats.json", cte_stats);

    session.exit();

    Ok(())
}
