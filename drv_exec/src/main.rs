//! Main driver executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logger and parameters
//!     - Bring up the robot and the driver in the initial mode
//!     - Main loop:
//!         - Dispatch the script commands which have become due, mode switches and goals go
//!           through the command worker so the loop never waits on a mode change
//!         - Collect the results of finished goals
//!         - Run the driver's periodic cycle (base velocity, joint states, backlash)
//!
//! Without a script the driver idles in the initial mode until the process is killed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, info, warn};
use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use comms_if::tc::{DriverCmd, Twist};
use drv_lib::{
    cmd_worker::{CmdWorker, WorkerEvent},
    driver::{Driver, GoalHandle},
    hardware::{SimMotion, SimRobot},
    params::DrvExecParams,
    script::{PendingCmds, ScriptInterpreter},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::{self, Session},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of cycles between two joint state reports in the log.
const STATE_REPORT_CYCLES: u64 = 50;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new("drv_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Stretch Driver Executable\n");
    match host::get_drv_root() {
        Ok(root) => info!("Driver root: {:?}", root),
        Err(e) => warn!("Driver root is not set: {}", e),
    }
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: DrvExecParams =
        util::params::load("drv_exec.toml").wrap_err("Could not load driver params")?;

    params.validate().wrap_err("Invalid driver params")?;
    let cycle_period = Duration::from_secs_f64(1.0 / params.cycle_frequency_hz);

    info!("Driver parameters loaded");

    // ---- LOAD SCRIPT ----

    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    let mut script = match args.len() {
        1 => {
            info!("No script provided, idling in the initial mode\n");
            None
        }
        2 => {
            info!("Loading script from \"{}\"", &args[1]);

            let si = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} commands\n",
                si.get_duration(),
                si.get_num_cmds()
            );

            Some(si)
        }
        n => {
            return Err(eyre!(
                "Expected either zero or one argument, found {}",
                n - 1
            ))
        }
    };

    // ---- INITIALISE DRIVER ----

    let robot = Arc::new(SimRobot::new(SimMotion::Rate));
    info!("Simulated robot initialised");

    let driver =
        Arc::new(Driver::new(robot, params).wrap_err("Failed to initialise the driver")?);
    info!("Driver initialised in {} mode", driver.mode());

    let mut worker =
        CmdWorker::new(driver.clone()).wrap_err("Failed to start the command worker")?;

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut goals: Vec<GoalHandle> = Vec::new();
    let mut script_ended = false;
    let mut num_cycles: u64 = 0;

    loop {
        let cycle_start_instant = Instant::now();

        // ---- COMMAND PROCESSING ----

        if let Some(si) = script.as_mut() {
            match si.get_pending(session::get_elapsed_seconds()) {
                PendingCmds::None => (),
                PendingCmds::Some(cmds) => {
                    for cmd in cmds {
                        dispatch(&driver, &mut worker, cmd);
                    }
                }
                PendingCmds::EndOfScript => {
                    if !script_ended {
                        info!("End of script reached, waiting for the active goal");
                        script_ended = true;
                    }
                }
            }
        }

        // ---- WORKER EVENTS ----

        for event in worker.events() {
            match event {
                WorkerEvent::ModeSwitched(mode, response) => {
                    if response.success {
                        info!("{}", response.message);
                    } else {
                        warn!("Could not switch to {} mode: {}", mode, response.message);
                    }
                }
                WorkerEvent::GoalSubmitted(handle) => {
                    info!("Submitted goal {}", handle.id());
                    goals.push(handle);
                }
                WorkerEvent::TwistHandled(Err(e)) => {
                    warn!("Base velocity command rejected: {}", e)
                }
                WorkerEvent::TwistHandled(Ok(())) => (),
            }
        }

        // ---- GOAL RESULTS ----

        goals.retain(|goal| match goal.try_result() {
            Some(result) => {
                info!("Goal {} finished: {}", goal.id(), result);
                session.save(format!("goal_results/goal_{}.json", goal.id()), result);
                false
            }
            None => true,
        });

        // ---- PERIODIC CYCLE ----

        match driver.cycle() {
            Ok(state) => {
                if num_cycles % STATE_REPORT_CYCLES == 0 {
                    debug!(
                        "{} mode, odometry: ({:.03}, {:.03}, {:.03})",
                        state.mode, state.odometry.x, state.odometry.y, state.odometry.theta
                    );
                }
            }
            Err(e) => warn!("Error during the driver cycle: {}", e),
        }

        if script_ended && worker.is_idle() && goals.is_empty() && !driver.is_goal_active() {
            info!("Script complete, stopping");
            break;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period.as_secs_f64()
            ),
        }

        num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    // Cancelling the goal first releases any mode switch the worker is waiting on
    driver.shutdown();
    worker.shutdown();
    session.exit();

    info!("End of execution");

    Ok(())
}

/// Forward one script command. Stop and runstop act immediately, everything else is queued on
/// the worker.
fn dispatch(driver: &Driver, worker: &mut CmdWorker, cmd: DriverCmd) {
    match cmd {
        DriverCmd::SwitchMode { mode } => worker.switch_mode(mode),
        DriverCmd::Goal { trajectory } => worker.submit_goal(trajectory),
        DriverCmd::Twist {
            linear_mps,
            angular_radps,
        } => worker.set_base_velocity(Twist {
            linear_mps,
            angular_radps,
        }),
        DriverCmd::Stop => {
            info!("{}", driver.stop().message);
        }
        DriverCmd::Runstop { enable } => {
            info!("{}", driver.runstop(enable).message);
        }
    }
}
