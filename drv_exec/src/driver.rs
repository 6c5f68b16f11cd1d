//! # Driver
//!
//! The driver owns the hardware handle, the mode controller, the backlash state and the single
//! active goal. It is the entry point for everything the outside world asks of the robot: goals,
//! mode switches, base velocity commands and the emergency stop. The periodic cycle is also run
//! through it, at the rate set by the executable.
//!
//! Goals run on their own thread. Submitting a new goal preempts the active one and waits for it
//! to finish before the new goal starts, so at most one goal executes at a time.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info, warn};
use std::sync::{
    mpsc::{channel, Receiver, Sender, TryRecvError},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

// Internal
use crate::{
    backlash::BacklashState,
    cmd_groups::{CommandGroups, RegistryError},
    goal_error::GoalError,
    goal_exec::{ExecContext, GoalExecutor, GoalSignal, GoalSignals},
    hardware::{self, Hardware, HardwareError},
    joint_state::DriverState,
    mode_ctrl::{ManipulationOrigin, ModeController, ModeError},
    params::{DrvExecParams, ParamsError},
    traj_interp::TrajectoryInterpolator,
};
use comms_if::{
    tc::{JointTrajectory, Mode, ModeResponse, Twist},
    tm::{Feedback, GoalResult},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Driver {
    hardware: Arc<dyn Hardware>,
    mode_ctrl: Arc<ModeController>,
    backlash: Arc<Mutex<BacklashState>>,
    params: Arc<DrvExecParams>,

    active: Mutex<Option<ActiveGoal>>,
    next_goal_id: Mutex<u64>,
}

struct ActiveGoal {
    id: u64,
    signal_tx: Sender<GoalSignal>,
    thread: JoinHandle<()>,
}

/// Client side of a submitted goal.
pub struct GoalHandle {
    id: u64,
    signal_tx: Sender<GoalSignal>,
    feedback_rx: Receiver<Feedback>,
    result_rx: Receiver<GoalResult>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Invalid command group registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("Invalid driver parameters: {0}")]
    InvalidParams(#[from] ParamsError),

    #[error("Could not enter the initial mode: {0}")]
    InitialMode(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Driver {
    /// Create the driver and switch the robot into the initial mode.
    pub fn new(hardware: Arc<dyn Hardware>, params: DrvExecParams) -> Result<Self, DriverError> {
        params.validate()?;

        // Check the registry once up front, each goal builds its own
        CommandGroups::new(&params)?;

        for offset in params.calibration.unusual_offsets() {
            warn!("Calibration offset has an unusually large magnitude: {}", offset);
        }

        let initial_mode = params.initial_mode;

        let driver = Self {
            hardware,
            mode_ctrl: Arc::new(ModeController::new(Mode::Position)),
            backlash: Arc::new(Mutex::new(BacklashState::default())),
            params: Arc::new(params),
            active: Mutex::new(None),
            next_goal_id: Mutex::new(0),
        };

        let response = driver.switch_mode(initial_mode);
        if !response.success {
            return Err(DriverError::InitialMode(response.message));
        }

        info!("Driver started in {} mode", initial_mode);

        Ok(driver)
    }

    pub fn mode(&self) -> Mode {
        self.mode_ctrl.mode()
    }

    pub fn params(&self) -> &DrvExecParams {
        &self.params
    }

    /// Submit a new goal, preempting the active one.
    pub fn submit_goal(&self, trajectory: JointTrajectory) -> GoalHandle {
        let id = {
            let mut next = lock(&self.next_goal_id);
            *next += 1;
            *next
        };

        let mut active = lock(&self.active);

        if let Some(prev) = active.take() {
            info!("Goal {} preempted by goal {}", prev.id, id);
            prev.signal_tx.send(GoalSignal::Cancel).ok();
            if prev.thread.join().is_err() {
                error!("Goal {} thread panicked", prev.id);
            }
        }

        let (signal_tx, signal_rx) = channel();
        let (feedback_tx, feedback_rx) = channel();
        let (result_tx, result_rx) = channel();

        let hardware = self.hardware.clone();
        let mode_ctrl = self.mode_ctrl.clone();
        let backlash = self.backlash.clone();
        let params = self.params.clone();

        let thread = thread::spawn(move || {
            let gate = mode_ctrl.read();
            let mut ctx = ExecContext {
                hardware: &*hardware,
                gate: &gate,
                backlash: &backlash,
                calibration: &params.calibration,
                signals: GoalSignals::new(signal_rx),
                feedback: feedback_tx,
            };

            let result = match gate.mode() {
                Mode::Manipulation => {
                    TrajectoryInterpolator::new(params.goal.clone()).execute(trajectory, &mut ctx)
                }
                _ => match CommandGroups::new(&params) {
                    Ok(groups) => {
                        GoalExecutor::new(groups, params.goal.clone()).execute(trajectory, &mut ctx)
                    }
                    Err(e) => GoalError::unknown(e.to_string()).into(),
                },
            };

            info!("Goal {} finished with {}", id, result);
            result_tx.send(result).ok();
        });

        *active = Some(ActiveGoal {
            id,
            signal_tx: signal_tx.clone(),
            thread,
        });

        GoalHandle {
            id,
            signal_tx,
            feedback_rx,
            result_rx,
        }
    }

    /// Switch to the given mode, running its setup.
    ///
    /// Blocks until every executing goal has finished.
    pub fn switch_mode(&self, mode: Mode) -> ModeResponse {
        let hardware = &*self.hardware;

        let result = self.mode_ctrl.change_mode(mode, |data| match mode {
            Mode::Navigation => {
                data.twist = Twist::zero();
                Ok(())
            }
            Mode::Manipulation => {
                hardware.enable_pos_incr_mode();
                let status = hardware.get_status().map_err(|e| e.to_string())?;
                data.origin = Some(ManipulationOrigin::from_base(&status.base));
                Ok(())
            }
            Mode::Position => {
                hardware.enable_pos_incr_mode();
                Ok(())
            }
            Mode::Calibration => hardware.home().map_err(|e| e.to_string()),
        });

        match result {
            Ok(()) => ModeResponse::ok(match mode {
                Mode::Calibration => String::from("Calibrated."),
                m => format!("Now in {} mode.", m),
            }),
            Err(e) => ModeResponse::failed(e.to_string()),
        }
    }

    pub fn navigation_mode(&self) -> ModeResponse {
        self.switch_mode(Mode::Navigation)
    }

    pub fn manipulation_mode(&self) -> ModeResponse {
        self.switch_mode(Mode::Manipulation)
    }

    pub fn position_mode(&self) -> ModeResponse {
        self.switch_mode(Mode::Position)
    }

    pub fn calibrate(&self) -> ModeResponse {
        info!("Received calibrate_the_robot service call.");
        self.switch_mode(Mode::Calibration)
    }

    /// Hold every actuator where it is and preempt the active goal.
    pub fn stop(&self) -> ModeResponse {
        self.mode_ctrl.request_stop();

        if let Err(e) = hardware::halt(&*self.hardware) {
            error!("Could not command the actuators to stop: {}", e);
        }

        if let Some(goal) = lock(&self.active).as_ref() {
            goal.signal_tx.send(GoalSignal::Stop).ok();
        }

        info!("Received stop_the_robot service call, so commanded all actuators to stop.");
        ModeResponse::ok("Stopped the robot.")
    }

    /// Trigger or reset the runstop. Triggering also stops the robot.
    pub fn runstop(&self, enable: bool) -> ModeResponse {
        if enable {
            self.stop();
        }
        self.hardware.set_runstop(enable);

        ModeResponse::ok(format!("is_runstopped: {}", enable))
    }

    /// Store a base velocity command, sent by the periodic cycle.
    pub fn set_base_velocity(&self, twist: Twist) -> Result<(), ModeError> {
        self.mode_ctrl.set_base_velocity(twist)
    }

    /// Run one periodic cycle: command the base velocity when in navigation mode, then compute
    /// the driver state from a fresh status.
    ///
    /// The cycle never waits on the mode gate, it keeps running while a mode switch waits for the
    /// executing goal.
    pub fn cycle(&self) -> Result<DriverState, HardwareError> {
        let timeout = Duration::from_secs_f64(self.params.cmd_vel_timeout_s);
        let view = self.mode_ctrl.cycle_view(Instant::now(), timeout);

        if let Some(twist) = view.base_velocity {
            self.hardware.set_base_velocity(twist);
            self.hardware.push_command()?;
        }

        let status = self.hardware.get_status()?;
        let backlash = {
            let mut b = lock(&self.backlash);
            b.update_from_status(&status, &self.params.calibration);
            *b
        };

        Ok(DriverState::from_status(
            &status,
            view.mode,
            view.origin.as_ref(),
            &backlash,
            &self.params.calibration,
            &self.params.gripper,
        ))
    }

    /// True if a goal thread is still running.
    pub fn is_goal_active(&self) -> bool {
        lock(&self.active)
            .as_ref()
            .map(|g| !g.thread.is_finished())
            .unwrap_or(false)
    }

    /// Cancel the active goal and wait for it to finish.
    pub fn shutdown(&self) {
        if let Some(goal) = lock(&self.active).take() {
            goal.signal_tx.send(GoalSignal::Cancel).ok();
            if goal.thread.join().is_err() {
                error!("Goal {} thread panicked", goal.id);
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl GoalHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask the goal to stop. The result is still delivered through [`GoalHandle::wait`].
    pub fn cancel(&self) {
        self.signal_tx.send(GoalSignal::Cancel).ok();
    }

    /// Feedback received so far.
    pub fn feedback(&self) -> Vec<Feedback> {
        self.feedback_rx.try_iter().collect()
    }

    /// The result if the goal has finished.
    pub fn try_result(&self) -> Option<GoalResult> {
        match self.result_rx.try_recv() {
            Ok(r) => Some(r),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(thread_lost()),
        }
    }

    /// Block until the goal finishes.
    pub fn wait(&self) -> GoalResult {
        self.result_rx.recv().unwrap_or_else(|_| thread_lost())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn thread_lost() -> GoalResult {
    GoalError::unknown("The goal ended without a result").into()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::{SimMotion, SimRobot};
    use comms_if::{tc::TrajectoryPoint, tm::ResultCode};

    fn driver(motion: SimMotion, params: DrvExecParams) -> (Driver, Arc<SimRobot>) {
        let sim = Arc::new(SimRobot::new(motion));
        let driver = Driver::new(sim.clone(), params).unwrap();
        (driver, sim)
    }

    fn fast_params() -> DrvExecParams {
        let mut params = DrvExecParams::default();
        params.goal.poll_rate_hz = 100.0;
        params.goal.trajectory_rate_hz = 100.0;
        params
    }

    fn lift_goal(pos: f64) -> JointTrajectory {
        JointTrajectory::new(&["joint_lift"]).with_point(TrajectoryPoint::new(0.0, vec![pos]))
    }

    #[test]
    fn test_initial_mode_setup() {
        let mut params = fast_params();
        params.initial_mode = Mode::Manipulation;
        let (driver, sim) = driver(SimMotion::Instant, params);

        assert_eq!(driver.mode(), Mode::Manipulation);
        assert_eq!(sim.calls().pos_incr_enables, 1);

        // Homing fails on a faulty robot, the mode is left unchanged
        sim.set_fault(Some(HardwareError::CommsError(String::from("unplugged"))));
        let response = driver.calibrate();
        assert!(!response.success);
        assert_eq!(driver.mode(), Mode::Manipulation);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let sim = Arc::new(SimRobot::new(SimMotion::Instant));

        let mut params = fast_params();
        params.goal.poll_rate_hz = 0.0;
        assert!(matches!(
            Driver::new(sim.clone(), params),
            Err(DriverError::InvalidParams(ParamsError::InvalidRate(..)))
        ));

        let mut params = fast_params();
        params.cmd_vel_timeout_s = -0.5;
        assert!(matches!(
            Driver::new(sim.clone(), params),
            Err(DriverError::InvalidParams(ParamsError::InvalidDuration(..)))
        ));

        // Nothing reached the robot
        assert_eq!(sim.calls().pos_incr_enables, 0);
        assert_eq!(sim.calls().pushes, 0);
    }

    #[test]
    fn test_cycle_runs_while_mode_switch_waits() {
        let (driver, _sim) = driver(SimMotion::Frozen, fast_params());
        let driver = Arc::new(driver);

        let goal = driver.submit_goal(lift_goal(0.6));
        thread::sleep(Duration::from_millis(20));

        let (tx, rx) = channel();
        let switcher = {
            let driver = driver.clone();
            thread::spawn(move || tx.send(driver.navigation_mode()).unwrap())
        };

        // The switch waits for the goal, the cycle does not
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        let state = driver.cycle().unwrap();
        assert_eq!(state.mode, Mode::Position);

        goal.cancel();
        assert_eq!(goal.wait().code, ResultCode::Preempted);
        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap().success);
        switcher.join().unwrap();
    }

    #[test]
    fn test_goal_succeeds() {
        let (driver, sim) = driver(SimMotion::Instant, fast_params());

        let handle = driver.submit_goal(lift_goal(0.6));
        let result = handle.wait();

        assert!(result.is_success(), "{}", result);
        assert!((sim.peek_status().lift.pos - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_stop_preempts_goal() {
        let (driver, sim) = driver(SimMotion::Frozen, fast_params());

        let handle = driver.submit_goal(lift_goal(0.6));
        thread::sleep(Duration::from_millis(50));

        let pushes = sim.calls().pushes;
        assert!(driver.stop().success);
        assert_eq!(sim.calls().pushes, pushes + 1);

        assert_eq!(handle.wait().code, ResultCode::Preempted);
    }

    #[test]
    fn test_new_goal_preempts_active_goal() {
        let (driver, _sim) = driver(SimMotion::Frozen, fast_params());

        let first = driver.submit_goal(lift_goal(0.6));
        let second = driver.submit_goal(lift_goal(0.7));

        assert_eq!(first.wait().code, ResultCode::Preempted);
        assert_ne!(first.id(), second.id());

        second.cancel();
        assert_eq!(second.wait().code, ResultCode::Preempted);
    }

    #[test]
    fn test_base_velocity_only_in_navigation() {
        let (driver, sim) = driver(SimMotion::Instant, fast_params());

        let twist = Twist::new(0.2, 0.1);
        assert_eq!(
            driver.set_base_velocity(twist),
            Err(ModeError::NotInNavigationMode(Mode::Position))
        );
        driver.cycle().unwrap();
        assert_eq!(sim.calls().velocity_cmds, 0);

        assert!(driver.navigation_mode().success);
        driver.set_base_velocity(twist).unwrap();
        driver.cycle().unwrap();
        assert_eq!(sim.calls().velocity_cmds, 1);
        assert_eq!(sim.base_velocity(), twist);
    }

    #[test]
    fn test_stale_velocity_zeroed() {
        let mut params = fast_params();
        params.initial_mode = Mode::Navigation;
        params.cmd_vel_timeout_s = 0.02;
        let (driver, sim) = driver(SimMotion::Instant, params);

        driver.set_base_velocity(Twist::new(0.2, 0.0)).unwrap();
        thread::sleep(Duration::from_millis(50));
        driver.cycle().unwrap();

        assert_eq!(sim.base_velocity(), Twist::zero());
    }

    #[test]
    fn test_manipulation_goals_are_interpolated() {
        let (driver, sim) = driver(SimMotion::Instant, fast_params());
        sim.modify_status(|s| s.base.x = 1.0);
        assert!(driver.manipulation_mode().success);

        let traj = JointTrajectory::new(&["joint_lift", "position"])
            .with_point(TrajectoryPoint::new(0.0, vec![0.0, 0.0]))
            .with_point(TrajectoryPoint::new(0.1, vec![0.2, 0.1]));
        let result = driver.submit_goal(traj).wait();

        assert!(result.is_success(), "{}", result);
        assert_eq!(sim.calls().trajectory_starts, 1);

        let state = driver.cycle().unwrap();
        assert!((state.joints.position("joint_lift").unwrap() - 0.2).abs() < 1e-9);
        assert!(
            (state.joints.position("joint_mobile_base_translation").unwrap() - 0.1).abs() < 1e-9
        );
        assert!((state.odometry.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_runstop() {
        let (driver, sim) = driver(SimMotion::Instant, fast_params());

        let response = driver.runstop(true);
        assert!(response.success);
        assert!(sim.peek_status().runstopped);

        driver.runstop(false);
        assert!(!sim.peek_status().runstopped);
    }
}
