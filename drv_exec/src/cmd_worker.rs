//! # Command worker
//!
//! Mode switches wait for the executing goal to finish, which can take many seconds. The worker
//! runs them on its own thread so the periodic cycle is never held up. Goals and base velocity
//! commands go through the worker too, so that they are applied in the order they were issued
//! relative to the mode switches.
//!
//! Stop and runstop must act immediately and are sent to the [`Driver`] directly.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::error;
use std::io;
use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc,
};
use std::thread::{self, JoinHandle};

// Internal
use crate::{
    driver::{Driver, GoalHandle},
    mode_ctrl::ModeError,
};
use comms_if::tc::{JointTrajectory, Mode, ModeResponse, Twist};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct CmdWorker {
    worker_sender: Sender<WorkerCmd>,
    worker_reciever: Receiver<WorkerEvent>,
    worker_jh: Option<JoinHandle<()>>,

    /// Commands sent but not yet answered.
    num_pending: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

enum WorkerCmd {
    SwitchMode(Mode),
    Goal(JointTrajectory),
    Twist(Twist),
    Stop,
}

/// Outcome of a command handled by the worker.
pub enum WorkerEvent {
    ModeSwitched(Mode, ModeResponse),
    GoalSubmitted(GoalHandle),
    TwistHandled(Result<(), ModeError>),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CmdWorker {
    /// Start the worker thread.
    pub fn new(driver: Arc<Driver>) -> io::Result<Self> {
        let (worker_sender, rx) = channel();
        let (tx, worker_reciever) = channel();

        let worker_jh = thread::Builder::new()
            .name("cmd_worker".into())
            .spawn(move || worker_thread(driver, rx, tx))?;

        Ok(Self {
            worker_sender,
            worker_reciever,
            worker_jh: Some(worker_jh),
            num_pending: 0,
        })
    }

    pub fn switch_mode(&mut self, mode: Mode) {
        self.send(WorkerCmd::SwitchMode(mode));
    }

    pub fn submit_goal(&mut self, trajectory: JointTrajectory) {
        self.send(WorkerCmd::Goal(trajectory));
    }

    pub fn set_base_velocity(&mut self, twist: Twist) {
        self.send(WorkerCmd::Twist(twist));
    }

    /// Events produced since the last call.
    pub fn events(&mut self) -> Vec<WorkerEvent> {
        let events: Vec<WorkerEvent> = self.worker_reciever.try_iter().collect();
        self.num_pending = self.num_pending.saturating_sub(events.len());
        events
    }

    /// True once every command sent has been answered.
    pub fn is_idle(&self) -> bool {
        self.num_pending == 0
    }

    /// Stop the worker after the commands already sent, and wait for it.
    pub fn shutdown(&mut self) {
        self.worker_sender.send(WorkerCmd::Stop).ok();

        if let Some(jh) = self.worker_jh.take() {
            if jh.join().is_err() {
                error!("Command worker thread panicked");
            }
        }
    }

    fn send(&mut self, cmd: WorkerCmd) {
        match self.worker_sender.send(cmd) {
            Ok(()) => self.num_pending += 1,
            Err(_) => error!("Command worker is not running, command dropped"),
        }
    }
}

impl Drop for CmdWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn worker_thread(
    driver: Arc<Driver>,
    main_reciever: Receiver<WorkerCmd>,
    main_sender: Sender<WorkerEvent>,
) {
    while let Ok(cmd) = main_reciever.recv() {
        let event = match cmd {
            WorkerCmd::Stop => break,
            WorkerCmd::SwitchMode(mode) => {
                WorkerEvent::ModeSwitched(mode, driver.switch_mode(mode))
            }
            WorkerCmd::Goal(trajectory) => {
                WorkerEvent::GoalSubmitted(driver.submit_goal(trajectory))
            }
            WorkerCmd::Twist(twist) => WorkerEvent::TwistHandled(driver.set_base_velocity(twist)),
        };

        // Main has gone away
        if main_sender.send(event).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::{SimMotion, SimRobot};
    use crate::params::DrvExecParams;
    use comms_if::{tc::TrajectoryPoint, tm::ResultCode};
    use std::time::{Duration, Instant};

    fn wait_for_events(worker: &mut CmdWorker, n: usize) -> Vec<WorkerEvent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut events = Vec::new();
        while events.len() < n && Instant::now() < deadline {
            events.extend(worker.events());
            thread::sleep(Duration::from_millis(5));
        }
        events
    }

    #[test]
    fn test_commands_handled_in_order() {
        let sim = Arc::new(SimRobot::new(SimMotion::Frozen));
        let mut params = DrvExecParams::default();
        params.goal.poll_rate_hz = 100.0;
        let driver = Arc::new(Driver::new(sim.clone(), params).unwrap());
        let mut worker = CmdWorker::new(driver.clone()).unwrap();

        worker.submit_goal(
            JointTrajectory::new(&["joint_lift"]).with_point(TrajectoryPoint::new(0.0, vec![0.6])),
        );
        worker.switch_mode(Mode::Navigation);
        worker.set_base_velocity(Twist::new(0.1, 0.0));

        let goal = match wait_for_events(&mut worker, 1).pop() {
            Some(WorkerEvent::GoalSubmitted(g)) => g,
            _ => panic!("Expected the goal to be submitted first"),
        };

        // The switch is waiting on the goal while the cycle keeps running
        thread::sleep(Duration::from_millis(30));
        assert!(!worker.is_idle());
        assert!(worker.events().is_empty());
        assert_eq!(driver.cycle().unwrap().mode, Mode::Position);

        goal.cancel();
        assert_eq!(goal.wait().code, ResultCode::Preempted);

        let events = wait_for_events(&mut worker, 2);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            WorkerEvent::ModeSwitched(Mode::Navigation, r) if r.success
        ));
        assert!(matches!(&events[1], WorkerEvent::TwistHandled(Ok(()))));
        assert!(worker.is_idle());

        driver.cycle().unwrap();
        assert_eq!(sim.base_velocity(), Twist::new(0.1, 0.0));

        worker.shutdown();
    }
}
