//! # Goal execution context
//!
//! Everything a goal needs while it executes: the hardware, shared access to the mode, the
//! backlash state, the signal channel through which it can be cancelled or stopped, and the
//! channel its feedback is streamed on.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::warn;
use std::sync::{
    mpsc::{Receiver, RecvTimeoutError, Sender},
    Mutex, PoisonError,
};
use std::thread;
use std::time::Duration;

// Internal
use crate::{
    backlash::BacklashState, goal_error::GoalError, hardware::Hardware,
    mode_ctrl::ModeReadGuard, params::CalibrationParams,
};
use comms_if::tm::Feedback;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ExecContext<'a> {
    pub hardware: &'a dyn Hardware,
    pub gate: &'a ModeReadGuard<'a>,
    pub backlash: &'a Mutex<BacklashState>,
    pub calibration: &'a CalibrationParams,
    pub signals: GoalSignals,
    pub feedback: Sender<Feedback>,
}

/// Receiving end of a goal's signal channel.
///
/// A signal received while waiting is kept until the next check, so it is never lost.
pub struct GoalSignals {
    rx: Receiver<GoalSignal>,
    pending: Option<GoalSignal>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalSignal {
    /// The goal was cancelled by its client, or replaced by a new goal.
    Cancel,

    /// The robot was stopped.
    Stop,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<'a> ExecContext<'a> {
    /// Check both preemption sources: the signal channel and the global stop flag.
    pub fn check_preempted(&mut self) -> Option<GoalError> {
        let signal = match self.signals.check() {
            Some(s) => Some(s),
            None if self.gate.stop_requested() => Some(GoalSignal::Stop),
            None => None,
        };

        match signal {
            Some(GoalSignal::Cancel) => Some(GoalError::preempted("Goal was cancelled")),
            Some(GoalSignal::Stop) => {
                self.gate.clear_stop();
                Some(GoalError::preempted(
                    "Goal was preempted because the robot was stopped",
                ))
            }
            None => None,
        }
    }

    /// Take a copy of the backlash state, updated with the given status.
    pub fn update_backlash(&self, status: &comms_if::eqpt::RobotStatus) -> BacklashState {
        let mut backlash = self
            .backlash
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        backlash.update_from_status(status, self.calibration);
        *backlash
    }

    pub fn send_feedback(&self, feedback: Feedback) {
        // The client may have dropped its handle, which is not an error
        self.feedback.send(feedback).ok();
    }
}

impl GoalSignals {
    pub fn new(rx: Receiver<GoalSignal>) -> Self {
        Self { rx, pending: None }
    }

    /// Get any signal received so far, without blocking.
    pub fn check(&mut self) -> Option<GoalSignal> {
        self.pending.take().or_else(|| self.rx.try_recv().ok())
    }

    /// Wait one tick, returning early if a signal arrives.
    pub fn wait(&mut self, period: Duration) {
        if self.pending.is_some() {
            return;
        }

        match self.rx.recv_timeout(period) {
            Ok(s) => self.pending = Some(s),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Goal signal channel disconnected");
                thread::sleep(period)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Instant;

    #[test]
    fn test_signal_kept_until_checked() {
        let (tx, rx) = channel();
        let mut signals = GoalSignals::new(rx);

        assert_eq!(signals.check(), None);

        tx.send(GoalSignal::Cancel).unwrap();
        let start = Instant::now();
        signals.wait(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));

        assert_eq!(signals.check(), Some(GoalSignal::Cancel));
        assert_eq!(signals.check(), None);
    }
}
