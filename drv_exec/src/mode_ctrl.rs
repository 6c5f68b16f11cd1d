//! # Mode controller
//!
//! The mode controller owns the operating mode of the driver and gates access to it.
//!
//! Goal executions and the periodic cycle take *shared* access with [`ModeController::read`] and
//! hold it for as long as they rely on the mode. A mode transition takes *exclusive* access: it
//! waits for every shared holder to release, and while it waits no new shared holder is admitted.
//!
//! The stop flag, the manipulation origin and the last base velocity command live in the same gate
//! state, so a single lock covers everything the stop handler and the goal thread share.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

// Internal
use comms_if::{eqpt::BaseStatus, tc::Mode, tc::Twist};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct ModeController {
    state: Mutex<GateState>,
    cond: Condvar,
}

/// Shared access to the mode. Released on drop.
pub struct ModeReadGuard<'a> {
    ctrl: &'a ModeController,
}

/// Base pose captured when entering manipulation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ManipulationOrigin {
    /// Units: meters
    pub x: f64,
    /// Units: meters
    pub y: f64,
    /// Units: radians
    pub theta: f64,
}

/// What the periodic cycle needs from the gate, read without taking shared access.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleView {
    pub mode: Mode,
    pub origin: Option<ManipulationOrigin>,

    /// Base velocity to command this cycle, if any.
    pub base_velocity: Option<Twist>,
}

/// Mode dependent data a transition's setup may change.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModeData {
    pub origin: Option<ManipulationOrigin>,
    pub twist: Twist,
}

struct GateState {
    mode: Mode,
    data: ModeData,

    /// Time the stored twist was received, `None` once it has been zeroed.
    twist_stamp: Option<Instant>,

    stop_requested: bool,

    readers: usize,
    writer_active: bool,
    writers_waiting: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModeError {
    #[error("The robot must be in navigation mode to receive a twist, current mode = {0}")]
    NotInNavigationMode(Mode),

    #[error("Setup of {0} mode failed: {1}")]
    SetupFailed(Mode, String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ModeController {
    pub fn new(initial_mode: Mode) -> Self {
        Self {
            state: Mutex::new(GateState {
                mode: initial_mode,
                data: ModeData::default(),
                twist_stamp: None,
                stop_requested: false,
                readers: 0,
                writer_active: false,
                writers_waiting: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Acquire shared access, blocking while a transition is running or waiting.
    pub fn read(&self) -> ModeReadGuard<'_> {
        let mut state = self.lock();

        while state.writer_active || state.writers_waiting > 0 {
            state = self
                .cond
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.readers += 1;

        ModeReadGuard { ctrl: self }
    }

    /// Change the mode to `new_mode` and run `setup` with exclusive access.
    ///
    /// `setup` may change the mode data, for instance to capture the manipulation origin. If it
    /// fails the previous mode and data are restored and the error is returned.
    pub fn change_mode<F>(&self, new_mode: Mode, setup: F) -> Result<(), ModeError>
    where
        F: FnOnce(&mut ModeData) -> Result<(), String>,
    {
        let (prev_mode, mut data) = {
            let mut state = self.lock();

            state.writers_waiting += 1;
            while state.writer_active || state.readers > 0 {
                state = self
                    .cond
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            state.writers_waiting -= 1;
            state.writer_active = true;

            let prev_mode = state.mode;
            state.mode = new_mode;

            (prev_mode, state.data)
        };

        // Setup runs without the lock held, as it may block on the hardware. Exclusivity is
        // still guaranteed by writer_active.
        let prev_data = data;
        let result = setup(&mut data);

        let mut state = self.lock();
        let result = match result {
            Ok(()) => {
                state.data = data;
                if data.twist == Twist::zero() {
                    state.twist_stamp = None;
                }
                info!("Changed to mode = {}", new_mode);
                Ok(())
            }
            Err(e) => {
                state.mode = prev_mode;
                state.data = prev_data;
                error!(
                    "Could not change to mode = {}, staying in mode = {}: {}",
                    new_mode, prev_mode, e
                );
                Err(ModeError::SetupFailed(new_mode, e))
            }
        };
        state.writer_active = false;
        self.cond.notify_all();

        result
    }

    /// Snapshot of the current mode, without acquiring shared access.
    pub fn mode(&self) -> Mode {
        self.lock().mode
    }

    /// Read the state the periodic cycle needs.
    ///
    /// Never waits on the gate, so the cycle keeps running while a transition waits for executing
    /// goals. No base velocity is demanded while a transition is running.
    pub fn cycle_view(&self, now: Instant, timeout: Duration) -> CycleView {
        let mut state = self.lock();

        let base_velocity = if state.writer_active {
            None
        } else {
            state.take_velocity_demand(now, timeout)
        };

        CycleView {
            mode: state.mode,
            origin: state.data.origin,
            base_velocity,
        }
    }

    /// Raise the stop flag, observed by the executing goal at its next tick.
    pub fn request_stop(&self) {
        self.lock().stop_requested = true;
    }

    pub fn is_stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    /// Store a base velocity command.
    ///
    /// Only accepted in navigation mode, otherwise the stored command is left untouched.
    pub fn set_base_velocity(&self, twist: Twist) -> Result<(), ModeError> {
        let _guard = self.read();
        let mut state = self.lock();

        if state.mode != Mode::Navigation {
            let err = ModeError::NotInNavigationMode(state.mode);
            error!("{}", err);
            return Err(err);
        }

        state.data.twist = twist;
        state.twist_stamp = Some(Instant::now());

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<'a> ModeReadGuard<'a> {
    pub fn mode(&self) -> Mode {
        self.ctrl.lock().mode
    }

    pub fn origin(&self) -> Option<ManipulationOrigin> {
        self.ctrl.lock().data.origin
    }

    pub fn stop_requested(&self) -> bool {
        self.ctrl.lock().stop_requested
    }

    /// Lower the stop flag.
    pub fn clear_stop(&self) {
        self.ctrl.lock().stop_requested = false;
    }

    /// Base velocity to command in the periodic cycle.
    ///
    /// Returns `None` outside navigation mode, or when there is nothing new to send. A twist
    /// older than `timeout` is replaced by a zero velocity, which is returned once.
    pub fn base_velocity_demand(&self, now: Instant, timeout: Duration) -> Option<Twist> {
        self.ctrl.lock().take_velocity_demand(now, timeout)
    }

    /// The last stored base velocity command.
    pub fn twist(&self) -> Twist {
        self.ctrl.lock().data.twist
    }
}

impl<'a> Drop for ModeReadGuard<'a> {
    fn drop(&mut self) {
        let mut state = self.ctrl.lock();
        state.readers -= 1;
        self.ctrl.cond.notify_all();
    }
}

impl GateState {
    fn take_velocity_demand(&mut self, now: Instant, timeout: Duration) -> Option<Twist> {
        if self.mode != Mode::Navigation {
            return None;
        }

        match self.twist_stamp {
            Some(stamp) if now.saturating_duration_since(stamp) > timeout => {
                self.data.twist = Twist::zero();
                self.twist_stamp = None;
                Some(Twist::zero())
            }
            Some(_) => Some(self.data.twist),
            None => None,
        }
    }
}

impl ManipulationOrigin {
    pub fn from_base(base: &BaseStatus) -> Self {
        Self {
            x: base.x,
            y: base.y,
            theta: base.theta,
        }
    }

    /// Distance travelled by the base from the origin, along the origin's heading.
    ///
    /// Units: meters
    pub fn translation_of(&self, base: &BaseStatus) -> f64 {
        (base.x - self.x) * self.theta.cos() + (base.y - self.y) * self.theta.sin()
    }
}
