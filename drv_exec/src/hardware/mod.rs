//! # Hardware interface
//!
//! The driver never talks to the motors directly. Everything it needs from the robot is expressed
//! by the [`Hardware`] trait, which the real robot body (or the [`SimRobot`]) implements.
//!
//! Relative moves are staged and only sent to the motors together by [`Hardware::push_command`],
//! so that all the actuators of one goal point start moving at the same time.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use thiserror::Error;

// Internal
pub use sim::*;

use crate::traj_interp::{JointSpline, TrajJoint};
use comms_if::{
    eqpt::{Actuator, MotionLimits, RobotStatus},
    tc::Twist,
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Capabilities the driver consumes from the robot.
///
/// Implementations must be internally synchronized: the periodic cycle, the goal thread and the
/// stop handler all share one instance.
pub trait Hardware: Send + Sync {
    /// Take an atomic snapshot of every actuator.
    fn get_status(&self) -> Result<RobotStatus, HardwareError>;

    /// Send every staged command to the motors in one go.
    fn push_command(&self) -> Result<(), HardwareError>;

    /// Stage a move of `delta` relative to the actuator's current position.
    ///
    /// For the gripper `delta` is in the motor's percent scale.
    fn move_by(&self, actuator: Actuator, delta: f64, limits: MotionLimits);

    /// Stage a translation of the base along its current heading.
    fn translate_by(&self, delta_m: f64, limits: MotionLimits);

    /// Stage a rotation of the base about its centre.
    fn rotate_by(&self, delta_rad: f64, limits: MotionLimits);

    /// Stage a velocity demand for the base.
    fn set_base_velocity(&self, twist: Twist);

    /// Put the base in incremental position control.
    fn enable_pos_incr_mode(&self);

    /// Home all joints. Blocks until homing is complete.
    fn home(&self) -> Result<(), HardwareError>;

    /// Engage or release the runstop.
    fn set_runstop(&self, enable: bool);

    /// Load the trajectory to be played back by the given joint.
    fn set_trajectory(&self, joint: TrajJoint, spline: JointSpline) -> Result<(), HardwareError>;

    /// Start playing back all loaded trajectories. Does not block.
    fn start_trajectory(&self) -> Result<(), HardwareError>;

    /// Stop playback and discard the loaded trajectories.
    fn stop_trajectory(&self);

    fn is_trajectory_executing(&self) -> bool;
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HardwareError {
    #[error("Could not communicate with the robot: {0}")]
    CommsError(String),

    #[error("Homing failed: {0}")]
    HomingFailed(String),

    #[error("The {0:?} joint rejected its trajectory: {1}")]
    TrajectoryRejected(TrajJoint, String),

    #[error("No trajectory has been loaded")]
    NoTrajectory,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Stage a zero move on every actuator and the base, then push.
///
/// This holds all joints at the position they are currently commanded to.
pub fn halt(hardware: &dyn Hardware) -> Result<(), HardwareError> {
    hardware.translate_by(0.0, MotionLimits::default());
    hardware.rotate_by(0.0, MotionLimits::default());

    for actuator in Actuator::ALL.iter() {
        hardware.move_by(*actuator, 0.0, MotionLimits::default());
    }

    hardware.push_command()
}
