//! # Robot status and actuator definitions

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Snapshot of the state of every actuator on the robot.
///
/// The snapshot is taken atomically by the hardware, so all values in one instance were measured
/// at the same time.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RobotStatus {
    pub head_pan: ActuatorStatus,
    pub head_tilt: ActuatorStatus,
    pub wrist_yaw: ActuatorStatus,
    pub gripper: GripperStatus,

    /// Telescoping arm extension, measured as a single prismatic axis.
    pub arm: ActuatorStatus,

    pub lift: ActuatorStatus,

    pub base: BaseStatus,

    /// True once the robot has been homed.
    pub is_calibrated: bool,

    /// True while the runstop is engaged.
    pub runstopped: bool,
}

/// Measured state of a single actuator.
///
/// Units: radians (rotary) or meters (prismatic).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct ActuatorStatus {
    pub pos: f64,
    pub vel: f64,
    pub effort: f64,
}

/// Measured state of the gripper.
///
/// The gripper is driven in the motor's percent scale, where 0 is closed and positive values
/// open the fingers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct GripperStatus {
    /// Finger angle.
    ///
    /// Units: radians
    pub pos_rad: f64,

    /// Motor position.
    ///
    /// Units: percent
    pub pos_pct: f64,

    pub vel: f64,
    pub effort: f64,
}

/// Odometry of the mobile base.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseStatus {
    /// Units: meters
    pub x: f64,
    /// Units: meters
    pub y: f64,
    /// Units: radians
    pub theta: f64,
    /// Units: meters/second
    pub x_vel: f64,
    /// Units: radians/second
    pub theta_vel: f64,
    pub effort: f64,
}

/// Optional limits forwarded with a relative move.
///
/// `None` means the actuator's configured default is used.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionLimits {
    pub velocity: Option<f64>,
    pub acceleration: Option<f64>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// IDs of the position controlled actuators on the robot.
///
/// The mobile base is not included as it is commanded with its own translate/rotate primitives.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum Actuator {
    HeadPan,
    HeadTilt,
    WristYaw,
    Gripper,
    Arm,
    Lift,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl Actuator {
    /// All actuators, in the order the stop handler zeroes them.
    pub const ALL: [Actuator; 6] = [
        Actuator::Arm,
        Actuator::Lift,
        Actuator::HeadPan,
        Actuator::HeadTilt,
        Actuator::WristYaw,
        Actuator::Gripper,
    ];
}

impl RobotStatus {
    /// Get the status of the given actuator.
    ///
    /// For the gripper the position is given in the motor's percent scale.
    pub fn actuator(&self, actuator: Actuator) -> ActuatorStatus {
        match actuator {
            Actuator::HeadPan => self.head_pan,
            Actuator::HeadTilt => self.head_tilt,
            Actuator::WristYaw => self.wrist_yaw,
            Actuator::Gripper => ActuatorStatus {
                pos: self.gripper.pos_pct,
                vel: self.gripper.vel,
                effort: self.gripper.effort,
            },
            Actuator::Arm => self.arm,
            Actuator::Lift => self.lift,
        }
    }
}

impl MotionLimits {
    pub fn new(velocity: Option<f64>, acceleration: Option<f64>) -> Self {
        Self {
            velocity,
            acceleration,
        }
    }
}
