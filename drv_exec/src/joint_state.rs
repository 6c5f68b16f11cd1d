//! # Driver state
//!
//! State computed by the periodic cycle from a status snapshot: calibrated joint states and the
//! base odometry, adjusted for the current mode.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Internal
use crate::{
    arm_merge::{ARM_SEGMENTS, WRIST_EXTENSION},
    backlash::BacklashState,
    mode_ctrl::ManipulationOrigin,
    params::{CalibrationParams, GripperParams},
};
use comms_if::{eqpt::RobotStatus, tc::Mode};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverState {
    pub stamp: DateTime<Utc>,
    pub mode: Mode,
    pub is_calibrated: bool,
    pub runstopped: bool,
    pub odometry: Odometry,
    pub joints: JointStates,
}

/// Base pose and velocity in the odometry frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Odometry {
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
}

/// Position, velocity and effort of every named joint, aligned by index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointStates {
    pub names: Vec<String>,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub efforts: Vec<f64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DriverState {
    /// Compute the state from a status snapshot.
    ///
    /// In manipulation mode the base's forward motion is reported through the
    /// `joint_mobile_base_translation` joint rather than through the odometry.
    pub fn from_status(
        status: &RobotStatus,
        mode: Mode,
        origin: Option<&ManipulationOrigin>,
        backlash: &BacklashState,
        calib: &CalibrationParams,
        gripper: &GripperParams,
    ) -> Self {
        let base = &status.base;

        let mut odometry = Odometry {
            x: base.x,
            y: base.y,
            theta: base.theta,
            x_vel: base.x_vel,
            theta_vel: base.theta_vel,
        };

        let manipulation_origin = match (mode, origin) {
            (Mode::Manipulation, Some(o)) => Some(o),
            _ => None,
        };
        if let Some(o) = manipulation_origin {
            odometry.x = o.x;
            odometry.x_vel = 0.0;
        }

        let mut joints = JointStates::default();

        let arm_pos = backlash.wrist_extension_pos(status.arm.pos, calib);
        joints.push(WRIST_EXTENSION, arm_pos, status.arm.vel, status.arm.effort);
        joints.push(
            "joint_lift",
            status.lift.pos,
            status.lift.vel,
            status.lift.effort,
        );

        // Proximal segment first
        for segment in ARM_SEGMENTS.iter().rev() {
            joints.push(
                segment,
                arm_pos / 4.0,
                status.arm.vel / 4.0,
                status.arm.effort,
            );
        }

        joints.push(
            "joint_head_pan",
            backlash.head_pan_pos(status.head_pan.pos, calib),
            status.head_pan.vel,
            status.head_pan.effort,
        );
        joints.push(
            "joint_head_tilt",
            backlash.head_tilt_pos(status.head_tilt.pos, calib),
            status.head_tilt.vel,
            status.head_tilt.effort,
        );
        joints.push(
            "joint_wrist_yaw",
            status.wrist_yaw.pos,
            status.wrist_yaw.vel,
            status.wrist_yaw.effort,
        );

        let finger_vel = status.gripper.vel * gripper.finger_rad_per_pct;
        for finger in ["joint_gripper_finger_left", "joint_gripper_finger_right"].iter() {
            joints.push(
                finger,
                status.gripper.pos_rad,
                finger_vel,
                status.gripper.effort,
            );
        }

        match manipulation_origin {
            Some(o) => joints.push(
                "joint_mobile_base_translation",
                base.x - o.x,
                base.x_vel,
                base.effort,
            ),
            None => joints.push("joint_mobile_base_translation", 0.0, 0.0, 0.0),
        }

        Self {
            stamp: Utc::now(),
            mode,
            is_calibrated: status.is_calibrated,
            runstopped: status.runstopped,
            odometry,
            joints,
        }
    }
}

impl JointStates {
    fn push(&mut self, name: &str, position: f64, velocity: f64, effort: f64) {
        self.names.push(name.to_string());
        self.positions.push(position);
        self.velocities.push(velocity);
        self.efforts.push(effort);
    }

    /// Position of the named joint.
    pub fn position(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.positions[i])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_joint_states() {
        let mut status = RobotStatus::default();
        status.arm.pos = 0.4;
        status.head_pan.pos = 0.1;
        status.base.x = 2.0;

        let calib = CalibrationParams {
            head_pan_offset_rad: 0.05,
            wrist_extension_retracted_offset_m: 0.02,
            ..Default::default()
        };
        let backlash = BacklashState {
            wrist_extension_retracted: true,
            ..Default::default()
        };

        let state = DriverState::from_status(
            &status,
            Mode::Position,
            None,
            &backlash,
            &calib,
            &GripperParams::default(),
        );

        let j = &state.joints;
        assert_eq!(j.names.len(), 12);
        assert!((j.position("wrist_extension").unwrap() - 0.42).abs() < 1e-12);
        assert!((j.position("joint_arm_l3").unwrap() - 0.105).abs() < 1e-12);
        assert!((j.position("joint_head_pan").unwrap() - 0.15).abs() < 1e-12);
        assert_eq!(j.position("joint_mobile_base_translation"), Some(0.0));
        assert_eq!(state.odometry.x, 2.0);
    }

    #[test]
    fn test_manipulation_translation() {
        let mut status = RobotStatus::default();
        status.base.x = 2.0;
        status.base.x_vel = 0.1;
        let origin = ManipulationOrigin {
            x: 1.5,
            y: 0.0,
            theta: 0.0,
        };

        let state = DriverState::from_status(
            &status,
            Mode::Manipulation,
            Some(&origin),
            &BacklashState::default(),
            &CalibrationParams::default(),
            &GripperParams::default(),
        );

        assert!(
            (state.joints.position("joint_mobile_base_translation").unwrap() - 0.5).abs() < 1e-12
        );
        assert_eq!(state.odometry.x, 1.5);
        assert_eq!(state.odometry.x_vel, 0.0);
    }
}
