//! # Backlash state
//!
//! The head pan, head tilt and telescoping arm have enough mechanical slack that the measured
//! position depends on the direction the joint last moved in. The driver keeps one boolean per
//! axis recording that direction and adds the matching calibration offset to the measurement.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

use crate::params::CalibrationParams;
use comms_if::eqpt::RobotStatus;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BacklashState {
    pub head_pan_looked_left: bool,
    pub head_tilt_looking_up: bool,
    pub wrist_extension_retracted: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl BacklashState {
    /// Update the flags from a fresh status.
    ///
    /// Pan and arm flags follow the direction of motion once the speed leaves the dead band, the
    /// tilt flag follows the tilt angle once it leaves the band about the transition angle. Inside
    /// the dead bands the flags are left unchanged.
    pub fn update_from_status(&mut self, status: &RobotStatus, params: &CalibrationParams) {
        let pan_vel = status.head_pan.vel;
        if pan_vel > params.head_pan_backlash_vel_threshold_rads {
            self.head_pan_looked_left = true;
        } else if pan_vel < -params.head_pan_backlash_vel_threshold_rads {
            self.head_pan_looked_left = false;
        }

        let tilt = status.head_tilt.pos + params.head_tilt_offset_rad;
        let transition = params.head_tilt_backlash_transition_angle_rad;
        if tilt > transition + params.head_tilt_backlash_band_rad {
            self.head_tilt_looking_up = true;
        } else if tilt < transition - params.head_tilt_backlash_band_rad {
            self.head_tilt_looking_up = false;
        }

        let arm_vel = status.arm.vel;
        if arm_vel < -params.arm_backlash_vel_threshold_mps {
            self.wrist_extension_retracted = true;
        } else if arm_vel > params.arm_backlash_vel_threshold_mps {
            self.wrist_extension_retracted = false;
        }
    }

    /// Calibrated head pan position.
    ///
    /// Units: radians
    pub fn head_pan_pos(&self, raw_pos: f64, params: &CalibrationParams) -> f64 {
        let mut pos = raw_pos + params.head_pan_offset_rad;
        if self.head_pan_looked_left {
            pos += params.head_pan_looked_left_offset_rad;
        }
        pos
    }

    /// Calibrated head tilt position.
    ///
    /// Units: radians
    pub fn head_tilt_pos(&self, raw_pos: f64, params: &CalibrationParams) -> f64 {
        let mut pos = raw_pos + params.head_tilt_offset_rad;
        if self.head_tilt_looking_up {
            pos += params.head_tilt_looking_up_offset_rad;
        }
        pos
    }

    /// Calibrated arm extension.
    ///
    /// Units: meters
    pub fn wrist_extension_pos(&self, raw_pos: f64, params: &CalibrationParams) -> f64 {
        if self.wrist_extension_retracted {
            raw_pos + params.wrist_extension_retracted_offset_m
        } else {
            raw_pos
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn params() -> CalibrationParams {
        CalibrationParams {
            head_pan_looked_left_offset_rad: 0.02,
            head_tilt_looking_up_offset_rad: 0.03,
            wrist_extension_retracted_offset_m: 0.004,
            ..Default::default()
        }
    }

    #[test]
    fn test_hysteresis() {
        let params = params();
        let mut state = BacklashState::default();
        let mut status = RobotStatus::default();

        // Panning left and retracting sets the flags
        status.head_pan.vel = 0.5;
        status.arm.vel = -0.1;
        status.head_tilt.pos = 0.0;
        state.update_from_status(&status, &params);
        assert!(state.head_pan_looked_left);
        assert!(state.wrist_extension_retracted);
        assert!(state.head_tilt_looking_up);

        // Inside the dead bands nothing changes
        status.head_pan.vel = 0.01;
        status.arm.vel = 0.001;
        status.head_tilt.pos = -0.42;
        state.update_from_status(&status, &params);
        assert!(state.head_pan_looked_left);
        assert!(state.wrist_extension_retracted);
        assert!(state.head_tilt_looking_up);

        // Leaving the bands the other way clears them
        status.head_pan.vel = -0.5;
        status.arm.vel = 0.1;
        status.head_tilt.pos = -1.0;
        state.update_from_status(&status, &params);
        assert_eq!(state, BacklashState::default());
    }

    #[test]
    fn test_offsets_follow_flags() {
        let params = params();
        let mut state = BacklashState::default();

        assert_eq!(state.head_pan_pos(0.1, &params), 0.1);
        assert_eq!(state.wrist_extension_pos(0.2, &params), 0.2);

        state.head_pan_looked_left = true;
        state.head_tilt_looking_up = true;
        state.wrist_extension_retracted = true;
        assert!((state.head_pan_pos(0.1, &params) - 0.12).abs() < 1e-12);
        assert!((state.head_tilt_pos(-0.2, &params) + 0.17).abs() < 1e-12);
        assert!((state.wrist_extension_pos(0.2, &params) - 0.204).abs() < 1e-12);
    }
}
