//! # Driver Executable Parameters
//!
//! This module provides the parameters of the driver, loaded from `drv_exec.toml`. Every field has
//! a default so a parameter file only needs to list the values it changes.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::tc::Mode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrvExecParams {
    /// Frequency of the periodic cycle (state computation and base velocity commanding).
    ///
    /// Units: hertz
    pub cycle_frequency_hz: f64,

    /// Base velocity commands older than this are replaced by a zero velocity.
    ///
    /// Units: seconds
    pub cmd_vel_timeout_s: f64,

    /// Mode entered when the driver starts.
    pub initial_mode: Mode,

    pub goal: GoalParams,

    pub ranges: JointRanges,

    pub calibration: CalibrationParams,

    pub gripper: GripperParams,
}

/// Parameters shared by both goal execution paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalParams {
    /// Maximum time allowed to reach a single point.
    ///
    /// Units: seconds
    pub goal_timeout_s: f64,

    /// Rate at which the point-by-point executor polls the hardware.
    ///
    /// Units: hertz
    pub poll_rate_hz: f64,

    /// Rate at which feedback is produced during interpolated playback.
    ///
    /// Units: hertz
    pub trajectory_rate_hz: f64,

    /// If true goals outside a joint's range are rejected, otherwise they are clamped.
    pub fail_out_of_range_goal: bool,

    pub ignore_trajectory_velocities: bool,

    pub ignore_trajectory_accelerations: bool,
}

/// Commandable range of each joint, as `(min, max)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JointRanges {
    /// Units: radians
    pub head_pan_rad: (f64, f64),

    /// Units: radians
    pub head_tilt_rad: (f64, f64),

    /// Units: radians
    pub wrist_yaw_rad: (f64, f64),

    /// Units: percent
    pub gripper_pct: (f64, f64),

    /// Units: meters
    pub arm_m: (f64, f64),

    /// Units: meters
    pub lift_m: (f64, f64),

    /// Range of the virtual base translation joint about the manipulation origin, also used to
    /// bound incremental translations.
    ///
    /// Units: meters
    pub base_translation_m: (f64, f64),

    /// Units: radians
    pub base_rotation_rad: (f64, f64),
}

/// Calibration offsets and backlash detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Units: radians
    pub head_pan_offset_rad: f64,

    /// Extra offset applied while the head has last been panned to the left.
    ///
    /// Units: radians
    pub head_pan_looked_left_offset_rad: f64,

    /// Units: radians
    pub head_tilt_offset_rad: f64,

    /// Extra offset applied while the head is looking up.
    ///
    /// Units: radians
    pub head_tilt_looking_up_offset_rad: f64,

    /// Tilt angle above which the head is considered to be looking up.
    ///
    /// Units: radians
    pub head_tilt_backlash_transition_angle_rad: f64,

    /// Half width of the dead band about the tilt transition angle.
    ///
    /// Units: radians
    pub head_tilt_backlash_band_rad: f64,

    /// Extra extension applied while the arm has last been retracted.
    ///
    /// Units: meters
    pub wrist_extension_retracted_offset_m: f64,

    /// Head pan speed above which the direction of motion updates the backlash state.
    ///
    /// Units: radians/second
    pub head_pan_backlash_vel_threshold_rads: f64,

    /// Arm speed above which the direction of motion updates the backlash state.
    ///
    /// Units: meters/second
    pub arm_backlash_vel_threshold_mps: f64,
}

/// Linear conversion between the gripper joints and the gripper motor's percent scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperParams {
    /// Units: radians/percent
    pub finger_rad_per_pct: f64,

    /// Units: meters/percent
    pub aperture_m_per_pct: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParamsError {
    #[error("Expected {0} to be a positive rate, found {1} Hz")]
    InvalidRate(&'static str, f64),

    #[error("Expected {0} to be a finite, non-negative duration, found {1} s")]
    InvalidDuration(&'static str, f64),
}

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Calibration angles larger than this are reported as unusual.
///
/// Units: radians
const LARGE_OFFSET_RAD: f64 = std::f64::consts::FRAC_PI_4;

/// Units: meters
const LARGE_OFFSET_M: f64 = 0.05;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DrvExecParams {
    fn default() -> Self {
        Self {
            cycle_frequency_hz: 15.0,
            cmd_vel_timeout_s: 1.0,
            initial_mode: Mode::Position,
            goal: GoalParams::default(),
            ranges: JointRanges::default(),
            calibration: CalibrationParams::default(),
            gripper: GripperParams::default(),
        }
    }
}

impl Default for GoalParams {
    fn default() -> Self {
        Self {
            goal_timeout_s: 10.0,
            poll_rate_hz: 15.0,
            trajectory_rate_hz: 15.0,
            fail_out_of_range_goal: true,
            ignore_trajectory_velocities: false,
            ignore_trajectory_accelerations: false,
        }
    }
}

impl DrvExecParams {
    /// Check every rate and duration that is later turned into a period or a timeout.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let rates = [
            ("cycle_frequency_hz", self.cycle_frequency_hz),
            ("goal.poll_rate_hz", self.goal.poll_rate_hz),
            ("goal.trajectory_rate_hz", self.goal.trajectory_rate_hz),
        ];
        for &(name, rate) in rates.iter() {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ParamsError::InvalidRate(name, rate));
            }
        }

        let durations = [
            ("cmd_vel_timeout_s", self.cmd_vel_timeout_s),
            ("goal.goal_timeout_s", self.goal.goal_timeout_s),
        ];
        for &(name, duration) in durations.iter() {
            if !duration.is_finite() || duration < 0.0 {
                return Err(ParamsError::InvalidDuration(name, duration));
            }
        }

        Ok(())
    }
}

impl GoalParams {
    /// Period of the executor's poll loop.
    ///
    /// Units: seconds
    pub fn poll_period_s(&self) -> f64 {
        1.0 / self.poll_rate_hz
    }

    /// Period of the interpolator's feedback loop.
    ///
    /// Units: seconds
    pub fn trajectory_period_s(&self) -> f64 {
        1.0 / self.trajectory_rate_hz
    }
}

impl Default for JointRanges {
    fn default() -> Self {
        Self {
            head_pan_rad: (-4.04, 1.73),
            head_tilt_rad: (-1.53, 0.79),
            wrist_yaw_rad: (-1.75, 4.0),
            gripper_pct: (-100.0, 100.0),
            arm_m: (0.0, 0.52),
            lift_m: (0.0, 1.1),
            base_translation_m: (-0.5, 0.5),
            base_rotation_rad: (-std::f64::consts::PI, std::f64::consts::PI),
        }
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            head_pan_offset_rad: 0.0,
            head_pan_looked_left_offset_rad: 0.0,
            head_tilt_offset_rad: 0.0,
            head_tilt_looking_up_offset_rad: 0.0,
            head_tilt_backlash_transition_angle_rad: -0.4,
            head_tilt_backlash_band_rad: 0.05,
            wrist_extension_retracted_offset_m: 0.0,
            head_pan_backlash_vel_threshold_rads: 0.05,
            arm_backlash_vel_threshold_mps: 0.005,
        }
    }
}

impl CalibrationParams {
    /// Describe every offset whose magnitude is unusually large for a calibrated robot.
    pub fn unusual_offsets(&self) -> Vec<String> {
        let angles = [
            ("head_pan_offset_rad", self.head_pan_offset_rad),
            (
                "head_pan_looked_left_offset_rad",
                self.head_pan_looked_left_offset_rad,
            ),
            ("head_tilt_offset_rad", self.head_tilt_offset_rad),
            (
                "head_tilt_looking_up_offset_rad",
                self.head_tilt_looking_up_offset_rad,
            ),
        ];

        let mut unusual: Vec<String> = angles
            .iter()
            .filter(|(_, a)| a.abs() > LARGE_OFFSET_RAD)
            .map(|(n, a)| format!("{} = {:.02} deg", n, a.to_degrees()))
            .collect();

        if self.wrist_extension_retracted_offset_m.abs() > LARGE_OFFSET_M {
            unusual.push(format!(
                "wrist_extension_retracted_offset_m = {:.03} m",
                self.wrist_extension_retracted_offset_m
            ));
        }

        unusual
    }
}

impl Default for GripperParams {
    fn default() -> Self {
        Self {
            finger_rad_per_pct: 0.003,
            aperture_m_per_pct: 0.0015,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_params_file() {
        let params: DrvExecParams = util::params::from_str(
            r#"
            initial_mode = "navigation"

            [goal]
            goal_timeout_s = 2.5

            [ranges]
            lift_m = [0.1, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(params.initial_mode, Mode::Navigation);
        assert_eq!(params.goal.goal_timeout_s, 2.5);
        assert_eq!(params.goal.poll_rate_hz, 15.0);
        assert_eq!(params.ranges.lift_m, (0.1, 1.0));
        assert_eq!(params.ranges.base_translation_m, (-0.5, 0.5));
        assert_eq!(params.cmd_vel_timeout_s, 1.0);
    }

    #[test]
    fn test_validate() {
        assert_eq!(DrvExecParams::default().validate(), Ok(()));

        let mut params = DrvExecParams::default();
        params.goal.poll_rate_hz = 0.0;
        assert_eq!(
            params.validate(),
            Err(ParamsError::InvalidRate("goal.poll_rate_hz", 0.0))
        );

        let mut params = DrvExecParams::default();
        params.goal.goal_timeout_s = -1.0;
        assert_eq!(
            params.validate(),
            Err(ParamsError::InvalidDuration("goal.goal_timeout_s", -1.0))
        );

        let mut params = DrvExecParams::default();
        params.goal.trajectory_rate_hz = std::f64::NAN;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::InvalidRate("goal.trajectory_rate_hz", _))
        ));
    }

    #[test]
    fn test_unusual_offsets() {
        let mut calib = CalibrationParams::default();
        assert!(calib.unusual_offsets().is_empty());

        calib.head_tilt_offset_rad = 1.0;
        calib.wrist_extension_retracted_offset_m = -0.1;
        let unusual = calib.unusual_offsets();
        assert_eq!(unusual.len(), 2);
        assert!(unusual[0].starts_with("head_tilt_offset_rad"));
    }
}
