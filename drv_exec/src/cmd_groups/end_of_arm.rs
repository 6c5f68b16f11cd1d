//! # End of arm command groups
//!
//! The wrist yaw is a plain rotary joint. The gripper has a single degree of freedom which can be
//! commanded through either finger angle or through the aperture, all of which are converted to
//! the gripper motor's percent scale.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{
    CommandGroup, ExecUpdate, JointCommand, GRIPPER_ACCEPTABLE_ERROR_PCT,
    WRIST_YAW_ACCEPTABLE_ERROR_RAD,
};
use crate::{
    backlash::BacklashState,
    goal_error::GoalError,
    hardware::Hardware,
    mode_ctrl::ManipulationOrigin,
    params::{DrvExecParams, GripperParams},
};
use comms_if::{
    eqpt::{Actuator, MotionLimits, RobotStatus},
    tc::{Mode, TrajectoryPoint},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const WRIST_YAW_JOINTS: [&str; 1] = ["joint_wrist_yaw"];

const GRIPPER_JOINTS: [&str; 3] = [
    "joint_gripper_finger_left",
    "joint_gripper_finger_right",
    "gripper_aperture",
];

const GRIPPER_APERTURE: &str = "gripper_aperture";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct WristYawGroup {
    cmd: JointCommand,
    range_rad: (f64, f64),
}

/// Gripper group, tracking in the motor's percent scale.
pub struct GripperGroup {
    cmd: JointCommand,
    range_pct: (f64, f64),
    conversion: GripperParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WristYawGroup {
    pub fn new(params: &DrvExecParams) -> Self {
        Self {
            cmd: JointCommand::default(),
            range_rad: params.ranges.wrist_yaw_rad,
        }
    }
}

impl CommandGroup for WristYawGroup {
    fn name(&self) -> &'static str {
        "wrist_yaw"
    }

    fn joint_names(&self) -> &'static [&'static str] {
        &WRIST_YAW_JOINTS
    }

    fn update(&mut self, commanded_names: &[String], _mode: Mode) -> Result<(), GoalError> {
        self.cmd.claim(WRIST_YAW_JOINTS[0], commanded_names);
        Ok(())
    }

    fn num_valid_commands(&self) -> usize {
        self.cmd.num_valid()
    }

    fn set_goal(
        &mut self,
        point: &TrajectoryPoint,
        fail_out_of_range: bool,
        _origin: Option<&ManipulationOrigin>,
    ) -> Result<(), GoalError> {
        self.cmd.set_goal(point, self.range_rad, fail_out_of_range)
    }

    fn init_execution(
        &mut self,
        hardware: &dyn Hardware,
        status: &RobotStatus,
        _backlash: &mut BacklashState,
    ) {
        if let Some(goal) = self.cmd.goal() {
            let error = goal - status.wrist_yaw.pos;
            hardware.move_by(Actuator::WristYaw, error, self.cmd.limits());
            self.cmd.set_error(error);
        }
    }

    fn goal_reached(&self) -> bool {
        self.cmd.reached(WRIST_YAW_ACCEPTABLE_ERROR_RAD)
    }

    fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        _backlash: &BacklashState,
    ) -> ExecUpdate {
        self.cmd
            .track(status.wrist_yaw.pos, WRIST_YAW_ACCEPTABLE_ERROR_RAD, on_success)
    }
}

impl GripperGroup {
    pub fn new(params: &DrvExecParams) -> Self {
        Self {
            cmd: JointCommand::default(),
            range_pct: params.ranges.gripper_pct,
            conversion: params.gripper.clone(),
        }
    }

    /// Joint units per percent of the claimed joint.
    fn units_per_pct(&self) -> f64 {
        match self.cmd.name() {
            Some(GRIPPER_APERTURE) => self.conversion.aperture_m_per_pct,
            _ => self.conversion.finger_rad_per_pct,
        }
    }
}

impl CommandGroup for GripperGroup {
    fn name(&self) -> &'static str {
        "gripper"
    }

    fn joint_names(&self) -> &'static [&'static str] {
        &GRIPPER_JOINTS
    }

    fn update(&mut self, commanded_names: &[String], _mode: Mode) -> Result<(), GoalError> {
        self.cmd.clear();

        let active: Vec<&str> = GRIPPER_JOINTS
            .iter()
            .copied()
            .filter(|j| commanded_names.iter().any(|n| n == j))
            .collect();

        if active.len() > 1 {
            return Err(GoalError::invalid_joints(format!(
                "Received a command for the gripper that includes more than one gripper joint \
                name: {:?}. The gripper only has a single degree of freedom that can be \
                controlled using one of the mutually exclusive joint names {:?}.",
                active, GRIPPER_JOINTS
            )));
        }

        self.cmd.claim_any(&GRIPPER_JOINTS, commanded_names);
        Ok(())
    }

    fn num_valid_commands(&self) -> usize {
        self.cmd.num_valid()
    }

    fn set_goal(
        &mut self,
        point: &TrajectoryPoint,
        fail_out_of_range: bool,
        _origin: Option<&ManipulationOrigin>,
    ) -> Result<(), GoalError> {
        if !self.cmd.is_active() {
            return Ok(());
        }

        // Bound in joint units so the error message speaks the caller's units
        let k = self.units_per_pct();
        let range = (self.range_pct.0 * k, self.range_pct.1 * k);
        self.cmd.set_goal(point, range, fail_out_of_range)?;

        if let Some(goal) = self.cmd.goal() {
            self.cmd.set_goal_value(goal / k);
        }

        Ok(())
    }

    fn init_execution(
        &mut self,
        hardware: &dyn Hardware,
        status: &RobotStatus,
        _backlash: &mut BacklashState,
    ) {
        if let Some(goal_pct) = self.cmd.goal() {
            let k = self.units_per_pct();
            let error_pct = goal_pct - status.gripper.pos_pct;
            let limits = self.cmd.limits();

            hardware.move_by(
                Actuator::Gripper,
                error_pct,
                MotionLimits::new(
                    limits.velocity.map(|v| v / k),
                    limits.acceleration.map(|a| a / k),
                ),
            );
            self.cmd.set_error(error_pct);
        }
    }

    fn goal_reached(&self) -> bool {
        self.cmd.reached(GRIPPER_ACCEPTABLE_ERROR_PCT)
    }

    fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        _backlash: &BacklashState,
    ) -> ExecUpdate {
        let k = self.units_per_pct();

        match self
            .cmd
            .track(status.gripper.pos_pct, GRIPPER_ACCEPTABLE_ERROR_PCT, on_success)
        {
            // Report the error in the units of the commanded joint
            ExecUpdate::Tracking(errs) => {
                ExecUpdate::Tracking(errs.into_iter().map(|(n, e)| (n, e * k)).collect())
            }
            fatal => fatal,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::{SimMotion, SimRobot};
    use comms_if::tm::ResultCode;

    #[test]
    fn test_gripper_joints_are_exclusive() {
        let params = DrvExecParams::default();
        let mut group = GripperGroup::new(&params);

        let err = group
            .update(
                &[
                    "gripper_aperture".to_string(),
                    "joint_gripper_finger_left".to_string(),
                ],
                Mode::Position,
            )
            .unwrap_err();
        assert_eq!(err.code, ResultCode::InvalidJoints);

        group
            .update(&["joint_gripper_finger_right".to_string()], Mode::Position)
            .unwrap();
        assert_eq!(group.num_valid_commands(), 1);
    }

    #[test]
    fn test_gripper_converts_to_percent() {
        let params = DrvExecParams::default();
        let sim = SimRobot::new(SimMotion::Frozen);
        let mut group = GripperGroup::new(&params);
        let mut backlash = BacklashState::default();

        group
            .update(&["gripper_aperture".to_string()], Mode::Position)
            .unwrap();

        // 0.03 m of aperture is 20 percent
        group
            .set_goal(&TrajectoryPoint::new(0.0, vec![0.03]), true, None)
            .unwrap();
        group.init_execution(&sim, &RobotStatus::default(), &mut backlash);
        assert!((sim.staged_move(Actuator::Gripper).unwrap() - 20.0).abs() < 1e-9);

        // Out of the percent range once converted
        assert!(group
            .set_goal(&TrajectoryPoint::new(0.0, vec![0.5]), true, None)
            .is_err());

        // Tracking error is reported in meters
        group
            .set_goal(&TrajectoryPoint::new(0.0, vec![0.03]), true, None)
            .unwrap();
        let mut status = RobotStatus::default();
        status.gripper.pos_pct = 10.0;
        match group.update_execution(&status, &mut |_| (), &backlash) {
            ExecUpdate::Tracking(errs) => assert!((errs[0].1 - 0.015).abs() < 1e-9),
            ExecUpdate::Fatal(m) => panic!("Unexpected fatal update: {}", m),
        }
    }
}
