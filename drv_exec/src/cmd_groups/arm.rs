//! # Arm and lift command groups

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{
    CommandGroup, ExecUpdate, JointCommand, ARM_ACCEPTABLE_ERROR_M, LIFT_ACCEPTABLE_ERROR_M,
};
use crate::{
    arm_merge::{ARM_SEGMENTS, WRIST_EXTENSION},
    backlash::BacklashState,
    goal_error::GoalError,
    hardware::Hardware,
    mode_ctrl::ManipulationOrigin,
    params::{CalibrationParams, DrvExecParams},
};
use comms_if::{
    eqpt::{Actuator, RobotStatus},
    tc::{Mode, TrajectoryPoint},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const TELESCOPING_JOINTS: [&str; 5] = [
    WRIST_EXTENSION,
    ARM_SEGMENTS[0],
    ARM_SEGMENTS[1],
    ARM_SEGMENTS[2],
    ARM_SEGMENTS[3],
];

const LIFT_JOINTS: [&str; 1] = ["joint_lift"];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The telescoping arm, commanded through `wrist_extension`.
///
/// The segment joints are owned here as well so that no other group can claim them, but goals
/// must have been merged before they reach this group.
pub struct TelescopingGroup {
    cmd: JointCommand,
    range_m: (f64, f64),
    calib: CalibrationParams,
}

pub struct LiftGroup {
    cmd: JointCommand,
    range_m: (f64, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TelescopingGroup {
    pub fn new(params: &DrvExecParams) -> Self {
        Self {
            cmd: JointCommand::default(),
            range_m: params.ranges.arm_m,
            calib: params.calibration.clone(),
        }
    }
}

impl CommandGroup for TelescopingGroup {
    fn name(&self) -> &'static str {
        "telescoping"
    }

    fn joint_names(&self) -> &'static [&'static str] {
        &TELESCOPING_JOINTS
    }

    fn update(&mut self, commanded_names: &[String], _mode: Mode) -> Result<(), GoalError> {
        self.cmd.clear();

        let segments: Vec<&str> = ARM_SEGMENTS
            .iter()
            .copied()
            .filter(|s| commanded_names.iter().any(|n| n == s))
            .collect();

        if !segments.is_empty() {
            let msg = if commanded_names.iter().any(|n| n == WRIST_EXTENSION) {
                format!(
                    "Received a command for the arm that includes both {} and the segment joints \
                    {:?}, which are mutually exclusive",
                    WRIST_EXTENSION, segments
                )
            } else {
                format!(
                    "The arm segment joints {:?} must be merged into {} before execution",
                    segments, WRIST_EXTENSION
                )
            };
            return Err(GoalError::invalid_joints(msg));
        }

        self.cmd.claim(WRIST_EXTENSION, commanded_names);
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
        self.cmd.set_goal(point, self.range_m, fail_out_of_range)
    }

    fn init_execution(
        &mut self,
        hardware: &dyn Hardware,
        status: &RobotStatus,
        backlash: &mut BacklashState,
    ) {
        if let Some(goal) = self.cmd.goal() {
            let current = backlash.wrist_extension_pos(status.arm.pos, &self.calib);
            let error = goal - current;

            hardware.move_by(Actuator::Arm, error, self.cmd.limits());
            self.cmd.set_error(error);

            backlash.wrist_extension_retracted = error < 0.0;
        }
    }

    fn goal_reached(&self) -> bool {
        self.cmd.reached(ARM_ACCEPTABLE_ERROR_M)
    }

    fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        backlash: &BacklashState,
    ) -> ExecUpdate {
        if self.cmd.is_active() && !status.is_calibrated {
            return ExecUpdate::Fatal(String::from(
                "The telescoping arm is not calibrated, home the robot before commanding it",
            ));
        }

        let current = backlash.wrist_extension_pos(status.arm.pos, &self.calib);
        self.cmd.track(current, ARM_ACCEPTABLE_ERROR_M, on_success)
    }
}

impl LiftGroup {
    pub fn new(params: &DrvExecParams) -> Self {
        Self {
            cmd: JointCommand::default(),
            range_m: params.ranges.lift_m,
        }
    }
}

impl CommandGroup for LiftGroup {
    fn name(&self) -> &'static str {
        "lift"
    }

    fn joint_names(&self) -> &'static [&'static str] {
        &LIFT_JOINTS
    }

    fn update(&mut self, commanded_names: &[String], _mode: Mode) -> Result<(), GoalError> {
        self.cmd.claim(LIFT_JOINTS[0], commanded_names);
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
        self.cmd.set_goal(point, self.range_m, fail_out_of_range)
    }

    fn init_execution(
        &mut self,
        hardware: &dyn Hardware,
        status: &RobotStatus,
        _backlash: &mut BacklashState,
    ) {
        if let Some(goal) = self.cmd.goal() {
            let error = goal - status.lift.pos;
            hardware.move_by(Actuator::Lift, error, self.cmd.limits());
            self.cmd.set_error(error);
        }
    }

    fn goal_reached(&self) -> bool {
        self.cmd.reached(LIFT_ACCEPTABLE_ERROR_M)
    }

    fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        _backlash: &BacklashState,
    ) -> ExecUpdate {
        if self.cmd.is_active() && !status.is_calibrated {
            return ExecUpdate::Fatal(String::from(
                "The lift is not calibrated, home the robot before commanding it",
            ));
        }

        self.cmd
            .track(status.lift.pos, LIFT_ACCEPTABLE_ERROR_M, on_success)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::{SimMotion, SimRobot};
    use comms_if::tm::ResultCode;

    #[test]
    fn test_segments_rejected() {
        let params = DrvExecParams::default();
        let mut group = TelescopingGroup::new(&params);

        let err = group
            .update(
                &["joint_arm_l0".to_string(), "joint_lift".to_string()],
                Mode::Position,
            )
            .unwrap_err();
        assert_eq!(err.code, ResultCode::InvalidJoints);
        assert_eq!(group.num_valid_commands(), 0);
    }

    #[test]
    fn test_retracting_sets_backlash() {
        let mut params = DrvExecParams::default();
        params.calibration.wrist_extension_retracted_offset_m = 0.01;

        let sim = SimRobot::new(SimMotion::Frozen);
        let mut group = TelescopingGroup::new(&params);
        let mut backlash = BacklashState::default();
        let mut status = RobotStatus::default();
        status.arm.pos = 0.3;
        status.is_calibrated = true;

        group
            .update(&["wrist_extension".to_string()], Mode::Position)
            .unwrap();
        group
            .set_goal(&TrajectoryPoint::new(0.0, vec![0.1]), true, None)
            .unwrap();
        group.init_execution(&sim, &status, &mut backlash);

        assert!(backlash.wrist_extension_retracted);
        assert!((sim.staged_move(Actuator::Arm).unwrap() + 0.2).abs() < 1e-12);

        // Offset applied to the measurement once retracted
        match group.update_execution(&status, &mut |_| (), &backlash) {
            ExecUpdate::Tracking(errs) => assert!((errs[0].1 + 0.21).abs() < 1e-12),
            ExecUpdate::Fatal(m) => panic!("Unexpected fatal update: {}", m),
        }
    }

    #[test]
    fn test_uncalibrated_lift_is_fatal() {
        let params = DrvExecParams::default();
        let mut group = LiftGroup::new(&params);
        group
            .update(&["joint_lift".to_string()], Mode::Position)
            .unwrap();
        group
            .set_goal(&TrajectoryPoint::new(0.0, vec![0.5]), true, None)
            .unwrap();

        let status = RobotStatus::default();
        assert!(matches!(
            group.update_execution(&status, &mut |_| (), &BacklashState::default()),
            ExecUpdate::Fatal(_)
        ));
    }
}
