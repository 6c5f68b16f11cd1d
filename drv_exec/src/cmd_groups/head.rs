//! # Head command groups
//!
//! Pan and tilt are both corrected for backlash: the pan offset depends on whether the head last
//! moved to the left, the tilt offset on whether the head is looking up.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{
    CommandGroup, ExecUpdate, JointCommand, HEAD_PAN_ACCEPTABLE_ERROR_RAD,
    HEAD_TILT_ACCEPTABLE_ERROR_RAD,
};
use crate::{
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

const HEAD_PAN_JOINTS: [&str; 1] = ["joint_head_pan"];
const HEAD_TILT_JOINTS: [&str; 1] = ["joint_head_tilt"];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct HeadPanGroup {
    cmd: JointCommand,
    range_rad: (f64, f64),
    calib: CalibrationParams,
}

pub struct HeadTiltGroup {
    cmd: JointCommand,
    range_rad: (f64, f64),
    calib: CalibrationParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HeadPanGroup {
    pub fn new(params: &DrvExecParams) -> Self {
        Self {
            cmd: JointCommand::default(),
            range_rad: params.ranges.head_pan_rad,
            calib: params.calibration.clone(),
        }
    }
}

impl CommandGroup for HeadPanGroup {
    fn name(&self) -> &'static str {
        "head_pan"
    }

    fn joint_names(&self) -> &'static [&'static str] {
        &HEAD_PAN_JOINTS
    }

    fn update(&mut self, commanded_names: &[String], _mode: Mode) -> Result<(), GoalError> {
        self.cmd.claim(HEAD_PAN_JOINTS[0], commanded_names);
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
        backlash: &mut BacklashState,
    ) {
        if let Some(goal) = self.cmd.goal() {
            let current = backlash.head_pan_pos(status.head_pan.pos, &self.calib);
            let error = goal - current;

            hardware.move_by(Actuator::HeadPan, error, self.cmd.limits());
            self.cmd.set_error(error);

            backlash.head_pan_looked_left = error > 0.0;
        }
    }

    fn goal_reached(&self) -> bool {
        self.cmd.reached(HEAD_PAN_ACCEPTABLE_ERROR_RAD)
    }

    fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        backlash: &BacklashState,
    ) -> ExecUpdate {
        let current = backlash.head_pan_pos(status.head_pan.pos, &self.calib);
        self.cmd
            .track(current, HEAD_PAN_ACCEPTABLE_ERROR_RAD, on_success)
    }
}

impl HeadTiltGroup {
    pub fn new(params: &DrvExecParams) -> Self {
        Self {
            cmd: JointCommand::default(),
            range_rad: params.ranges.head_tilt_rad,
            calib: params.calibration.clone(),
        }
    }
}

impl CommandGroup for HeadTiltGroup {
    fn name(&self) -> &'static str {
        "head_tilt"
    }

    fn joint_names(&self) -> &'static [&'static str] {
        &HEAD_TILT_JOINTS
    }

    fn update(&mut self, commanded_names: &[String], _mode: Mode) -> Result<(), GoalError> {
        self.cmd.claim(HEAD_TILT_JOINTS[0], commanded_names);
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
        backlash: &mut BacklashState,
    ) {
        if let Some(goal) = self.cmd.goal() {
            let current = backlash.head_tilt_pos(status.head_tilt.pos, &self.calib);
            let error = goal - current;

            hardware.move_by(Actuator::HeadTilt, error, self.cmd.limits());
            self.cmd.set_error(error);

            backlash.head_tilt_looking_up =
                goal > self.calib.head_tilt_backlash_transition_angle_rad;
        }
    }

    fn goal_reached(&self) -> bool {
        self.cmd.reached(HEAD_TILT_ACCEPTABLE_ERROR_RAD)
    }

    fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        backlash: &BacklashState,
    ) -> ExecUpdate {
        let current = backlash.head_tilt_pos(status.head_tilt.pos, &self.calib);
        self.cmd
            .track(current, HEAD_TILT_ACCEPTABLE_ERROR_RAD, on_success)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::{SimMotion, SimRobot};

    fn params() -> DrvExecParams {
        let mut params = DrvExecParams::default();
        params.calibration.head_pan_offset_rad = 0.01;
        params.calibration.head_pan_looked_left_offset_rad = 0.05;
        params
    }

    #[test]
    fn test_pan_stages_error_and_direction() {
        let params = params();
        let sim = SimRobot::new(SimMotion::Frozen);
        let mut group = HeadPanGroup::new(&params);
        let mut backlash = BacklashState::default();

        group
            .update(&["joint_head_pan".to_string()], Mode::Position)
            .unwrap();
        group
            .set_goal(&TrajectoryPoint::new(0.0, vec![0.51]), true, None)
            .unwrap();

        let status = RobotStatus::default();
        group.init_execution(&sim, &status, &mut backlash);

        assert!(backlash.head_pan_looked_left);
        let staged = sim.staged_move(Actuator::HeadPan).unwrap();
        assert!((staged - 0.5).abs() < 1e-12);

        // Once looked left the extra offset is part of the measurement
        let update = group.update_execution(&status, &mut |_| (), &backlash);
        match update {
            ExecUpdate::Tracking(errs) => {
                assert_eq!(errs[0].0, "joint_head_pan");
                assert!((errs[0].1 - 0.45).abs() < 1e-12);
            }
            ExecUpdate::Fatal(m) => panic!("Unexpected fatal update: {}", m),
        }
    }

    #[test]
    fn test_tilt_looking_up_from_goal() {
        let params = DrvExecParams::default();
        let sim = SimRobot::new(SimMotion::Frozen);
        let mut group = HeadTiltGroup::new(&params);
        let mut backlash = BacklashState::default();
        let status = RobotStatus::default();

        group
            .update(&["joint_head_tilt".to_string()], Mode::Position)
            .unwrap();

        group
            .set_goal(&TrajectoryPoint::new(0.0, vec![-0.2]), true, None)
            .unwrap();
        group.init_execution(&sim, &status, &mut backlash);
        assert!(backlash.head_tilt_looking_up);

        group
            .set_goal(&TrajectoryPoint::new(0.0, vec![-0.8]), true, None)
            .unwrap();
        group.init_execution(&sim, &status, &mut backlash);
        assert!(!backlash.head_tilt_looking_up);

        assert!(!group.goal_reached());
    }
}
