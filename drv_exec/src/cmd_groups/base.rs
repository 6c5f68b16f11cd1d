//! # Mobile base command group
//!
//! How the base is commanded depends on the mode:
//!
//! - In manipulation mode the base is a virtual prismatic joint, `joint_mobile_base_translation`,
//!   whose position is the distance travelled from the manipulation origin along the origin's
//!   heading.
//! - In the other modes `translate_mobile_base` and `rotate_mobile_base` command incremental moves
//!   from wherever the base is when the point starts. Only one of them may be used in a goal.
//!
//! The base is considered to have reached its target when the error is excellent, or when it is
//! acceptable and the base has stopped moving.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::{CommandGroup, ExecUpdate, JointCommand};
use crate::{
    backlash::BacklashState, goal_error::GoalError, hardware::Hardware,
    mode_ctrl::ManipulationOrigin, params::DrvExecParams,
};
use comms_if::{
    eqpt::{BaseStatus, RobotStatus},
    tc::{Mode, TrajectoryPoint},
};
use util::maths::get_ang_dist;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

pub const BASE_TRANSLATION_JOINT: &str = "joint_mobile_base_translation";
pub const TRANSLATE_JOINT: &str = "translate_mobile_base";
pub const ROTATE_JOINT: &str = "rotate_mobile_base";

const BASE_JOINTS: [&str; 3] = [BASE_TRANSLATION_JOINT, TRANSLATE_JOINT, ROTATE_JOINT];

/// Units: meters
const ACCEPTABLE_ERROR_M: f64 = 0.005;

/// Units: meters
const EXCELLENT_ERROR_M: f64 = 0.005;

/// Units: radians
const ACCEPTABLE_ERROR_RAD: f64 = 6.0 * std::f64::consts::PI / 180.0;

/// Units: radians
const EXCELLENT_ERROR_RAD: f64 = 0.6 * std::f64::consts::PI / 180.0;

/// Below this speed the base is considered stalled.
///
/// Units: meters/second
const MIN_SPEED_MPS: f64 = 0.002;

/// Below this rate the base is considered stalled.
///
/// Units: radians/second
const MIN_RATE_RADPS: f64 = 1.0 * std::f64::consts::PI / 180.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MobileBaseGroup {
    cmd: JointCommand,

    translation_range_m: (f64, f64),
    rotation_range_rad: (f64, f64),

    /// Origin of the virtual translation joint.
    origin: Option<ManipulationOrigin>,

    /// Base pose when the current point started.
    start: BaseStatus,

    reached: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseJoint {
    Translation,
    Translate,
    Rotate,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MobileBaseGroup {
    pub fn new(params: &DrvExecParams) -> Self {
        Self {
            cmd: JointCommand::default(),
            translation_range_m: params.ranges.base_translation_m,
            rotation_range_rad: params.ranges.base_rotation_rad,
            origin: None,
            start: BaseStatus::default(),
            reached: false,
        }
    }

    fn joint(&self) -> Option<BaseJoint> {
        match self.cmd.name() {
            Some(BASE_TRANSLATION_JOINT) => Some(BaseJoint::Translation),
            Some(TRANSLATE_JOINT) => Some(BaseJoint::Translate),
            Some(ROTATE_JOINT) => Some(BaseJoint::Rotate),
            _ => None,
        }
    }

    /// Error of the claimed joint and whether its target is reached.
    fn error(&self, goal: f64, base: &BaseStatus) -> (f64, bool) {
        match self.joint() {
            Some(BaseJoint::Rotate) => {
                let turned = get_ang_dist(self.start.theta, base.theta);
                let error = goal - turned;
                let stalled = base.theta_vel.abs() < MIN_RATE_RADPS;
                (
                    error,
                    is_reached(error, ACCEPTABLE_ERROR_RAD, EXCELLENT_ERROR_RAD, stalled),
                )
            }
            Some(BaseJoint::Translation) => {
                let travelled = self
                    .origin
                    .map(|o| o.translation_of(base))
                    .unwrap_or(std::f64::NAN);
                let error = goal - travelled;
                let stalled = base.x_vel.abs() < MIN_SPEED_MPS;
                (
                    error,
                    is_reached(error, ACCEPTABLE_ERROR_M, EXCELLENT_ERROR_M, stalled),
                )
            }
            _ => {
                let travelled = ManipulationOrigin::from_base(&self.start).translation_of(base);
                let error = goal - travelled;
                let stalled = base.x_vel.abs() < MIN_SPEED_MPS;
                (
                    error,
                    is_reached(error, ACCEPTABLE_ERROR_M, EXCELLENT_ERROR_M, stalled),
                )
            }
        }
    }
}

impl CommandGroup for MobileBaseGroup {
    fn name(&self) -> &'static str {
        "mobile_base"
    }

    fn joint_names(&self) -> &'static [&'static str] {
        &BASE_JOINTS
    }

    fn update(&mut self, commanded_names: &[String], mode: Mode) -> Result<(), GoalError> {
        self.cmd.clear();
        self.reached = false;

        let has = |j: &str| commanded_names.iter().any(|n| n == j);

        if mode == Mode::Manipulation {
            if has(TRANSLATE_JOINT) || has(ROTATE_JOINT) {
                return Err(GoalError::invalid_joints(format!(
                    "{} and {} cannot be used in manipulation mode, use {} instead",
                    TRANSLATE_JOINT, ROTATE_JOINT, BASE_TRANSLATION_JOINT
                )));
            }
            self.cmd.claim(BASE_TRANSLATION_JOINT, commanded_names);
        } else {
            if has(BASE_TRANSLATION_JOINT) {
                return Err(GoalError::invalid_joints(format!(
                    "{} can only be used in manipulation mode, current mode = {}",
                    BASE_TRANSLATION_JOINT, mode
                )));
            }
            if has(TRANSLATE_JOINT) && has(ROTATE_JOINT) {
                return Err(GoalError::invalid_joints(format!(
                    "Received a command that translates and rotates the mobile base at the same \
                    time, {} and {} are mutually exclusive",
                    TRANSLATE_JOINT, ROTATE_JOINT
                )));
            }
            self.cmd
                .claim_any(&[TRANSLATE_JOINT, ROTATE_JOINT], commanded_names);
        }

        Ok(())
    }

    fn num_valid_commands(&self) -> usize {
        self.cmd.num_valid()
    }

    fn set_goal(
        &mut self,
        point: &TrajectoryPoint,
        fail_out_of_range: bool,
        origin: Option<&ManipulationOrigin>,
    ) -> Result<(), GoalError> {
        self.reached = false;

        match self.joint() {
            None => Ok(()),
            Some(BaseJoint::Rotate) => {
                self.cmd
                    .set_goal(point, self.rotation_range_rad, fail_out_of_range)
            }
            Some(BaseJoint::Translation) => {
                self.origin = Some(*origin.ok_or_else(|| {
                    GoalError::invalid_goal(
                        "No manipulation origin has been captured for the mobile base translation",
                    )
                })?);
                self.cmd
                    .set_goal(point, self.translation_range_m, fail_out_of_range)
            }
            Some(BaseJoint::Translate) => {
                self.cmd
                    .set_goal(point, self.translation_range_m, fail_out_of_range)
            }
        }
    }

    fn init_execution(
        &mut self,
        hardware: &dyn Hardware,
        status: &RobotStatus,
        _backlash: &mut BacklashState,
    ) {
        let goal = match self.cmd.goal() {
            Some(g) => g,
            None => return,
        };

        self.start = status.base;
        let (error, reached) = self.error(goal, &status.base);

        match self.joint() {
            Some(BaseJoint::Rotate) => hardware.rotate_by(error, self.cmd.limits()),
            _ => hardware.translate_by(error, self.cmd.limits()),
        }

        self.cmd.set_error(error);
        self.reached = reached;
    }

    fn goal_reached(&self) -> bool {
        !self.cmd.is_active() || self.reached
    }

    fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        _backlash: &BacklashState,
    ) -> ExecUpdate {
        let (name, goal) = match (self.cmd.name(), self.cmd.goal()) {
            (Some(n), Some(g)) => (n.to_string(), g),
            _ => return ExecUpdate::Tracking(Vec::new()),
        };

        let base = &status.base;
        if !(base.x.is_finite() && base.y.is_finite() && base.theta.is_finite()) {
            return ExecUpdate::Fatal(format!("Mobile base odometry is not finite: {:?}", base));
        }

        let (error, reached) = self.error(goal, base);
        if !error.is_finite() {
            return ExecUpdate::Fatal(format!("Cannot compute the error of {}", name));
        }

        self.cmd.set_error(error);
        self.reached = reached;
        if reached {
            self.cmd.report_success(on_success);
        }

        ExecUpdate::Tracking(vec![(name, error)])
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn is_reached(error: f64, acceptable: f64, excellent: f64, stalled: bool) -> bool {
    let error = error.abs();
    error < excellent || (error < acceptable && stalled)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::{SimMotion, SimRobot};
    use comms_if::tm::ResultCode;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mode_rules() {
        let params = DrvExecParams::default();
        let mut group = MobileBaseGroup::new(&params);

        let err = group
            .update(&names(&[TRANSLATE_JOINT]), Mode::Manipulation)
            .unwrap_err();
        assert_eq!(err.code, ResultCode::InvalidJoints);

        let err = group
            .update(&names(&[BASE_TRANSLATION_JOINT]), Mode::Position)
            .unwrap_err();
        assert_eq!(err.code, ResultCode::InvalidJoints);

        let err = group
            .update(&names(&[TRANSLATE_JOINT, ROTATE_JOINT]), Mode::Position)
            .unwrap_err();
        assert_eq!(err.code, ResultCode::InvalidJoints);

        group
            .update(&names(&[ROTATE_JOINT]), Mode::Navigation)
            .unwrap();
        assert_eq!(group.num_valid_commands(), 1);
    }

    #[test]
    fn test_virtual_translation_relative_to_origin() {
        let params = DrvExecParams::default();
        let sim = SimRobot::new(SimMotion::Frozen);
        let mut group = MobileBaseGroup::new(&params);
        let mut backlash = BacklashState::default();

        group
            .update(&names(&[BASE_TRANSLATION_JOINT]), Mode::Manipulation)
            .unwrap();

        let point = TrajectoryPoint::new(0.0, vec![0.2]);
        assert_eq!(
            group.set_goal(&point, true, None).unwrap_err().code,
            ResultCode::InvalidGoal
        );

        let origin = ManipulationOrigin {
            x: 1.0,
            y: 0.0,
            theta: 0.0,
        };
        group.set_goal(&point, true, Some(&origin)).unwrap();

        let mut status = RobotStatus::default();
        status.base.x = 1.1;
        group.init_execution(&sim, &status, &mut backlash);
        assert!((sim.staged_translation() - 0.1).abs() < 1e-12);
        assert!(!group.goal_reached());

        let mut reached = false;
        status.base.x = 1.198;
        group.update_execution(&status, &mut |_| reached = true, &backlash);
        assert!(group.goal_reached());
        assert!(reached);
    }

    #[test]
    fn test_rotation_excellent() {
        let params = DrvExecParams::default();
        let sim = SimRobot::new(SimMotion::Frozen);
        let mut group = MobileBaseGroup::new(&params);
        let mut backlash = BacklashState::default();

        group
            .update(&names(&[ROTATE_JOINT]), Mode::Position)
            .unwrap();
        group
            .set_goal(&TrajectoryPoint::new(0.0, vec![0.5]), true, None)
            .unwrap();

        let mut status = RobotStatus::default();
        group.init_execution(&sim, &status, &mut backlash);
        assert!((sim.staged_rotation() - 0.5).abs() < 1e-12);

        // Within the acceptable error but still turning
        status.base.theta = 0.45;
        status.base.theta_vel = 0.3;
        group.update_execution(&status, &mut |_| (), &backlash);
        assert!(!group.goal_reached());

        // Stalled
        status.base.theta_vel = 0.0;
        group.update_execution(&status, &mut |_| (), &backlash);
        assert!(group.goal_reached());

        // Within the excellent error while still turning
        status.base.theta = 0.4999;
        status.base.theta_vel = 0.3;
        group.update_execution(&status, &mut |_| (), &backlash);
        assert!(group.goal_reached());
    }
}
