//! # Command groups
//!
//! A command group owns a disjoint subset of the joint names a trajectory may contain. For each
//! goal point the executor asks every group to pull its target out of the point, stage a relative
//! move on the hardware, and then track the error until the target is reached.
//!
//! Exactly seven groups exist, one per degree of freedom the driver exposes: head pan, head tilt,
//! wrist yaw, gripper, telescoping arm, lift and mobile base. They are reached through the
//! [`CommandGroups`] registry.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod arm;
mod base;
mod end_of_arm;
mod head;
mod joint_cmd;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::collections::HashMap;
use thiserror::Error;

// Internal
pub use arm::{LiftGroup, TelescopingGroup};
pub use base::MobileBaseGroup;
pub use end_of_arm::{GripperGroup, WristYawGroup};
pub use head::{HeadPanGroup, HeadTiltGroup};
pub use joint_cmd::JointCommand;

use crate::{
    backlash::BacklashState, goal_error::GoalError, hardware::Hardware,
    mode_ctrl::ManipulationOrigin, params::DrvExecParams,
};
use comms_if::{
    eqpt::RobotStatus,
    tc::{Mode, TrajectoryPoint},
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Acceptable head pan error.
///
/// Units: radians
pub const HEAD_PAN_ACCEPTABLE_ERROR_RAD: f64 = 0.15;

/// Acceptable head tilt error.
///
/// Units: radians
pub const HEAD_TILT_ACCEPTABLE_ERROR_RAD: f64 = 0.52;

/// Acceptable wrist yaw error.
///
/// Units: radians
pub const WRIST_YAW_ACCEPTABLE_ERROR_RAD: f64 = 0.015;

/// Acceptable gripper error.
///
/// Units: percent
pub const GRIPPER_ACCEPTABLE_ERROR_PCT: f64 = 1.0;

/// Acceptable arm extension error.
///
/// Units: meters
pub const ARM_ACCEPTABLE_ERROR_M: f64 = 0.008;

/// Acceptable lift error.
///
/// Units: meters
pub const LIFT_ACCEPTABLE_ERROR_M: f64 = 0.015;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A set of joints commanded together from trajectory points.
pub trait CommandGroup: Send {
    /// Name of the group used in logs.
    fn name(&self) -> &'static str;

    /// Every joint name this group owns.
    fn joint_names(&self) -> &'static [&'static str];

    /// Claim the names this group owns out of the commanded names.
    ///
    /// Fails with an `InvalidJoints` error if the combination of names is not allowed.
    fn update(&mut self, commanded_names: &[String], mode: Mode) -> Result<(), GoalError>;

    /// Number of names claimed by the last call to [`CommandGroup::update`].
    fn num_valid_commands(&self) -> usize;

    /// Extract this group's target from the point.
    ///
    /// Fails with an `InvalidGoal` error if the target is out of range and `fail_out_of_range`
    /// is set, otherwise out of range targets are clamped.
    fn set_goal(
        &mut self,
        point: &TrajectoryPoint,
        fail_out_of_range: bool,
        origin: Option<&ManipulationOrigin>,
    ) -> Result<(), GoalError>;

    /// Stage the move towards the target. Nothing moves until the hardware command is pushed.
    fn init_execution(
        &mut self,
        hardware: &dyn Hardware,
        status: &RobotStatus,
        backlash: &mut BacklashState,
    );

    /// True once the target is reached, or if the group claimed nothing.
    fn goal_reached(&self) -> bool;

    /// Recompute the tracking error from a fresh status.
    ///
    /// `on_success` is called once when the target is reached.
    fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        backlash: &BacklashState,
    ) -> ExecUpdate;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The seven command groups, and which of them owns each joint name.
pub struct CommandGroups {
    groups: Vec<Box<dyn CommandGroup>>,
    owners: HashMap<&'static str, usize>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Outcome of tracking a group's target.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecUpdate {
    /// Position error of each claimed joint, as target minus measured.
    Tracking(Vec<(String, f64)>),

    /// The group cannot continue, for instance because a measurement is invalid.
    Fatal(String),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Joint \"{0}\" is claimed by both the {1} and the {2} groups")]
    DuplicateJoint(String, &'static str, &'static str),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommandGroups {
    /// Build the registry of all seven groups from the driver parameters.
    pub fn new(params: &DrvExecParams) -> Result<Self, RegistryError> {
        Self::from_groups(vec![
            Box::new(HeadPanGroup::new(params)),
            Box::new(HeadTiltGroup::new(params)),
            Box::new(WristYawGroup::new(params)),
            Box::new(GripperGroup::new(params)),
            Box::new(TelescopingGroup::new(params)),
            Box::new(LiftGroup::new(params)),
            Box::new(MobileBaseGroup::new(params)),
        ])
    }

    /// Build a registry from explicit groups, checking no name is owned twice.
    pub fn from_groups(groups: Vec<Box<dyn CommandGroup>>) -> Result<Self, RegistryError> {
        let mut owners = HashMap::new();

        for (i, group) in groups.iter().enumerate() {
            for name in group.joint_names() {
                if let Some(prev) = owners.insert(*name, i) {
                    return Err(RegistryError::DuplicateJoint(
                        name.to_string(),
                        groups[prev].name(),
                        group.name(),
                    ));
                }
            }
        }

        Ok(Self { groups, owners })
    }

    /// Name of the group owning the given joint.
    pub fn owner_of(&self, joint_name: &str) -> Option<&'static str> {
        self.owners.get(joint_name).map(|i| self.groups[*i].name())
    }

    /// Let every group claim its names, returning the total number of names claimed.
    pub fn update(&mut self, commanded_names: &[String], mode: Mode) -> Result<usize, GoalError> {
        let mut num_claimed = 0;
        for group in self.groups.iter_mut() {
            group.update(commanded_names, mode)?;
            num_claimed += group.num_valid_commands();
        }

        Ok(num_claimed)
    }

    pub fn set_goal(
        &mut self,
        point: &TrajectoryPoint,
        fail_out_of_range: bool,
        origin: Option<&ManipulationOrigin>,
    ) -> Result<(), GoalError> {
        for group in self.groups.iter_mut() {
            group.set_goal(point, fail_out_of_range, origin)?;
        }
        Ok(())
    }

    pub fn init_execution(
        &mut self,
        hardware: &dyn Hardware,
        status: &RobotStatus,
        backlash: &mut BacklashState,
    ) {
        for group in self.groups.iter_mut() {
            group.init_execution(hardware, status, backlash);
        }
    }

    pub fn goals_reached(&self) -> bool {
        self.groups.iter().all(|g| g.goal_reached())
    }

    /// Update every group, collecting the errors of all claimed joints.
    ///
    /// Returns the message of the first fatal update, if any.
    pub fn update_execution(
        &mut self,
        status: &RobotStatus,
        on_success: &mut dyn FnMut(&str),
        backlash: &BacklashState,
    ) -> Result<HashMap<String, f64>, String> {
        let mut errors = HashMap::new();

        for group in self.groups.iter_mut() {
            match group.update_execution(status, on_success, backlash) {
                ExecUpdate::Tracking(errs) => errors.extend(errs),
                ExecUpdate::Fatal(msg) => return Err(msg),
            }
        }

        Ok(errors)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hardware::{Hardware, SimMotion, SimRobot};
    use comms_if::tm::ResultCode;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_registry_is_disjoint() {
        let groups = CommandGroups::new(&DrvExecParams::default()).unwrap();

        assert_eq!(groups.len(), 7);
        assert_eq!(groups.owner_of("joint_lift"), Some("lift"));
        assert_eq!(groups.owner_of("joint_arm_l2"), Some("telescoping"));
        assert_eq!(groups.owner_of("gripper_aperture"), Some("gripper"));
        assert_eq!(groups.owner_of("joint_elbow"), None);

        let params = DrvExecParams::default();
        let dup = CommandGroups::from_groups(vec![
            Box::new(LiftGroup::new(&params)),
            Box::new(LiftGroup::new(&params)),
        ]);
        assert!(matches!(dup, Err(RegistryError::DuplicateJoint(_, "lift", "lift"))));
    }

    #[test]
    fn test_update_counts_claims() {
        let mut groups = CommandGroups::new(&DrvExecParams::default()).unwrap();

        let claimed = groups
            .update(
                &names(&["joint_lift", "joint_head_pan", "translate_mobile_base"]),
                Mode::Position,
            )
            .unwrap();
        assert_eq!(claimed, 3);

        // Unknown names are simply not claimed
        let claimed = groups
            .update(&names(&["joint_lift", "joint_elbow"]), Mode::Position)
            .unwrap();
        assert_eq!(claimed, 1);
    }

    #[test]
    fn test_unclaimed_groups_are_reached() {
        let mut groups = CommandGroups::new(&DrvExecParams::default()).unwrap();
        groups.update(&names(&[]), Mode::Position).unwrap();

        let sim = SimRobot::new(SimMotion::Frozen);
        let status = sim.get_status().unwrap();
        let mut backlash = BacklashState::default();

        groups
            .set_goal(&TrajectoryPoint::new(0.0, vec![]), true, None)
            .unwrap();
        groups.init_execution(&sim, &status, &mut backlash);

        assert!(groups.goals_reached());
        assert!(groups
            .update_execution(&status, &mut |_| (), &backlash)
            .unwrap()
            .is_empty());
        assert_eq!(sim.calls().moves, 0);
    }

    #[test]
    fn test_out_of_range_goal() {
        let mut groups = CommandGroups::new(&DrvExecParams::default()).unwrap();
        groups
            .update(&names(&["joint_lift"]), Mode::Position)
            .unwrap();

        let point = TrajectoryPoint::new(0.0, vec![5.0]);
        assert_eq!(
            groups.set_goal(&point, true, None).unwrap_err().code,
            ResultCode::InvalidGoal
        );
        groups.set_goal(&point, false, None).unwrap();
    }
}
