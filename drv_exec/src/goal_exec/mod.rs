//! # Goal executor
//!
//! Executes a joint trajectory goal point by point. For each point every command group extracts
//! its target and stages a relative move, the moves are pushed together, and the groups are then
//! polled until they all report their target reached.
//!
//! The time offsets of the points are ignored here, each point is executed as fast as the joints
//! allow. Goals that need the timing honoured go through the
//! [`TrajectoryInterpolator`](crate::traj_interp::TrajectoryInterpolator) instead.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod context;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::time::{Duration, Instant};

// Internal
pub use context::*;

use crate::{
    arm_merge::merge_arm_joints,
    cmd_groups::CommandGroups,
    goal_error::GoalError,
    hardware::{self, HardwareError},
    params::GoalParams,
};
use comms_if::{
    tc::{JointTrajectory, Mode, TrajectoryPoint},
    tm::{Feedback, FeedbackPoint, GoalResult, ResultCode},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct GoalExecutor {
    groups: CommandGroups,
    params: GoalParams,
    state: ExecState,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Where the executor is in the life of a goal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecState {
    Idle,
    Validating,

    /// Extracting the targets of the point with this index.
    SettingGoal(usize),

    /// Waiting for the point with this index to be reached.
    Executing(usize),

    Reached(usize),
    Succeeded,
    Aborted(ResultCode),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalExecutor {
    pub fn new(groups: CommandGroups, params: GoalParams) -> Self {
        Self {
            groups,
            params,
            state: ExecState::Idle,
        }
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// Execute the goal to completion, returning its result.
    pub fn execute(&mut self, trajectory: JointTrajectory, ctx: &mut ExecContext) -> GoalResult {
        // A stop raised before this goal started is not meant for it
        ctx.gate.clear_stop();

        match self.run(trajectory, ctx) {
            Ok(msg) => {
                self.transition(ExecState::Succeeded);
                info!("Goal succeeded: {}", msg);
                GoalResult::success(msg)
            }
            Err(e) => {
                self.transition(ExecState::Aborted(e.code));
                match e.code {
                    ResultCode::Preempted => warn!("Goal aborted: {}", e),
                    _ => error!("Goal aborted: {}", e),
                }
                e.into()
            }
        }
    }

    fn run(&mut self, trajectory: JointTrajectory, ctx: &mut ExecContext) -> Result<String, GoalError> {
        self.transition(ExecState::Validating);
        let trajectory = self.validate(trajectory, ctx.gate.mode())?;

        info!(
            "New goal with {} points for joints {:?}",
            trajectory.points.len(),
            trajectory.joint_names
        );

        let goal_start = Instant::now();

        for (i, point) in trajectory.points.iter().enumerate() {
            self.execute_point(i, point, &trajectory.joint_names, goal_start, ctx)?;
        }

        Ok(String::from("Achieved all target points."))
    }

    /// Check the goal before anything is sent to the hardware.
    fn validate(
        &mut self,
        trajectory: JointTrajectory,
        mode: Mode,
    ) -> Result<JointTrajectory, GoalError> {
        if let Some((i, len)) = trajectory.find_length_mismatch() {
            return Err(GoalError::invalid_goal(format!(
                "Point {} has {} positions but {} joint names were given",
                i,
                len,
                trajectory.joint_names.len()
            )));
        }

        if let Some(name) = trajectory.find_duplicate_name() {
            return Err(GoalError::invalid_joints(format!(
                "Joint \"{}\" appears more than once in the goal",
                name
            )));
        }

        let mut trajectory = merge_arm_joints(trajectory)?;

        let num_claimed = self.groups.update(&trajectory.joint_names, mode)?;
        if num_claimed == 0 {
            return Err(GoalError::invalid_joints(
                "None of the commanded joints are supported",
            ));
        }
        if num_claimed != trajectory.joint_names.len() {
            let unsupported: Vec<&str> = trajectory
                .joint_names
                .iter()
                .map(|n| n.as_str())
                .filter(|n| self.groups.owner_of(n).is_none())
                .collect();
            return Err(GoalError::invalid_joints(format!(
                "Only {} of the {} commanded joints can be executed in {} mode, unsupported \
                joints: {:?}",
                num_claimed,
                trajectory.joint_names.len(),
                mode,
                unsupported
            )));
        }

        for point in trajectory.points.iter_mut() {
            if self.params.ignore_trajectory_velocities {
                point.velocities.clear();
            }
            if self.params.ignore_trajectory_accelerations {
                point.accelerations.clear();
            }
        }

        Ok(trajectory)
    }

    fn execute_point(
        &mut self,
        index: usize,
        point: &TrajectoryPoint,
        joint_names: &[String],
        goal_start: Instant,
        ctx: &mut ExecContext,
    ) -> Result<(), GoalError> {
        self.transition(ExecState::SettingGoal(index));
        let origin = ctx.gate.origin();
        self.groups
            .set_goal(point, self.params.fail_out_of_range_goal, origin.as_ref())?;

        self.transition(ExecState::Executing(index));
        let status = ctx
            .hardware
            .get_status()
            .map_err(|e| hardware_fault(ctx, e))?;
        {
            let mut backlash = ctx
                .backlash
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            self.groups
                .init_execution(ctx.hardware, &status, &mut backlash);
        }
        ctx.hardware
            .push_command()
            .map_err(|e| hardware_fault(ctx, e))?;

        let point_start = Instant::now();
        let timeout = Duration::from_secs_f64(self.params.goal_timeout_s);
        let period = Duration::from_secs_f64(self.params.poll_period_s());

        while !self.groups.goals_reached() {
            if point_start.elapsed() > timeout {
                return Err(GoalError::timeout(format!(
                    "Time to execute the current goal point = {} exceeded the timeout = {:.01} s",
                    index, self.params.goal_timeout_s
                )));
            }

            if let Some(e) = ctx.check_preempted() {
                return Err(e);
            }

            let status = ctx
                .hardware
                .get_status()
                .map_err(|e| hardware_fault(ctx, e))?;
            let backlash = ctx.update_backlash(&status);

            let errors = match self.groups.update_execution(
                &status,
                &mut |group| debug!("Point {}: {} reached its goal", index, group),
                &backlash,
            ) {
                Ok(e) => e,
                Err(msg) => {
                    if let Err(e) = hardware::halt(ctx.hardware) {
                        error!("Could not halt the robot after a fatal error: {}", e);
                    }
                    return Err(GoalError::unknown(msg));
                }
            };

            ctx.send_feedback(point_feedback(
                point,
                joint_names,
                &errors,
                goal_start.elapsed().as_secs_f64(),
            ));

            ctx.signals.wait(period);
        }

        self.transition(ExecState::Reached(index));
        debug!("Point {} reached", index);

        Ok(())
    }

    fn transition(&mut self, state: ExecState) {
        debug!("Goal executor: {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Halt the robot and turn a hardware failure into a goal error.
fn hardware_fault(ctx: &ExecContext, err: HardwareError) -> GoalError {
    if let Err(e) = hardware::halt(ctx.hardware) {
        error!("Could not halt the robot: {}", e);
    }
    GoalError::unknown(err.to_string())
}

/// Build feedback from the desired point and the per joint errors.
///
/// Joints with no reported error get a `NaN` actual position and error.
fn point_feedback(
    point: &TrajectoryPoint,
    joint_names: &[String],
    errors: &HashMap<String, f64>,
    time_from_start_s: f64,
) -> Feedback {
    let error: Vec<f64> = joint_names
        .iter()
        .map(|n| errors.get(n).copied().unwrap_or(f64::NAN))
        .collect();
    let actual = point
        .positions
        .iter()
        .zip(error.iter())
        .map(|(d, e)| d - e)
        .collect();

    Feedback {
        stamp: Utc::now(),
        joint_names: joint_names.to_vec(),
        desired: FeedbackPoint {
            time_from_start_s,
            positions: point.positions.clone(),
        },
        actual: FeedbackPoint {
            time_from_start_s,
            positions: actual,
        },
        error: FeedbackPoint {
            time_from_start_s,
            positions: error,
        },
    }
}
