//! # Trajectory interpolator
//!
//! Executes a joint trajectory goal by honouring the time offsets of its points. One
//! [`JointSpline`] is built per commanded joint, starting from the joint's measured state, and the
//! splines are handed to the hardware to play back together. The interpolator then watches the
//! playback, streaming feedback until it completes or the goal is preempted.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod spline;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

// Internal
pub use spline::*;

use crate::{
    arm_merge::{merge_arm_joints, WRIST_EXTENSION},
    goal_exec::ExecContext,
    goal_error::GoalError,
    hardware::{Hardware, HardwareError},
    mode_ctrl::ManipulationOrigin,
    params::GoalParams,
};
use comms_if::{
    eqpt::{Actuator, RobotStatus},
    tc::{JointTrajectory, TrajectoryPoint},
    tm::{Feedback, FeedbackPoint, GoalResult, ResultCode},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct TrajectoryInterpolator {
    params: GoalParams,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A joint which can follow a spline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrajJoint {
    HeadPan,
    HeadTilt,
    WristYaw,

    /// Finger angle of the gripper.
    Gripper,

    /// Telescoping arm extension.
    Arm,
    Lift,

    /// Translation of the base along its heading.
    Base,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TrajJoint {
    pub const ALL: [TrajJoint; 7] = [
        TrajJoint::HeadPan,
        TrajJoint::HeadTilt,
        TrajJoint::WristYaw,
        TrajJoint::Gripper,
        TrajJoint::Arm,
        TrajJoint::Lift,
        TrajJoint::Base,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|j| j.name() == name)
    }

    /// Joint name used in trajectories.
    pub fn name(&self) -> &'static str {
        match self {
            TrajJoint::HeadPan => "joint_head_pan",
            TrajJoint::HeadTilt => "joint_head_tilt",
            TrajJoint::WristYaw => "joint_wrist_yaw",
            TrajJoint::Gripper => "stretch_gripper",
            TrajJoint::Arm => WRIST_EXTENSION,
            TrajJoint::Lift => "joint_lift",
            TrajJoint::Base => "position",
        }
    }

    /// The actuator driving this joint, `None` for the base.
    pub fn actuator(&self) -> Option<Actuator> {
        match self {
            TrajJoint::HeadPan => Some(Actuator::HeadPan),
            TrajJoint::HeadTilt => Some(Actuator::HeadTilt),
            TrajJoint::WristYaw => Some(Actuator::WristYaw),
            TrajJoint::Gripper => Some(Actuator::Gripper),
            TrajJoint::Arm => Some(Actuator::Arm),
            TrajJoint::Lift => Some(Actuator::Lift),
            TrajJoint::Base => None,
        }
    }

    /// Measured position and velocity of the joint.
    ///
    /// The base position is its translation from the origin, or from the odometry frame's origin
    /// if none is given.
    pub fn measure(
        &self,
        status: &RobotStatus,
        origin: Option<&ManipulationOrigin>,
    ) -> (f64, f64) {
        match self {
            TrajJoint::Gripper => (status.gripper.pos_rad, status.gripper.vel),
            TrajJoint::Base => {
                let origin = origin.copied().unwrap_or_default();
                (origin.translation_of(&status.base), status.base.x_vel)
            }
            j => {
                // Every other joint has an actuator
                let actuator = j.actuator().unwrap_or(Actuator::Lift);
                let s = status.actuator(actuator);
                (s.pos, s.vel)
            }
        }
    }
}

impl TrajectoryInterpolator {
    pub fn new(params: GoalParams) -> Self {
        Self { params }
    }

    /// Execute the goal to completion, returning its result.
    pub fn execute(&self, trajectory: JointTrajectory, ctx: &mut ExecContext) -> GoalResult {
        ctx.gate.clear_stop();

        match self.run(trajectory, ctx) {
            Ok(msg) => {
                info!("Trajectory succeeded: {}", msg);
                GoalResult::success(msg)
            }
            Err(e) => {
                match e.code {
                    ResultCode::Preempted => warn!("Trajectory aborted: {}", e),
                    _ => error!("Trajectory aborted: {}", e),
                }
                e.into()
            }
        }
    }

    /// Build one spline per joint, starting from the measured state.
    ///
    /// The first point's positions are replaced with the measured positions, and its velocities
    /// (when given) with the measured velocities, so playback starts without a jump.
    pub fn build_splines(
        &self,
        joints: &[TrajJoint],
        points: &[TrajectoryPoint],
        status: &RobotStatus,
        origin: Option<&ManipulationOrigin>,
    ) -> Result<Vec<(TrajJoint, JointSpline)>, GoalError> {
        let mut splines = Vec::with_capacity(joints.len());

        for (i, joint) in joints.iter().enumerate() {
            let (pos, vel) = joint.measure(status, origin);
            if !pos.is_finite() || !vel.is_finite() {
                return Err(GoalError::unknown(format!(
                    "The measured state of {} is invalid",
                    joint.name()
                )));
            }

            let waypoints = points
                .iter()
                .enumerate()
                .map(|(k, p)| {
                    let mut w = Waypoint::new(p.time_from_start_s, p.positions[i]);
                    w.velocity = p.velocity(i);
                    w.acceleration = p.acceleration(i);
                    if k == 0 {
                        w.position = pos;
                        w.velocity = w.velocity.map(|_| vel);
                    }
                    w
                })
                .collect();

            let spline = JointSpline::new(waypoints).map_err(|e| {
                GoalError::invalid_goal(format!(
                    "Cannot build the trajectory of {}: {}",
                    joint.name(),
                    e
                ))
            })?;
            splines.push((*joint, spline));
        }

        Ok(splines)
    }

    fn run(&self, trajectory: JointTrajectory, ctx: &mut ExecContext) -> Result<String, GoalError> {
        let (joints, trajectory) = self.validate(trajectory)?;

        if trajectory.points.is_empty() {
            return Ok(String::from("Achieved all target points."));
        }

        info!(
            "New trajectory with {} points over {:.02} s for joints {:?}",
            trajectory.points.len(),
            trajectory.duration_s(),
            trajectory.joint_names
        );

        let origin = ctx.gate.origin();
        let status = ctx.hardware.get_status().map_err(|e| fault(ctx.hardware, e))?;
        let splines = self.build_splines(&joints, &trajectory.points, &status, origin.as_ref())?;
        let desired = splines.clone();

        for (joint, spline) in splines {
            ctx.hardware
                .set_trajectory(joint, spline)
                .map_err(|e| fault(ctx.hardware, e))?;
        }
        ctx.hardware.start_trajectory().map_err(|e| fault(ctx.hardware, e))?;

        let start = Instant::now();
        let period = Duration::from_secs_f64(self.params.trajectory_period_s());

        while ctx.hardware.is_trajectory_executing() {
            if let Some(e) = ctx.check_preempted() {
                ctx.hardware.stop_trajectory();
                return Err(e);
            }

            let status = ctx.hardware.get_status().map_err(|e| fault(ctx.hardware, e))?;
            let t = start.elapsed().as_secs_f64();

            let mut feedback = Feedback {
                stamp: Utc::now(),
                joint_names: trajectory.joint_names.clone(),
                desired: FeedbackPoint::at(t),
                actual: FeedbackPoint::at(t),
                error: FeedbackPoint::at(t),
            };

            for (joint, spline) in desired.iter() {
                let (actual, _) = joint.measure(&status, origin.as_ref());
                if !actual.is_finite() {
                    ctx.hardware.stop_trajectory();
                    return Err(GoalError::unknown(format!(
                        "The measured position of {} is invalid",
                        joint.name()
                    )));
                }

                let desired = spline.sample(t).position;
                feedback.desired.positions.push(desired);
                feedback.actual.positions.push(actual);
                feedback.error.positions.push(desired - actual);
            }

            ctx.send_feedback(feedback);
            ctx.signals.wait(period);
        }

        ctx.hardware.stop_trajectory();

        Ok(String::from("Achieved all target points."))
    }

    /// Check the goal and map its names to joints, before anything is sent to the hardware.
    fn validate(
        &self,
        trajectory: JointTrajectory,
    ) -> Result<(Vec<TrajJoint>, JointTrajectory), GoalError> {
        if let Some((i, len)) = trajectory.find_length_mismatch() {
            return Err(GoalError::invalid_goal(format!(
                "Point {} has {} positions but {} joint names were given",
                i,
                len,
                trajectory.joint_names.len()
            )));
        }

        let mut trajectory = merge_arm_joints(trajectory)?;

        if trajectory.joint_names.is_empty() {
            return Err(GoalError::invalid_joints("No joints were commanded"));
        }

        let joints = trajectory
            .joint_names
            .iter()
            .map(|n| {
                TrajJoint::from_name(n)
                    .ok_or_else(|| GoalError::invalid_joints(format!("Cannot find joint \"{}\"", n)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(name) = trajectory.find_duplicate_name() {
            return Err(GoalError::invalid_joints(format!(
                "Joint \"{}\" appears more than once in the goal",
                name
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

        Ok((joints, trajectory))
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Stop playback and turn a hardware failure into a goal error.
fn fault(hardware: &dyn Hardware, err: HardwareError) -> GoalError {
    hardware.stop_trajectory();
    GoalError::unknown(err.to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        backlash::BacklashState,
        goal_exec::{GoalSignal, GoalSignals},
        hardware::{SimMotion, SimRobot},
        mode_ctrl::ModeController,
        params::CalibrationParams,
    };
    use comms_if::tc::Mode;
    use std::sync::{
        mpsc::{channel, Sender},
        Mutex,
    };

    fn run(
        sim: &SimRobot,
        trajectory: JointTrajectory,
        pre_signal: Option<GoalSignal>,
    ) -> (GoalResult, Vec<Feedback>) {
        let ctrl = ModeController::new(Mode::Position);
        let gate = ctrl.read();
        let backlash = Mutex::new(BacklashState::default());
        let calib = CalibrationParams::default();
        let (signal_tx, signal_rx): (Sender<GoalSignal>, _) = channel();
        let (fb_tx, fb_rx) = channel();

        if let Some(s) = pre_signal {
            signal_tx.send(s).unwrap();
        }

        let mut ctx = ExecContext {
            hardware: sim,
            gate: &gate,
            backlash: &backlash,
            calibration: &calib,
            signals: GoalSignals::new(signal_rx),
            feedback: fb_tx,
        };

        let interp = TrajectoryInterpolator::new(GoalParams {
            trajectory_rate_hz: 100.0,
            ..Default::default()
        });
        let result = interp.execute(trajectory, &mut ctx);
        drop(ctx);

        (result, fb_rx.try_iter().collect())
    }

    #[test]
    fn test_joint_names() {
        for j in TrajJoint::ALL.iter() {
            assert_eq!(TrajJoint::from_name(j.name()), Some(*j));
        }
        assert_eq!(TrajJoint::from_name("joint_arm_l0"), None);
        assert_eq!(TrajJoint::Base.actuator(), None);
    }

    #[test]
    fn test_unknown_joint_rejected() {
        let sim = SimRobot::new(SimMotion::Instant);
        let traj = JointTrajectory::new(&["joint_lift", "joint_elbow"])
            .with_point(TrajectoryPoint::new(0.0, vec![0.1, 0.1]));

        let (result, _) = run(&sim, traj, None);

        assert_eq!(result.code, ResultCode::InvalidJoints);
        assert_eq!(result.message, "Cannot find joint \"joint_elbow\"");
        assert_eq!(sim.calls().status_reads, 0);
    }

    #[test]
    fn test_spline_starts_from_measured_state() {
        let interp = TrajectoryInterpolator::new(GoalParams::default());
        let mut status = RobotStatus::default();
        status.lift.pos = 0.05;
        status.lift.vel = 0.01;

        let points = vec![
            TrajectoryPoint::new(0.0, vec![0.2]).with_velocities(vec![0.0]),
            TrajectoryPoint::new(2.0, vec![0.4]).with_velocities(vec![0.0]),
        ];
        let splines = interp
            .build_splines(&[TrajJoint::Lift], &points, &status, None)
            .unwrap();

        let (_, spline) = &splines[0];
        let start = spline.sample(0.0);
        assert!((start.position - 0.05).abs() < 1e-12);
        assert!((spline.sample(1e-6).velocity - 0.01).abs() < 1e-4);
        assert!((spline.sample(2.0).position - 0.4).abs() < 1e-12);
        assert_eq!(spline.segment_kinds(), vec![SegmentKind::Cubic]);
    }

    #[test]
    fn test_repeated_time_rejected() {
        let sim = SimRobot::new(SimMotion::Instant);
        let traj = JointTrajectory::new(&["joint_lift"])
            .with_point(TrajectoryPoint::new(0.0, vec![0.1]))
            .with_point(TrajectoryPoint::new(0.5, vec![0.2]))
            .with_point(TrajectoryPoint::new(0.5, vec![0.3]));

        let (result, _) = run(&sim, traj, None);

        assert_eq!(result.code, ResultCode::InvalidGoal);
        assert_eq!(sim.calls().trajectory_starts, 0);
    }

    #[test]
    fn test_playback_completes() {
        let sim = SimRobot::new(SimMotion::Instant);
        let traj = JointTrajectory::new(&["joint_lift", "position"])
            .with_point(TrajectoryPoint::new(0.0, vec![0.0, 0.0]))
            .with_point(TrajectoryPoint::new(0.1, vec![0.3, 0.05]));

        let (result, feedback) = run(&sim, traj, None);

        assert!(result.is_success(), "{}", result);
        assert!(!feedback.is_empty());
        assert_eq!(feedback[0].desired.positions.len(), 2);

        let status = sim.peek_status();
        assert!((status.lift.pos - 0.3).abs() < 1e-9);
        assert!((status.base.x - 0.05).abs() < 1e-9);

        let calls = sim.calls();
        assert_eq!(calls.trajectory_starts, 1);
        assert_eq!(calls.trajectory_stops, 1);
    }

    #[test]
    fn test_cancel_stops_playback() {
        let sim = SimRobot::new(SimMotion::Instant);
        let traj = JointTrajectory::new(&["joint_head_pan"])
            .with_point(TrajectoryPoint::new(0.0, vec![0.0]))
            .with_point(TrajectoryPoint::new(5.0, vec![1.0]));

        let (result, _) = run(&sim, traj, Some(GoalSignal::Cancel));

        assert_eq!(result.code, ResultCode::Preempted);
        assert!(!sim.is_trajectory_executing());
        assert_eq!(sim.calls().trajectory_stops, 1);
        assert!(sim.peek_status().head_pan.pos < 1.0);
    }

    #[test]
    fn test_hardware_fault_is_unknown_error() {
        let sim = SimRobot::new(SimMotion::Instant);
        let traj = JointTrajectory::new(&["joint_lift"])
            .with_point(TrajectoryPoint::new(0.0, vec![0.0]))
            .with_point(TrajectoryPoint::new(1.0, vec![0.3]));

        sim.set_fault(Some(HardwareError::CommsError(String::from("bus off"))));
        let (result, _) = run(&sim, traj, None);
        assert_eq!(result.code, ResultCode::UnknownError);
        assert!(result.message.contains("bus off"));
        assert_eq!(sim.calls().trajectory_starts, 0);
    }

    #[test]
    fn test_empty_trajectory_succeeds() {
        let sim = SimRobot::new(SimMotion::Instant);
        let (result, _) = run(&sim, JointTrajectory::new(&["joint_lift"]), None);

        assert!(result.is_success());
        assert_eq!(sim.calls().status_reads, 0);
    }
}
