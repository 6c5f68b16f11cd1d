//! # Simulated robot
//!
//! A [`Hardware`] implementation with a simple kinematic model, used by the executable when no
//! robot is attached and as the hardware double in tests. It counts the calls made to it and can
//! be told to fail, so tests can check exactly what the driver asked of the hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::{Hardware, HardwareError};
use crate::traj_interp::{JointSpline, TrajJoint};
use comms_if::{
    eqpt::{Actuator, BaseStatus, MotionLimits, RobotStatus},
    tc::Twist,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Finger angle per gripper percent used to fill in the gripper status.
///
/// Units: radians/percent
const FINGER_RAD_PER_PCT: f64 = 0.003;

/// Default speed of rotary joints in rate motion.
///
/// Units: radians/second
const ROTARY_SPEED_RADPS: f64 = 1.0;

/// Default speed of prismatic joints in rate motion.
///
/// Units: meters/second
const PRISMATIC_SPEED_MPS: f64 = 0.15;

/// Units: percent/second
const GRIPPER_SPEED_PCTPS: f64 = 50.0;

/// Units: meters/second
const BASE_SPEED_MPS: f64 = 0.1;

/// Units: radians/second
const BASE_RATE_RADPS: f64 = 0.5;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct SimRobot {
    state: Mutex<SimState>,
}

/// Number of calls made to the simulated hardware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCalls {
    pub status_reads: usize,
    pub pushes: usize,

    /// Relative moves of actuators and of the base.
    pub moves: usize,

    pub velocity_cmds: usize,
    pub pos_incr_enables: usize,
    pub homes: usize,
    pub trajectory_starts: usize,
    pub trajectory_stops: usize,
}

struct SimState {
    motion: SimMotion,
    status: RobotStatus,
    last_update: Instant,

    staged: HashMap<Actuator, (f64, MotionLimits)>,
    staged_translation: Option<f64>,
    staged_rotation: Option<f64>,
    staged_twist: Option<Twist>,

    targets: HashMap<Actuator, f64>,
    base_target: Option<BaseStatus>,
    twist: Twist,

    splines: HashMap<TrajJoint, JointSpline>,
    playback: Option<Playback>,

    fault: Option<HardwareError>,
    calls: SimCalls,
}

struct Playback {
    start: Instant,
    base_start: BaseStatus,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// How the simulated joints respond to commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimMotion {
    /// Pushed moves complete immediately.
    Instant,

    /// Pushed moves are followed at a constant speed as time passes.
    Rate,

    /// Nothing ever moves.
    Frozen,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimRobot {
    /// Create a new simulated robot at rest in the zero pose. The robot starts homed.
    pub fn new(motion: SimMotion) -> Self {
        let status = RobotStatus {
            is_calibrated: true,
            ..Default::default()
        };

        Self {
            state: Mutex::new(SimState {
                motion,
                status,
                last_update: Instant::now(),
                staged: HashMap::new(),
                staged_translation: None,
                staged_rotation: None,
                staged_twist: None,
                targets: HashMap::new(),
                base_target: None,
                twist: Twist::zero(),
                splines: HashMap::new(),
                playback: None,
                fault: None,
                calls: SimCalls::default(),
            }),
        }
    }

    pub fn calls(&self) -> SimCalls {
        self.lock().calls
    }

    /// Modify the simulated status directly.
    pub fn modify_status<F: FnOnce(&mut RobotStatus)>(&self, f: F) {
        let mut state = self.lock();
        f(&mut state.status);
    }

    /// Read the simulated status without counting a status read.
    pub fn peek_status(&self) -> RobotStatus {
        self.lock().status.clone()
    }

    /// Make every fallible call fail with the given error, or clear the fault.
    pub fn set_fault(&self, fault: Option<HardwareError>) {
        self.lock().fault = fault;
    }

    /// Delta staged for the actuator and not yet pushed.
    pub fn staged_move(&self, actuator: Actuator) -> Option<f64> {
        self.lock().staged.get(&actuator).map(|(d, _)| *d)
    }

    /// Base translation staged and not yet pushed, zero if none.
    pub fn staged_translation(&self) -> f64 {
        self.lock().staged_translation.unwrap_or(0.0)
    }

    /// Base rotation staged and not yet pushed, zero if none.
    pub fn staged_rotation(&self) -> f64 {
        self.lock().staged_rotation.unwrap_or(0.0)
    }

    /// The base velocity currently applied.
    pub fn base_velocity(&self) -> Twist {
        self.lock().twist
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Hardware for SimRobot {
    fn get_status(&self) -> Result<RobotStatus, HardwareError> {
        let mut state = self.lock();

        if let Some(f) = &state.fault {
            return Err(f.clone());
        }

        state.calls.status_reads += 1;
        state.advance(Instant::now());

        Ok(state.status.clone())
    }

    fn push_command(&self) -> Result<(), HardwareError> {
        let mut state = self.lock();

        if let Some(f) = &state.fault {
            return Err(f.clone());
        }

        state.calls.pushes += 1;
        state.advance(Instant::now());
        state.apply_staged();

        Ok(())
    }

    fn move_by(&self, actuator: Actuator, delta: f64, limits: MotionLimits) {
        let mut state = self.lock();
        state.calls.moves += 1;

        // Moves staged before the same push accumulate
        let staged = state
            .staged
            .entry(actuator)
            .or_insert((0.0, MotionLimits::default()));
        staged.0 += delta;
        staged.1 = limits;
    }

    fn translate_by(&self, delta_m: f64, _limits: MotionLimits) {
        let mut state = self.lock();
        state.calls.moves += 1;
        *state.staged_translation.get_or_insert(0.0) += delta_m;
    }

    fn rotate_by(&self, delta_rad: f64, _limits: MotionLimits) {
        let mut state = self.lock();
        state.calls.moves += 1;
        *state.staged_rotation.get_or_insert(0.0) += delta_rad;
    }

    fn set_base_velocity(&self, twist: Twist) {
        let mut state = self.lock();
        state.calls.velocity_cmds += 1;
        state.staged_twist = Some(twist);
    }

    fn enable_pos_incr_mode(&self) {
        let mut state = self.lock();
        state.calls.pos_incr_enables += 1;
        state.twist = Twist::zero();
        state.staged_twist = None;
    }

    fn home(&self) -> Result<(), HardwareError> {
        let mut state = self.lock();

        if let Some(f) = &state.fault {
            return Err(HardwareError::HomingFailed(f.to_string()));
        }

        state.calls.homes += 1;
        state.status.is_calibrated = true;
        debug!("Simulated robot homed");

        Ok(())
    }

    fn set_runstop(&self, enable: bool) {
        let mut state = self.lock();
        state.status.runstopped = enable;

        if enable {
            state.staged.clear();
            state.staged_translation = None;
            state.staged_rotation = None;
            state.staged_twist = None;
            state.targets.clear();
            state.base_target = None;
            state.twist = Twist::zero();
            state.playback = None;
            state.splines.clear();
        }
    }

    fn set_trajectory(&self, joint: TrajJoint, spline: JointSpline) -> Result<(), HardwareError> {
        let mut state = self.lock();

        if let Some(f) = &state.fault {
            return Err(HardwareError::TrajectoryRejected(joint, f.to_string()));
        }

        state.splines.insert(joint, spline);
        Ok(())
    }

    fn start_trajectory(&self) -> Result<(), HardwareError> {
        let mut state = self.lock();

        if let Some(f) = &state.fault {
            return Err(f.clone());
        }
        if state.splines.is_empty() {
            return Err(HardwareError::NoTrajectory);
        }

        state.calls.trajectory_starts += 1;
        let now = Instant::now();
        state.advance(now);
        state.playback = Some(Playback {
            start: now,
            base_start: state.status.base,
        });

        Ok(())
    }

    fn stop_trajectory(&self) {
        let mut state = self.lock();
        state.calls.trajectory_stops += 1;
        state.advance(Instant::now());
        state.playback = None;
        state.splines.clear();
    }

    fn is_trajectory_executing(&self) -> bool {
        let mut state = self.lock();
        state.advance(Instant::now());
        state.playback.is_some()
    }
}

impl SimState {
    /// Apply the staged commands according to the motion model.
    fn apply_staged(&mut self) {
        let staged: Vec<(Actuator, f64)> = self.staged.drain().map(|(a, (d, _))| (a, d)).collect();
        let translation = self.staged_translation.take();
        let rotation = self.staged_rotation.take();
        let twist = self.staged_twist.take();

        if self.status.runstopped {
            trace!("Simulated robot is runstopped, discarding pushed commands");
            return;
        }

        if let Some(t) = twist {
            self.twist = t;
            self.base_target = None;
        }

        if self.motion == SimMotion::Frozen {
            return;
        }

        for (actuator, delta) in staged {
            let target = self.status.actuator(actuator).pos + delta;
            match self.motion {
                SimMotion::Instant => set_actuator(&mut self.status, actuator, target, 0.0),
                _ => {
                    self.targets.insert(actuator, target);
                }
            }
        }

        // Incremental base moves take the base out of velocity control
        if translation.is_some() || rotation.is_some() {
            self.twist = Twist::zero();

            let mut target = self.status.base;
            let d = translation.unwrap_or(0.0);
            target.x += d * target.theta.cos();
            target.y += d * target.theta.sin();
            target.theta += rotation.unwrap_or(0.0);

            match self.motion {
                SimMotion::Instant => {
                    self.status.base.x = target.x;
                    self.status.base.y = target.y;
                    self.status.base.theta = target.theta;
                    self.status.base.x_vel = 0.0;
                    self.status.base.theta_vel = 0.0;
                }
                _ => self.base_target = Some(target),
            }
        }
    }

    /// Move the simulation forward to `now`.
    fn advance(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        if self.status.runstopped || self.motion == SimMotion::Frozen {
            zero_velocities(&mut self.status);
            return;
        }

        if self.motion == SimMotion::Rate && dt > 0.0 {
            let targets: Vec<(Actuator, f64)> = self.targets.iter().map(|(a, t)| (*a, *t)).collect();
            for (actuator, target) in targets {
                let pos = self.status.actuator(actuator).pos;
                let step = actuator_speed(actuator) * dt;
                let new_pos = pos + (target - pos).max(-step).min(step);
                set_actuator(&mut self.status, actuator, new_pos, (new_pos - pos) / dt);
                if new_pos == target {
                    self.targets.remove(&actuator);
                }
            }

            if let Some(target) = self.base_target {
                let base = &mut self.status.base;

                let dx = target.x - base.x;
                let dy = target.y - base.y;
                let dist = (dx * dx + dy * dy).sqrt();
                let step = (BASE_SPEED_MPS * dt).min(dist);
                if dist > 0.0 {
                    base.x += dx / dist * step;
                    base.y += dy / dist * step;
                }
                base.x_vel = step / dt;

                let dtheta = target.theta - base.theta;
                let turn = dtheta.max(-BASE_RATE_RADPS * dt).min(BASE_RATE_RADPS * dt);
                base.theta += turn;
                base.theta_vel = turn / dt;

                if step == dist && turn == dtheta {
                    self.base_target = None;
                }
            }
        }

        if self.base_target.is_none() && dt > 0.0 {
            let base = &mut self.status.base;
            base.x += self.twist.linear_mps * base.theta.cos() * dt;
            base.y += self.twist.linear_mps * base.theta.sin() * dt;
            base.theta += self.twist.angular_radps * dt;
            base.x_vel = self.twist.linear_mps;
            base.theta_vel = self.twist.angular_radps;
        }

        self.advance_playback(now);
    }

    fn advance_playback(&mut self, now: Instant) {
        let (start, base_start) = match &self.playback {
            Some(p) => (p.start, p.base_start),
            None => return,
        };

        let t = now.saturating_duration_since(start).as_secs_f64();
        let mut end_time = 0.0f64;

        for (joint, spline) in self.splines.iter() {
            end_time = end_time.max(spline.end_time_s());
            let sample = spline.sample(t);

            match joint.actuator() {
                Some(actuator) => {
                    let pos = match actuator {
                        Actuator::Gripper => sample.position / FINGER_RAD_PER_PCT,
                        _ => sample.position,
                    };
                    set_actuator(&mut self.status, actuator, pos, sample.velocity);
                }
                None => {
                    // Base splines are relative to wherever the base was at the start
                    let d = sample.position - spline.sample(spline.start_time_s()).position;
                    self.status.base.x = base_start.x + d * base_start.theta.cos();
                    self.status.base.y = base_start.y + d * base_start.theta.sin();
                    self.status.base.x_vel = sample.velocity;
                }
            }
        }

        if t >= end_time {
            debug!("Simulated trajectory playback complete");
            self.playback = None;
            self.splines.clear();
            zero_velocities(&mut self.status);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn set_actuator(status: &mut RobotStatus, actuator: Actuator, pos: f64, vel: f64) {
    let s = match actuator {
        Actuator::HeadPan => &mut status.head_pan,
        Actuator::HeadTilt => &mut status.head_tilt,
        Actuator::WristYaw => &mut status.wrist_yaw,
        Actuator::Arm => &mut status.arm,
        Actuator::Lift => &mut status.lift,
        Actuator::Gripper => {
            status.gripper.pos_pct = pos;
            status.gripper.pos_rad = pos * FINGER_RAD_PER_PCT;
            status.gripper.vel = vel;
            return;
        }
    };
    s.pos = pos;
    s.vel = vel;
}

fn zero_velocities(status: &mut RobotStatus) {
    status.head_pan.vel = 0.0;
    status.head_tilt.vel = 0.0;
    status.wrist_yaw.vel = 0.0;
    status.gripper.vel = 0.0;
    status.arm.vel = 0.0;
    status.lift.vel = 0.0;
    status.base.x_vel = 0.0;
    status.base.theta_vel = 0.0;
}

fn actuator_speed(actuator: Actuator) -> f64 {
    match actuator {
        Actuator::HeadPan | Actuator::HeadTilt | Actuator::WristYaw => ROTARY_SPEED_RADPS,
        Actuator::Arm | Actuator::Lift => PRISMATIC_SPEED_MPS,
        Actuator::Gripper => GRIPPER_SPEED_PCTPS,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::traj_interp::Waypoint;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_instant_moves_on_push() {
        let sim = SimRobot::new(SimMotion::Instant);

        sim.move_by(Actuator::Lift, 0.4, MotionLimits::default());
        sim.move_by(Actuator::Lift, 0.1, MotionLimits::default());
        sim.translate_by(0.2, MotionLimits::default());
        assert_eq!(sim.peek_status().lift.pos, 0.0);

        sim.push_command().unwrap();
        let status = sim.get_status().unwrap();
        assert!((status.lift.pos - 0.5).abs() < 1e-12);
        assert!((status.base.x - 0.2).abs() < 1e-12);
        assert_eq!(sim.staged_move(Actuator::Lift), None);

        let calls = sim.calls();
        assert_eq!(calls.moves, 3);
        assert_eq!(calls.pushes, 1);
        assert_eq!(calls.status_reads, 1);
    }

    #[test]
    fn test_rate_motion_converges() {
        let sim = SimRobot::new(SimMotion::Rate);

        sim.move_by(Actuator::WristYaw, 0.05, MotionLimits::default());
        sim.push_command().unwrap();

        thread::sleep(Duration::from_millis(100));
        let status = sim.get_status().unwrap();
        assert!((status.wrist_yaw.pos - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_fault_and_runstop() {
        let sim = SimRobot::new(SimMotion::Instant);

        sim.set_fault(Some(HardwareError::CommsError(String::from("unplugged"))));
        assert!(sim.get_status().is_err());
        assert!(sim.push_command().is_err());
        sim.set_fault(None);

        sim.set_runstop(true);
        sim.move_by(Actuator::Arm, 0.2, MotionLimits::default());
        sim.push_command().unwrap();
        let status = sim.get_status().unwrap();
        assert!(status.runstopped);
        assert_eq!(status.arm.pos, 0.0);
    }

    #[test]
    fn test_playback_follows_spline() {
        let sim = SimRobot::new(SimMotion::Instant);
        let spline = JointSpline::new(vec![Waypoint::new(0.0, 0.0), Waypoint::new(0.05, 0.3)])
            .unwrap();

        assert_eq!(sim.start_trajectory(), Err(HardwareError::NoTrajectory));

        sim.set_trajectory(TrajJoint::Lift, spline).unwrap();
        sim.start_trajectory().unwrap();
        assert!(sim.is_trajectory_executing());

        thread::sleep(Duration::from_millis(80));
        assert!(!sim.is_trajectory_executing());
        assert!((sim.peek_status().lift.pos - 0.3).abs() < 1e-12);
    }
}
