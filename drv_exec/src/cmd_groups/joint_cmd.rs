//! # Single joint command
//!
//! Book-keeping shared by every group: which commanded joint a group claimed, the target pulled
//! from the current point and the last tracking error.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use super::ExecUpdate;
use crate::goal_error::GoalError;
use comms_if::{eqpt::MotionLimits, tc::TrajectoryPoint};
use util::maths::bound;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct JointCommand {
    active: Option<ActiveJoint>,
}

#[derive(Debug, Clone)]
struct ActiveJoint {
    name: String,

    /// Index of the joint in the trajectory's joint names.
    index: usize,

    goal: Option<f64>,
    limits: MotionLimits,
    error: Option<f64>,
    success_reported: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointCommand {
    /// Claim `name` if it is one of the commanded names, dropping any previous claim.
    ///
    /// Returns true if the name was claimed.
    pub fn claim(&mut self, name: &str, commanded_names: &[String]) -> bool {
        self.active = commanded_names
            .iter()
            .position(|n| n == name)
            .map(|index| ActiveJoint {
                name: name.to_string(),
                index,
                goal: None,
                limits: MotionLimits::default(),
                error: None,
                success_reported: false,
            });

        self.active.is_some()
    }

    /// Claim the first of `names` which is commanded.
    pub fn claim_any(&mut self, names: &[&str], commanded_names: &[String]) -> bool {
        for name in names {
            if self.claim(name, commanded_names) {
                return true;
            }
        }
        false
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn num_valid(&self) -> usize {
        if self.is_active() {
            1
        } else {
            0
        }
    }

    /// Name of the claimed joint.
    pub fn name(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.name.as_str())
    }

    /// Pull the target of the claimed joint out of the point and bound it to `range`.
    ///
    /// Does nothing if no joint is claimed.
    pub fn set_goal(
        &mut self,
        point: &TrajectoryPoint,
        range: (f64, f64),
        fail_out_of_range: bool,
    ) -> Result<(), GoalError> {
        let active = match self.active.as_mut() {
            Some(a) => a,
            None => return Ok(()),
        };

        let goal_pos = point.positions.get(active.index).copied().ok_or_else(|| {
            GoalError::invalid_goal(format!(
                "Goal point has no position for {} (index {})",
                active.name, active.index
            ))
        })?;

        if !goal_pos.is_finite() {
            return Err(GoalError::invalid_goal(format!(
                "Received a non-finite goal for {}: {}",
                active.name, goal_pos
            )));
        }

        let bounded = bound(range, goal_pos, fail_out_of_range).ok_or_else(|| {
            GoalError::invalid_goal(format!(
                "Received goal point that is out of bounds. Range = {:?}, but goal point = {}.",
                range, goal_pos
            ))
        })?;

        active.goal = Some(bounded);
        active.limits = MotionLimits::new(
            point.velocity(active.index),
            point.acceleration(active.index),
        );
        active.error = None;
        active.success_reported = false;

        Ok(())
    }

    /// Target of the current point, once set.
    pub fn goal(&self) -> Option<f64> {
        self.active.as_ref().and_then(|a| a.goal)
    }

    /// Replace the target, used by groups that convert units or frames.
    pub fn set_goal_value(&mut self, goal: f64) {
        if let Some(a) = self.active.as_mut() {
            a.goal = Some(goal);
        }
    }

    pub fn limits(&self) -> MotionLimits {
        self.active
            .as_ref()
            .map(|a| a.limits)
            .unwrap_or_default()
    }

    pub fn set_error(&mut self, error: f64) {
        if let Some(a) = self.active.as_mut() {
            a.error = Some(error);
        }
    }

    /// True if nothing is claimed or the last error is within `acceptable`.
    pub fn reached(&self, acceptable: f64) -> bool {
        match &self.active {
            None => true,
            Some(a) => a.error.map(|e| e.abs() < acceptable).unwrap_or(false),
        }
    }

    /// Compute the error to the target from a measurement and report it.
    ///
    /// A non-finite measurement is fatal. `on_success` is called the first time the error falls
    /// within `acceptable`.
    pub fn track(
        &mut self,
        measured: f64,
        acceptable: f64,
        on_success: &mut dyn FnMut(&str),
    ) -> ExecUpdate {
        let active = match self.active.as_mut() {
            Some(a) => a,
            None => return ExecUpdate::Tracking(Vec::new()),
        };

        if !measured.is_finite() {
            return ExecUpdate::Fatal(format!(
                "Measured position of {} is not finite ({})",
                active.name, measured
            ));
        }

        let goal = match active.goal {
            Some(g) => g,
            None => return ExecUpdate::Fatal(format!("No goal set for {}", active.name)),
        };

        let error = goal - measured;
        active.error = Some(error);

        if error.abs() < acceptable && !active.success_reported {
            active.success_reported = true;
            on_success(&format!("{} reached its goal", active.name));
        }

        ExecUpdate::Tracking(vec![(active.name.clone(), error)])
    }

    /// Mark success as reported, for groups with their own completion rule.
    pub fn report_success(&mut self, on_success: &mut dyn FnMut(&str)) {
        if let Some(a) = self.active.as_mut() {
            if !a.success_reported {
                a.success_reported = true;
                on_success(&format!("{} reached its goal", a.name));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_claim_and_track() {
        let commanded = vec!["joint_lift".to_string(), "joint_wrist_yaw".to_string()];
        let mut cmd = JointCommand::default();

        assert!(!cmd.claim("joint_head_pan", &commanded));
        assert!(cmd.reached(0.1));

        assert!(cmd.claim("joint_wrist_yaw", &commanded));
        assert_eq!(cmd.num_valid(), 1);

        let point = TrajectoryPoint::new(0.0, vec![0.5, 1.0]).with_velocities(vec![0.0, 0.3]);
        cmd.set_goal(&point, (-2.0, 2.0), true).unwrap();
        assert_eq!(cmd.goal(), Some(1.0));
        assert_eq!(cmd.limits(), MotionLimits::new(Some(0.3), None));
        assert!(!cmd.reached(0.1));

        let mut successes = Vec::new();
        let update = cmd.track(0.95, 0.1, &mut |s| successes.push(s.to_string()));
        assert!(matches!(update, ExecUpdate::Tracking(ref e) if e.len() == 1));
        assert!(cmd.reached(0.1));

        // Success is only reported once
        cmd.track(0.96, 0.1, &mut |s| successes.push(s.to_string()));
        assert_eq!(successes.len(), 1);

        assert!(matches!(
            cmd.track(std::f64::NAN, 0.1, &mut |_| ()),
            ExecUpdate::Fatal(_)
        ));
    }
}
