//! # Joint trajectory goals

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A trajectory over a set of named joints.
///
/// Every point must hold one position per joint name, in the same order as `joint_names`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JointTrajectory {
    pub joint_names: Vec<String>,
    pub points: Vec<TrajectoryPoint>,
}

/// A single waypoint of a [`JointTrajectory`].
///
/// Velocities and accelerations are optional per joint, and may be shorter than the positions.
/// They are aligned with the positions by index, so a joint with no entry (or a `null` entry)
/// simply has no velocity (or acceleration) demand.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TrajectoryPoint {
    /// Time of this point relative to the start of the trajectory.
    ///
    /// Units: seconds
    pub time_from_start_s: f64,

    pub positions: Vec<f64>,

    #[serde(default)]
    pub velocities: Vec<Option<f64>>,

    #[serde(default)]
    pub accelerations: Vec<Option<f64>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointTrajectory {
    /// Create an empty trajectory over the given joints.
    pub fn new<S: AsRef<str>>(joint_names: &[S]) -> Self {
        Self {
            joint_names: joint_names.iter().map(|s| s.as_ref().to_string()).collect(),
            points: Vec::new(),
        }
    }

    /// Builder style helper to append a point.
    pub fn with_point(mut self, point: TrajectoryPoint) -> Self {
        self.points.push(point);
        self
    }

    /// Index of the named joint, if it is part of this trajectory.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.joint_names.iter().position(|n| n == name)
    }

    /// True if the named joint is part of this trajectory.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Time offset of the last point, or zero for an empty trajectory.
    ///
    /// Units: seconds
    pub fn duration_s(&self) -> f64 {
        self.points
            .last()
            .map(|p| p.time_from_start_s)
            .unwrap_or(0.0)
    }

    /// Find the first point whose number of positions differs from the number of joints.
    ///
    /// Returns the index of the point and the number of positions it holds.
    pub fn find_length_mismatch(&self) -> Option<(usize, usize)> {
        self.points
            .iter()
            .enumerate()
            .find(|(_, p)| p.positions.len() != self.joint_names.len())
            .map(|(i, p)| (i, p.positions.len()))
    }

    /// Find the first name which appears more than once.
    pub fn find_duplicate_name(&self) -> Option<&str> {
        self.joint_names
            .iter()
            .enumerate()
            .find(|(i, n)| self.joint_names[..*i].contains(n))
            .map(|(_, n)| n.as_str())
    }
}

impl TrajectoryPoint {
    /// Create a point with positions only.
    pub fn new(time_from_start_s: f64, positions: Vec<f64>) -> Self {
        Self {
            time_from_start_s,
            positions,
            velocities: Vec::new(),
            accelerations: Vec::new(),
        }
    }

    /// Builder style helper to set the velocities, given either as values or as options.
    pub fn with_velocities<V: Into<Option<f64>>>(mut self, velocities: Vec<V>) -> Self {
        self.velocities = velocities.into_iter().map(Into::into).collect();
        self
    }

    /// Builder style helper to set the accelerations, given either as values or as options.
    pub fn with_accelerations<V: Into<Option<f64>>>(mut self, accelerations: Vec<V>) -> Self {
        self.accelerations = accelerations.into_iter().map(Into::into).collect();
        self
    }

    pub fn velocity(&self, index: usize) -> Option<f64> {
        self.velocities.get(index).copied().flatten()
    }

    pub fn acceleration(&self, index: usize) -> Option<f64> {
        self.accelerations.get(index).copied().flatten()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validation_helpers() {
        let traj = JointTrajectory::new(&["joint_lift", "joint_wrist_yaw"])
            .with_point(TrajectoryPoint::new(0.0, vec![0.5, 0.0]))
            .with_point(TrajectoryPoint::new(2.0, vec![0.6]));

        assert_eq!(traj.index_of("joint_wrist_yaw"), Some(1));
        assert!(!traj.contains("joint_head_pan"));
        assert_eq!(traj.duration_s(), 2.0);
        assert_eq!(traj.find_length_mismatch(), Some((1, 1)));
        assert_eq!(traj.find_duplicate_name(), None);

        let dup = JointTrajectory::new(&["joint_lift", "joint_head_pan", "joint_lift"]);
        assert_eq!(dup.find_duplicate_name(), Some("joint_lift"));
    }

    #[test]
    fn test_optional_fields_deserialise() {
        let point: TrajectoryPoint =
            serde_json::from_str(r#"{"time_from_start_s": 1.5, "positions": [0.1, 0.2]}"#)
                .unwrap();

        assert_eq!(point.velocity(0), None);
        assert_eq!(point.acceleration(1), None);

        let point = point.with_velocities(vec![0.3]);
        assert_eq!(point.velocity(0), Some(0.3));
        assert_eq!(point.velocity(1), None);

        let point: TrajectoryPoint = serde_json::from_str(
            r#"{"time_from_start_s": 1.5, "positions": [0.1, 0.2], "velocities": [null, 0.4]}"#,
        )
        .unwrap();
        assert_eq!(point.velocity(0), None);
        assert_eq!(point.velocity(1), Some(0.4));
    }
}
