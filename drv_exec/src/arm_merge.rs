//! # Telescoping arm joint merging
//!
//! The telescoping arm can be commanded either through its four physical segment joints or through
//! the single `wrist_extension` joint. Goals using the segments are converted to use
//! `wrist_extension` before execution.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use crate::goal_error::GoalError;
use comms_if::tc::{JointTrajectory, TrajectoryPoint};
use util::maths::mean;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Name of the merged arm joint.
pub const WRIST_EXTENSION: &str = "wrist_extension";

/// Names of the four physical arm segments.
pub const ARM_SEGMENTS: [&str; 4] = ["joint_arm_l0", "joint_arm_l1", "joint_arm_l2", "joint_arm_l3"];

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Replace the four arm segment joints of a trajectory with the `wrist_extension` joint.
///
/// Trajectories without segment joints are returned unchanged. The merged position of each point
/// is the sum of the segment positions, and the merged velocity and acceleration are the mean of
/// the segment values supplied for that point. Other joints keep their order and
/// `wrist_extension` is appended last.
pub fn merge_arm_joints(trajectory: JointTrajectory) -> Result<JointTrajectory, GoalError> {
    let seg_indexes: Vec<usize> = trajectory
        .joint_names
        .iter()
        .enumerate()
        .filter(|(_, n)| ARM_SEGMENTS.contains(&n.as_str()))
        .map(|(i, _)| i)
        .collect();

    if seg_indexes.is_empty() {
        return Ok(trajectory);
    }

    if trajectory.contains(WRIST_EXTENSION) {
        return Err(GoalError::invalid_joints(format!(
            "Received a command for the arm that includes both {} and the arm segment joints {:?}, \
            which are mutually exclusive",
            WRIST_EXTENSION, ARM_SEGMENTS
        )));
    }

    let all_present = ARM_SEGMENTS.iter().all(|s| trajectory.contains(s));
    if seg_indexes.len() != ARM_SEGMENTS.len() || !all_present {
        return Err(GoalError::invalid_joints(format!(
            "Commands with the arm segment joints must include all of {:?} exactly once, {} were given",
            ARM_SEGMENTS,
            seg_indexes.len()
        )));
    }

    if let Some((i, n)) = trajectory.find_length_mismatch() {
        return Err(GoalError::invalid_goal(format!(
            "Goal point with index {} has {} positions but should have {}",
            i,
            n,
            trajectory.joint_names.len()
        )));
    }

    let mut joint_names: Vec<String> = trajectory
        .joint_names
        .iter()
        .enumerate()
        .filter(|(i, _)| !seg_indexes.contains(i))
        .map(|(_, n)| n.clone())
        .collect();
    joint_names.push(WRIST_EXTENSION.to_string());

    let points = trajectory
        .points
        .iter()
        .map(|p| merge_point(p, &seg_indexes))
        .collect();

    Ok(JointTrajectory {
        joint_names,
        points,
    })
}

fn merge_point(point: &TrajectoryPoint, seg_indexes: &[usize]) -> TrajectoryPoint {
    let keep = |values: &[f64]| -> Vec<f64> {
        values
            .iter()
            .enumerate()
            .filter(|(i, _)| !seg_indexes.contains(i))
            .map(|(_, v)| *v)
            .collect()
    };

    let mut positions = keep(&point.positions);
    positions.push(seg_indexes.iter().map(|i| point.positions[*i]).sum());

    // Velocities and accelerations are optional per joint, so only the supplied ones are averaged
    // and kept joints without a value stay without one.
    let merge_optional = |values: &[Option<f64>]| -> Vec<Option<f64>> {
        let num_kept = point.positions.len() - seg_indexes.len();
        let mut out: Vec<Option<f64>> = values
            .iter()
            .enumerate()
            .filter(|(i, _)| !seg_indexes.contains(i))
            .map(|(_, v)| *v)
            .collect();
        out.resize(num_kept, None);

        let supplied: Vec<f64> = seg_indexes
            .iter()
            .filter_map(|i| values.get(*i).copied().flatten())
            .collect();
        out.push(mean(&supplied));

        while out.last() == Some(&None) {
            out.pop();
        }
        out
    };

    TrajectoryPoint {
        time_from_start_s: point.time_from_start_s,
        positions,
        velocities: merge_optional(&point.velocities),
        accelerations: merge_optional(&point.accelerations),
    }
}
