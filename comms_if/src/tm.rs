//! # Telemetry module
//!
//! Feedback streamed while a trajectory goal executes, and the result it terminates with.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Progress of an executing goal.
///
/// `desired`, `actual` and `error` hold one position per entry in `joint_names`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Feedback {
    pub stamp: DateTime<Utc>,
    pub joint_names: Vec<String>,
    pub desired: FeedbackPoint,
    pub actual: FeedbackPoint,
    pub error: FeedbackPoint,
}

/// Positions of all commanded joints at one instant.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FeedbackPoint {
    /// Units: seconds
    pub time_from_start_s: f64,

    pub positions: Vec<f64>,
}

/// Final outcome of a goal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GoalResult {
    pub code: ResultCode,
    pub message: String,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Outcome codes of a goal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResultCode {
    /// All points were reached.
    Success,

    /// A point was malformed or out of range. No motion was issued for that point.
    InvalidGoal,

    /// The joint names were unknown, duplicated or mutually exclusive.
    InvalidJoints,

    /// A point was not reached within the per-point timeout.
    GoalTimeout,

    /// The goal was cancelled or the robot was stopped.
    Preempted,

    /// Any other fault, including hardware faults raised mid execution.
    UnknownError,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalResult {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self {
            code: ResultCode::Success,
            message: message.into(),
        }
    }

    pub fn new<S: Into<String>>(code: ResultCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success
    }
}

impl FeedbackPoint {
    /// An empty point at the given time.
    pub fn at(time_from_start_s: f64) -> Self {
        Self {
            time_from_start_s,
            positions: Vec::new(),
        }
    }
}

impl Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultCode::Success => write!(f, "SUCCESSFUL"),
            ResultCode::InvalidGoal => write!(f, "INVALID_GOAL"),
            ResultCode::InvalidJoints => write!(f, "INVALID_JOINTS"),
            ResultCode::GoalTimeout => write!(f, "GOAL_TIMEOUT"),
            ResultCode::Preempted => write!(f, "PREEMPTED"),
            ResultCode::UnknownError => write!(f, "UNKNOWN_ERROR"),
        }
    }
}

impl Display for GoalResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}
