//! # Goal errors
//!
//! Every way a goal can fail carries a [`ResultCode`] and a human readable message, so that the
//! executors can propagate failures with `?` and turn them into a [`GoalResult`] at the end.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::tm::{GoalResult, ResultCode};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct GoalError {
    pub code: ResultCode,
    pub message: String,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GoalError {
    pub fn new<S: Into<String>>(code: ResultCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_goal<S: Into<String>>(message: S) -> Self {
        Self::new(ResultCode::InvalidGoal, message)
    }

    pub fn invalid_joints<S: Into<String>>(message: S) -> Self {
        Self::new(ResultCode::InvalidJoints, message)
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::new(ResultCode::GoalTimeout, message)
    }

    pub fn preempted<S: Into<String>>(message: S) -> Self {
        Self::new(ResultCode::Preempted, message)
    }

    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(ResultCode::UnknownError, message)
    }
}

impl From<GoalError> for GoalResult {
    fn from(e: GoalError) -> Self {
        GoalResult::new(e.code, e.message)
    }
}
