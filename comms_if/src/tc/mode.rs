//! # Operating modes and base velocity commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt::Display;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Response to a mode switch request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModeResponse {
    pub success: bool,
    pub message: String,
}

/// Velocity command for the mobile base, only accepted in navigation mode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Twist {
    /// Units: meters/second
    pub linear_mps: f64,

    /// Units: radians/second
    pub angular_radps: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Operating mode of the driver.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Base translation and rotation use incremental position control, executed one after the
    /// other.
    Position,

    /// Base is velocity controlled from twist commands.
    Navigation,

    /// Base translation is exposed as a virtual prismatic joint relative to the pose the base had
    /// on entering this mode. Trajectories are played back with continuous interpolation.
    Manipulation,

    /// The robot is homing its joints.
    Calibration,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ModeResponse {
    pub fn ok<S: Into<String>>(message: S) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl Twist {
    pub fn new(linear_mps: f64, angular_radps: f64) -> Self {
        Self {
            linear_mps,
            angular_radps,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Position => write!(f, "position"),
            Mode::Navigation => write!(f, "navigation"),
            Mode::Manipulation => write!(f, "manipulation"),
            Mode::Calibration => write!(f, "calibration"),
        }
    }
}
