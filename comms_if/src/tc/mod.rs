//! # Telecommand module
//!
//! This module provides the commands which can be sent to the driver: trajectory goals, mode
//! switches, base velocity commands and stops.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod mode;
pub mod traj;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Internal
pub use mode::{Mode, ModeResponse, Twist};
pub use traj::{JointTrajectory, TrajectoryPoint};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command scheduled to be executed at a given time after the start of a script.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimedCmd {
    /// Units: seconds
    pub exec_time_s: f64,

    pub cmd: DriverCmd,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A command to the driver.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverCmd {
    /// Switch the operating mode.
    SwitchMode { mode: Mode },

    /// Execute a trajectory. Any goal still executing is preempted.
    Goal { trajectory: JointTrajectory },

    /// Drive the base at the given velocity (navigation mode only).
    Twist { linear_mps: f64, angular_radps: f64 },

    /// Stop all actuators and preempt the executing goal.
    Stop,

    /// Engage or release the runstop.
    Runstop { enable: bool },
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("Command contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Command at index {0} has an invalid execution time ({1})")]
    InvalidExecTime(usize, f64),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl TimedCmd {
    /// Parse a list of timed commands from a JSON array.
    ///
    /// Execution times must be finite and non-negative. The commands are returned sorted by
    /// execution time, commands with equal times keep their order.
    pub fn list_from_json(json_str: &str) -> Result<Vec<Self>, TcParseError> {
        let mut cmds: Vec<TimedCmd> =
            serde_json::from_str(json_str).map_err(TcParseError::InvalidJson)?;

        if let Some((i, c)) = cmds
            .iter()
            .enumerate()
            .find(|(_, c)| !c.exec_time_s.is_finite() || c.exec_time_s < 0.0)
        {
            return Err(TcParseError::InvalidExecTime(i, c.exec_time_s));
        }

        cmds.sort_by(|a, b| {
            a.exec_time_s
                .partial_cmp(&b.exec_time_s)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(cmds)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_cmds() {
        let cmds = TimedCmd::list_from_json(
            r#"[
                {"exec_time_s": 0.0, "cmd": {"type": "switch_mode", "mode": "manipulation"}},
                {"exec_time_s": 0.0, "cmd": {"type": "runstop", "enable": true}}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            cmds[0].cmd,
            DriverCmd::SwitchMode {
                mode: Mode::Manipulation
            }
        );
        assert_eq!(cmds[1].cmd, DriverCmd::Runstop { enable: true });

        assert!(matches!(
            TimedCmd::list_from_json(r#"[{"exec_time_s": 0.0, "cmd": {"type": "dance"}}]"#),
            Err(TcParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_timed_list() {
        let cmds = TimedCmd::list_from_json(
            r#"[
                {"exec_time_s": 2.0, "cmd": {"type": "stop"}},
                {"exec_time_s": 0.5, "cmd": {"type": "goal", "trajectory": {
                    "joint_names": ["joint_lift"],
                    "points": [{"time_from_start_s": 0.0, "positions": [0.6]}]
                }}}
            ]"#,
        )
        .unwrap();

        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].exec_time_s, 0.5);
        assert!(matches!(cmds[0].cmd, DriverCmd::Goal { .. }));
        assert_eq!(cmds[1].cmd, DriverCmd::Stop);

        assert!(matches!(
            TimedCmd::list_from_json(r#"[{"exec_time_s": -1.0, "cmd": {"type": "stop"}}]"#),
            Err(TcParseError::InvalidExecTime(0, _))
        ));
    }
}
