//! # Driver script interpreter
//!
//! A script is a JSON array of timed commands, each executed once the session has been running for
//! its execution time:
//!
//! ```json
//! [
//!     {"exec_time_s": 0.5, "cmd": {"type": "switch_mode", "mode": "position"}},
//!     {"exec_time_s": 1.0, "cmd": {"type": "goal", "trajectory": { ... }}}
//! ]
//! ```

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use thiserror::Error;

// Internal
use comms_if::tc::{DriverCmd, TcParseError, TimedCmd};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A script interpreter.
///
/// After loading a script use [`ScriptInterpreter::get_pending`] every cycle to acquire the
/// commands that need executing.
pub struct ScriptInterpreter {
    cmds: VecDeque<TimedCmd>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0}")]
    ScriptNotFound(String),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script contains no commands")]
    ScriptEmpty,

    #[error("The script is invalid: {0}")]
    InvalidCmd(TcParseError),
}

#[derive(Debug, PartialEq)]
pub enum PendingCmds {
    None,
    Some(Vec<DriverCmd>),
    EndOfScript,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ScriptInterpreter {
    /// Load the script at the given path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {
        let path = script_path.as_ref();

        if !path.exists() {
            return Err(ScriptError::ScriptNotFound(path.display().to_string()));
        }

        let script = fs::read_to_string(path).map_err(ScriptError::ScriptLoadError)?;

        Self::from_json(&script)
    }

    /// Build an interpreter from the script's contents.
    pub fn from_json(script: &str) -> Result<Self, ScriptError> {
        let cmds = TimedCmd::list_from_json(script).map_err(ScriptError::InvalidCmd)?;

        if cmds.is_empty() {
            return Err(ScriptError::ScriptEmpty);
        }

        Ok(Self { cmds: cmds.into() })
    }

    /// Pop every command whose execution time has passed.
    pub fn get_pending(&mut self, elapsed_s: f64) -> PendingCmds {
        if self.cmds.is_empty() {
            return PendingCmds::EndOfScript;
        }

        let mut pending = Vec::new();

        while let Some(c) = self.cmds.front() {
            if c.exec_time_s > elapsed_s {
                break;
            }
            if let Some(c) = self.cmds.pop_front() {
                pending.push(c.cmd);
            }
        }

        if pending.is_empty() {
            PendingCmds::None
        } else {
            PendingCmds::Some(pending)
        }
    }

    /// Number of commands left to execute.
    pub fn get_num_cmds(&self) -> usize {
        self.cmds.len()
    }

    /// Execution time of the last command.
    ///
    /// Units: seconds
    pub fn get_duration(&self) -> f64 {
        self.cmds.back().map(|c| c.exec_time_s).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pending_in_time_order() {
        let mut si = ScriptInterpreter::from_json(
            r#"[
                {"exec_time_s": 1.0, "cmd": {"type": "stop"}},
                {"exec_time_s": 0.2, "cmd": {"type": "switch_mode", "mode": "navigation"}},
                {"exec_time_s": 0.5, "cmd": {"type": "twist", "linear_mps": 0.1, "angular_radps": 0.0}}
            ]"#,
        )
        .unwrap();

        assert_eq!(si.get_num_cmds(), 3);
        assert_eq!(si.get_duration(), 1.0);

        assert_eq!(si.get_pending(0.1), PendingCmds::None);

        match si.get_pending(0.6) {
            PendingCmds::Some(cmds) => {
                assert_eq!(cmds.len(), 2);
                assert!(matches!(cmds[0], DriverCmd::SwitchMode { .. }));
                assert!(matches!(cmds[1], DriverCmd::Twist { .. }));
            }
            p => panic!("Expected two pending commands, got {:?}", p),
        }

        assert_eq!(si.get_pending(1.0), PendingCmds::Some(vec![DriverCmd::Stop]));
        assert_eq!(si.get_pending(2.0), PendingCmds::EndOfScript);
    }

    #[test]
    fn test_bad_scripts() {
        assert!(matches!(
            ScriptInterpreter::from_json("[]"),
            Err(ScriptError::ScriptEmpty)
        ));
        assert!(matches!(
            ScriptInterpreter::from_json("not json"),
            Err(ScriptError::InvalidCmd(_))
        ));
        assert!(matches!(
            ScriptInterpreter::new("/does/not/exist.json"),
            Err(ScriptError::ScriptNotFound(_))
        ));
    }
}
