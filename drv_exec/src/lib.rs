//! # Driver library.
//!
//! Motion command execution core of the Stretch driver. This library allows the executable, the
//! benches and other crates in the workspace to access the items defined inside the driver crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Arm merging - folds the four telescoping arm segments into the single wrist extension joint
pub mod arm_merge;

/// Backlash tracking - direction dependent calibration offsets of the head and the arm
pub mod backlash;

/// Command groups - one per actuator, each owning a disjoint set of joint names
pub mod cmd_groups;

/// Command worker - runs mode switches off the cycle thread
pub mod cmd_worker;

/// Driver - entry point for goals, mode switches, base velocity and the stop commands
pub mod driver;

/// Goal errors - failure code and message of a trajectory goal
pub mod goal_error;

/// Goal executor - point by point trajectory execution through the command groups
pub mod goal_exec;

/// Hardware interface - the capabilities consumed from the robot, and a simulated robot
pub mod hardware;

/// Joint states - calibrated state reported by the periodic cycle
pub mod joint_state;

/// Mode controller - the operating mode, its data and the stop flag behind one gate
pub mod mode_ctrl;

/// Driver parameters
pub mod params;

/// Script interpreter - timed command sequences for the executable
pub mod script;

/// Trajectory interpolator - continuous spline playback used in manipulation mode
pub mod traj_interp;
