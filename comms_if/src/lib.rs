//! # Communications interface crate.
//!
//! Provides the interface types exchanged between the driver core and its callers: incoming
//! commands (trajectory goals, mode switches, base velocity, stops), outgoing goal feedback and
//! results, and the robot status snapshot read from the hardware.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Commands sent to the driver
pub mod tc;

/// Feedback and results produced by the driver
pub mod tm;

/// Status and demand definitions for equipment (the robot hardware)
pub mod eqpt;
