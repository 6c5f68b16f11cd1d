//! # Equipment Interface
//!
//! This module defines the interface structures exchanged with the robot hardware.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod robot;

pub use robot::*;
