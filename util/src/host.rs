//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the root of the driver software checkout.
pub const DRV_ROOT_ENV_VAR: &str = "STRETCH_DRV_ROOT";

/// Get the root directory of the driver software.
///
/// Parameter files and session directories are placed relative to this root.
pub fn get_drv_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(DRV_ROOT_ENV_VAR).map(PathBuf::from)
}
