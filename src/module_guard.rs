//! Refuse to run next to a kernel driver that also drives the fan

use crate::errors::{PwmFanError, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Loaded module table, as read by `lsmod`
pub const PROC_MODULES: &str = "/proc/modules";

/// Fail if `module` appears in the module table at `modules_path`
pub fn check_module_not_loaded(modules_path: &Path, module: &str) -> Result<()> {
    let table = fs::read_to_string(modules_path).map_err(|e| PwmFanError::io(modules_path, e))?;

    let loaded = table
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == module);

    if loaded {
        return Err(PwmFanError::ModuleLoaded(module.to_string()));
    }
    debug!("{} kernel module not loaded", module);
    Ok(())
}
