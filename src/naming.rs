//! File and directory naming conventions shared by the upstream forecast
//! system, the raster interpolation step, and the forecast model.
use std::path::{Path, PathBuf};

use crate::cycle::Cycle;

/// Suffix common to every physics restart file.
pub const RESTART_SUFFIX: &str = "phy_data.nc";

/// Canonical restart snapshot name for a cycle, `{YYYYMMDD}.{HH}0000.phy_data.nc`.
pub fn restart_file_name(cycle: &Cycle) -> String {
    format!(
        "{}.{}0000.{RESTART_SUFFIX}",
        cycle.date_str(),
        cycle.hour_str()
    )
}

/// Directory holding the restart output written by the forecast started at `cycle`.
pub fn archive_restart_dir(archive_root: &Path, cycle: &Cycle) -> PathBuf {
    archive_root
        .join(cycle.to_string())
        .join("fcst_fv3lam")
        .join("RESTART")
}

/// Glob pattern for restart files valid at `valid` inside `restart_dir`.
///
/// The time token after the hour is not fixed, hence the wildcard.
pub fn restart_glob_pattern(restart_dir: &Path, valid: &Cycle) -> String {
    format!(
        "{}/{}.{}*.{RESTART_SUFFIX}",
        glob::Pattern::escape(&restart_dir.to_string_lossy()),
        valid.date_str(),
        valid.hour_str()
    )
}

/// Interpolated raster file name, `{prefix}{YYYYMMDDHH}00_{YYYYMMDDHH}00.nc`.
pub fn intp_file_name(prefix: &str, cycle: &Cycle) -> String {
    format!("{prefix}{cycle}00_{cycle}00.nc")
}

/// Output emissions file name. Takes the reference timestamp verbatim.
pub fn emiss_file_name(current: &str) -> String {
    format!("SMOKE_RRFS_data_{current}00.nc")
}
