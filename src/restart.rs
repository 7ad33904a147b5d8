//! Hourly restart snapshots: finding which cycles already have one, and
//! filling the gaps from the previous cycle's restart output.
use std::path::{Path, PathBuf};

use error_stack::ResultExt;
use itertools::Itertools;

use crate::{cycle::Cycle, naming, nc_utils};

/// Variable holding the hourly wildfire potential in a restart file.
pub const HWP_VAR: &str = "rrfs_hwp_ave";

#[derive(Debug, thiserror::Error)]
pub enum RestartError {
    #[error("Error searching for restart files with pattern '{0}'")]
    BadPattern(String),
    #[error("An error occurred while {0}")]
    Context(String),
}

impl RestartError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}

/// Why a cycle's restart snapshot could not be filled from the archive.
/// These are expected outcomes, not run failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GapFillMiss {
    #[error("restart directory {} does not exist", .0.display())]
    SourceDirMissing(PathBuf),
    #[error("no restart file matching {0}")]
    SourceFileMissing(String),
    #[error("variable '{varname}' not found in {}", .path.display())]
    VariableMissing { path: PathBuf, varname: String },
}

/// Cycles split by whether a restart snapshot is present locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestartAvailability {
    pub available: Vec<Cycle>,
    pub missing: Vec<Cycle>,
}

/// Result of trying to fill missing snapshots from the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapFillOutcome {
    pub filled: Vec<Cycle>,
    pub unavailable: Vec<(Cycle, GapFillMiss)>,
}

impl GapFillOutcome {
    pub fn unavailable_cycles(&self) -> Vec<Cycle> {
        self.unavailable.iter().map(|(c, _)| *c).collect()
    }
}

/// Partition `cycles` by whether `hourly_dir` holds their restart snapshot.
///
/// Every input cycle lands in exactly one of the two lists, and both keep
/// the input order.
pub fn check_restart_files(hourly_dir: &Path, cycles: &[Cycle]) -> RestartAvailability {
    let (available, missing): (Vec<Cycle>, Vec<Cycle>) = cycles.iter().copied().partition(|c| {
        let restart_file = naming::restart_file_name(c);
        let present = hourly_dir.join(&restart_file).exists();
        if present {
            log::debug!("Restart file available: {restart_file}");
        } else {
            log::debug!("Restart file missing: {restart_file}");
        }
        present
    });

    log::info!(
        "Available restart files for: [{}]; missing for: [{}]",
        available.iter().join(", "),
        missing.iter().join(", ")
    );
    RestartAvailability { available, missing }
}

/// For each cycle in `missing`, copy the allow-listed variables out of the
/// restart file the previous cycle's forecast wrote for that valid time,
/// into a new snapshot in `hourly_dir`.
///
/// The new file gets the canonical restart name for the cycle, so that
/// later stages find it the same way as an upstream snapshot. Cycles whose
/// source directory, file or variables are absent are reported in
/// [`GapFillOutcome::unavailable`]; the remaining cycles are still
/// processed. Errors reading or writing an existing file stop the run.
pub fn copy_missing_restarts(
    archive_root: &Path,
    missing: &[Cycle],
    hourly_dir: &Path,
    allow_list: &[&str],
) -> error_stack::Result<GapFillOutcome, RestartError> {
    let mut outcome = GapFillOutcome::default();

    for cycle in missing {
        match fill_one(archive_root, cycle, hourly_dir, allow_list)? {
            Ok(target) => {
                log::info!("Restart file for {cycle} copied to {}", target.display());
                outcome.filled.push(*cycle);
            }
            Err(miss) => {
                log::warn!("Could not fill restart for {cycle}: {miss}");
                outcome.unavailable.push((*cycle, miss));
            }
        }
    }

    Ok(outcome)
}

/// The outer result carries fatal errors; the inner one an expected miss.
fn fill_one(
    archive_root: &Path,
    cycle: &Cycle,
    hourly_dir: &Path,
    allow_list: &[&str],
) -> error_stack::Result<Result<PathBuf, GapFillMiss>, RestartError> {
    let source_dir = naming::archive_restart_dir(archive_root, &cycle.previous_hour());
    if !source_dir.is_dir() {
        return Ok(Err(GapFillMiss::SourceDirMissing(source_dir)));
    }

    let pattern = naming::restart_glob_pattern(&source_dir, cycle);
    let source_path = match find_source_file(&pattern)? {
        Some(p) => p,
        None => return Ok(Err(GapFillMiss::SourceFileMissing(pattern))),
    };

    let src = netcdf::open(&source_path).change_context_lazy(|| {
        RestartError::context(format!("opening restart file {}", source_path.display()))
    })?;
    if let Some(varname) = allow_list.iter().find(|v| src.variable(v).is_none()) {
        return Ok(Err(GapFillMiss::VariableMissing {
            path: source_path,
            varname: varname.to_string(),
        }));
    }

    let target = hourly_dir.join(naming::restart_file_name(cycle));
    log::debug!(
        "Copying {} from {} to {}",
        allow_list.join(", "),
        source_path.display(),
        target.display()
    );

    // Only a complete snapshot may appear under the canonical name
    let partial = target.with_extension("nc.partial");
    if let Err(e) = write_snapshot(&src, &source_path, &partial, allow_list) {
        if partial.exists() {
            if let Err(rm_err) = std::fs::remove_file(&partial) {
                log::warn!("Could not remove {}: {rm_err}", partial.display());
            }
        }
        return Err(e.attach_printable(format!("while writing {}", target.display())));
    }
    std::fs::rename(&partial, &target).change_context_lazy(|| {
        RestartError::context(format!(
            "moving {} to {}",
            partial.display(),
            target.display()
        ))
    })?;

    Ok(Ok(target))
}

fn write_snapshot(
    src: &netcdf::File,
    source_path: &Path,
    out_path: &Path,
    allow_list: &[&str],
) -> error_stack::Result<(), RestartError> {
    let mut dst = netcdf::create(out_path).change_context_lazy(|| {
        RestartError::context(format!("creating restart file {}", out_path.display()))
    })?;
    for varname in allow_list {
        nc_utils::copy_variable(src, source_path, &mut dst, varname).change_context_lazy(
            || {
                RestartError::context(format!(
                    "copying '{varname}' from {}",
                    source_path.display()
                ))
            },
        )?;
    }
    Ok(())
}

fn find_source_file(pattern: &str) -> error_stack::Result<Option<PathBuf>, RestartError> {
    let matches = glob::glob(pattern)
        .change_context_lazy(|| RestartError::BadPattern(pattern.to_string()))?;

    let mut files = vec![];
    for entry in matches {
        let entry = entry.change_context_lazy(|| RestartError::BadPattern(pattern.to_string()))?;
        files.push(entry);
    }
    files.sort();

    if files.len() > 1 {
        log::warn!(
            "{} restart files match {pattern}, using {} and ignoring the rest",
            files.len(),
            files[0].display()
        );
    }
    Ok(files.into_iter().next())
}
