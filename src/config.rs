//! Run configuration, read from a TOML file.
//!
//! Directories, the grid shape and the conversion constants all come from
//! here. Only `[paths]`, `[raster]` and `[grid]` are required; variable
//! names and emission constants default to the operational values. The
//! cycles processed are either listed explicitly in `cycles` or derived as
//! the `window_hours` hours preceding the current cycle.
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};

use error_stack::ResultExt;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::EmissionConstants,
    cycle::Cycle,
    grid::{GridShape, StaticGridVars},
    raster::{RasterSource, DEFAULT_FRE_VAR, DEFAULT_FRP_VAR},
    restart::HWP_VAR,
};

pub const DEFAULT_WINDOW_HOURS: u32 = 24;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No current cycle given in the configuration or on the command line")]
    NoCurrentCycle,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("An error occurred while {0}")]
    Context(String),
}

impl ConfigError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}

/// Overall configuration structure used to (de)serialize the TOML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reference cycle (YYYYMMDDHH) of the forecast being prepared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_cycle: Option<String>,
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    /// Explicit cycles to process instead of the trailing window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycles: Option<Vec<Cycle>>,
    pub paths: PathsConfig,
    pub raster: RasterConfig,
    pub grid: GridConfig,
    #[serde(default)]
    pub emissions: EmissionConstants,
    #[serde(default)]
    pub variables: VariablesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of hourly restart snapshots (read, and written by gap filling)
    pub hourly_restart_dir: PathBuf,
    /// Root of the per-cycle forecast output holding RESTART directories
    pub restart_archive_dir: PathBuf,
    /// Directory of interpolated raster files; the emissions file is written here
    pub intp_dir: PathBuf,
    pub emission_factor_file: PathBuf,
    pub grid_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterConfig {
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridConfig {
    pub cols: usize,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VariablesConfig {
    pub hwp: String,
    pub frp: String,
    pub fre: String,
    pub emiss_factor: String,
    pub lat: String,
    pub lon: String,
    pub area: String,
    /// Variables copied out of a previous cycle's restart file when filling gaps
    pub restart_allow_list: Vec<String>,
}

impl Default for VariablesConfig {
    fn default() -> Self {
        Self {
            hwp: HWP_VAR.to_string(),
            frp: DEFAULT_FRP_VAR.to_string(),
            fre: DEFAULT_FRE_VAR.to_string(),
            emiss_factor: "emiss_factor".to_string(),
            lat: "grid_latt".to_string(),
            lon: "grid_lont".to_string(),
            area: "area".to_string(),
            restart_allow_list: vec![HWP_VAR.to_string()],
        }
    }
}

fn default_window_hours() -> u32 {
    DEFAULT_WINDOW_HOURS
}

impl Config {
    /// Load and validate a configuration file.
    pub fn load(toml_file: &Path) -> error_stack::Result<Self, ConfigError> {
        let mut f = std::fs::File::open(toml_file).change_context_lazy(|| {
            ConfigError::context(format!(
                "opening configuration file {}",
                toml_file.display()
            ))
        })?;
        let mut buf = String::new();
        f.read_to_string(&mut buf).change_context_lazy(|| {
            ConfigError::context(format!(
                "reading configuration file {}",
                toml_file.display()
            ))
        })?;
        let config: Config = toml::from_str(&buf).change_context_lazy(|| {
            ConfigError::context(format!(
                "parsing configuration file {}",
                toml_file.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> error_stack::Result<(), ConfigError> {
        if self.grid.cols == 0 || self.grid.rows == 0 {
            return Err(ConfigError::Invalid(format!(
                "grid must have at least one cell, got {} x {}",
                self.grid.cols, self.grid.rows
            ))
            .into());
        }
        if self.variables.restart_allow_list.is_empty() {
            return Err(ConfigError::Invalid(
                "variables.restart_allow_list must name at least one variable".to_string(),
            )
            .into());
        }
        if !self.variables.restart_allow_list.contains(&self.variables.hwp) {
            log::warn!(
                "The HWP variable '{}' is not in the restart allow list, gap-filled snapshots will not provide it",
                self.variables.hwp
            );
        }
        Ok(())
    }

    pub fn grid_shape(&self) -> GridShape {
        GridShape::new(self.grid.cols, self.grid.rows)
    }

    pub fn raster_source(&self) -> RasterSource {
        RasterSource {
            dir: self.paths.intp_dir.clone(),
            prefix: self.raster.prefix.clone(),
            frp_var: self.variables.frp.clone(),
            fre_var: self.variables.fre.clone(),
        }
    }

    pub fn static_grid_vars(&self) -> StaticGridVars<'_> {
        StaticGridVars {
            lat: &self.variables.lat,
            lon: &self.variables.lon,
            area: &self.variables.area,
            emiss_factor: &self.variables.emiss_factor,
        }
    }

    pub fn allow_list(&self) -> Vec<&str> {
        self.variables
            .restart_allow_list
            .iter()
            .map(|s| s.as_str())
            .collect()
    }

    /// The reference cycle string: `cli_current` if given, else `current_cycle`.
    pub fn current<'a>(
        &'a self,
        cli_current: Option<&'a str>,
    ) -> error_stack::Result<&'a str, ConfigError> {
        cli_current
            .or(self.current_cycle.as_deref())
            .ok_or_else(|| ConfigError::NoCurrentCycle.into())
    }

    /// Cycles to process: the explicit list if configured, otherwise the
    /// `window_hours` cycles preceding `current`.
    pub fn cycles_for(&self, current: &str) -> error_stack::Result<Vec<Cycle>, ConfigError> {
        if let Some(cycles) = &self.cycles {
            return Ok(cycles.clone());
        }

        let current: Cycle = current.parse().change_context_lazy(|| {
            ConfigError::context("deriving the cycle window from the current cycle")
        })?;
        Ok(Cycle::preceding_window(current, self.window_hours))
    }

    /// Create an example configuration file
    pub fn write_template_example(example_file: &Path) -> error_stack::Result<(), ConfigError> {
        let comments = [
            "This is an example configuration for smoke_emiss.",
            "",
            "[paths] points at the inputs and the working directories:",
            "  - hourly_restart_dir holds one {YYYYMMDD}.{HH}0000.phy_data.nc per cycle.",
            "    Missing snapshots are filled here from restart_archive_dir.",
            "  - restart_archive_dir has one {YYYYMMDDHH}/fcst_fv3lam/RESTART directory",
            "    per previous forecast.",
            "  - intp_dir holds the interpolated {prefix}{YYYYMMDDHH}00_{YYYYMMDDHH}00.nc",
            "    raster files. The SMOKE_RRFS_data file is written here too.",
            "",
            "The cycles processed are the window_hours hours before current_cycle, unless",
            "an explicit cycles = [...] list is given. current_cycle may also be passed on",
            "the command line, which takes precedence.",
            "",
            "[emissions] and [variables] are optional; the values shown are the defaults.",
        ];
        let template = Self::template_example();
        let mut f = std::fs::File::create(example_file).change_context_lazy(|| {
            ConfigError::context("opening the output file for the configuration template")
        })?;

        for line in comments {
            writeln!(f, "# {line}").change_context_lazy(|| {
                ConfigError::context(format!(
                    "writing to template file {}",
                    example_file.display()
                ))
            })?;
        }
        let s = toml::to_string_pretty(&template)
            .change_context_lazy(|| ConfigError::context("serializing the template"))?;
        write!(f, "{s}").change_context_lazy(|| {
            ConfigError::context(format!(
                "writing to template file {}",
                example_file.display()
            ))
        })?;

        Ok(())
    }

    /// Create an example configuration
    pub fn template_example() -> Self {
        Self {
            current_cycle: Some("2024060112".to_string()),
            window_hours: DEFAULT_WINDOW_HOURS,
            cycles: None,
            paths: PathsConfig {
                hourly_restart_dir: PathBuf::from("/path/to/hourly_restarts"),
                restart_archive_dir: PathBuf::from("/path/to/nwges"),
                intp_dir: PathBuf::from("/path/to/intp"),
                emission_factor_file: PathBuf::from("/path/to/veg_map.nc"),
                grid_file: PathBuf::from("/path/to/grid_in.nc"),
            },
            raster: RasterConfig {
                prefix: "RRFS_CONUS_3km_intp_".to_string(),
            },
            grid: GridConfig {
                cols: 1092,
                rows: 1820,
            },
            emissions: EmissionConstants::default(),
            variables: VariablesConfig::default(),
        }
    }
}
