//! Command line interface definitions
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};

#[derive(Debug, Parser)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub(crate) command: Commands,

    #[command(flatten)]
    pub(crate) verbosity: Verbosity<InfoLevel>,

    /// Also write log messages (DEBUG and above) to this file
    #[clap(long, global = true)]
    pub(crate) log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Commands {
    /// Compute the daily fire fields and write the smoke emissions file
    Run(RunCli),
    /// Create an example configuration file
    TomlTemplate(TemplateCli),
    /// Print out the parsed configuration and the cycles it would process.
    Debug(DebugCli),
}

#[derive(Debug, Clone, Args)]
pub(crate) struct RunCli {
    /// Path to the TOML configuration file.
    pub(crate) config_file: PathBuf,

    /// Current cycle as YYYYMMDDHH. Overrides current_cycle in the
    /// configuration file.
    #[clap(short, long)]
    pub(crate) current_cycle: Option<String>,
}

/// Create an example configuration file
#[derive(Debug, Clone, Args)]
pub(crate) struct TemplateCli {
    /// Path to write the template to
    pub(crate) template_file: PathBuf,
}

/// Print out the parsed representation of a TOML configuration file
/// along with the cycle window it resolves to. Nothing is read from or
/// written to the data directories.
#[derive(Debug, Clone, Args)]
pub(crate) struct DebugCli {
    /// Path to the TOML configuration file.
    pub(crate) config_file: PathBuf,

    /// Current cycle as YYYYMMDDHH, as for the run subcommand.
    #[clap(short, long)]
    pub(crate) current_cycle: Option<String>,
}
