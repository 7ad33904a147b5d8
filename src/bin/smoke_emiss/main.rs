use std::process::ExitCode;

use clap::Parser;
use error_stack::ResultExt;
use itertools::Itertools;
use rrfs_smoke::{config::Config, logging::init_logging, pipeline};

mod cli;

fn main() -> ExitCode {
    let clargs = cli::Cli::parse();
    init_logging(
        clargs.verbosity.log_level_filter(),
        clargs.log_file.as_deref(),
    );
    if let Err(e) = main_inner(clargs) {
        eprintln!("ERROR: {e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_inner(clargs: cli::Cli) -> error_stack::Result<(), CliError> {
    match clargs.command {
        cli::Commands::Run(run_cli) => run_driver(run_cli),
        cli::Commands::TomlTemplate(template_cli) => {
            Config::write_template_example(&template_cli.template_file).change_context_lazy(|| {
                CliError::context("Error writing the configuration template")
            })
        }
        cli::Commands::Debug(debug_cli) => debug_driver(debug_cli),
    }
}

/// Run the full pipeline for one forecast cycle.
fn run_driver(cli: cli::RunCli) -> error_stack::Result<(), CliError> {
    let config = load_config(&cli.config_file)?;
    let current = config
        .current(cli.current_cycle.as_deref())
        .change_context_lazy(|| CliError::context("Error determining the current cycle"))?;

    let summary = pipeline::run(&config, current).change_context_lazy(|| {
        CliError::context(format!("Error preparing smoke emissions for {current}"))
    })?;

    let unavailable = summary.gap_fill.unavailable_cycles();
    if !unavailable.is_empty() {
        log::warn!(
            "No restart file could be found or filled for: {}",
            unavailable.iter().join(", ")
        );
    }
    log::info!(
        "Done: {} raster files over {} cycles went into {}",
        summary.raster_files,
        summary.cycles.len(),
        summary.output_file.display()
    );
    Ok(())
}

fn debug_driver(cli: cli::DebugCli) -> error_stack::Result<(), CliError> {
    let config = load_config(&cli.config_file)?;
    println!("Configuration:\n\n{config:#?}");

    match config.current(cli.current_cycle.as_deref()) {
        Ok(current) => {
            let cycles = config.cycles_for(current).change_context_lazy(|| {
                CliError::context(format!("Error deriving the cycles for {current}"))
            })?;
            println!(
                "\nCurrent cycle {current} would process {} cycles: {}",
                cycles.len(),
                cycles.iter().join(", ")
            );
        }
        Err(_) => println!("\nNo current cycle given, cannot list the cycles to process"),
    }
    Ok(())
}

fn load_config(config_file: &std::path::Path) -> error_stack::Result<Config, CliError> {
    Config::load(config_file).change_context_lazy(|| {
        CliError::context(format!(
            "Error loading configuration file: {}",
            config_file.display()
        ))
    })
}

/// Program error type
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Wrapper type used to add information to an inner error.
    #[error("{0}")]
    Context(String),
}

impl CliError {
    fn context<S: ToString>(ctx: S) -> Self {
        Self::Context(ctx.to_string())
    }
}
