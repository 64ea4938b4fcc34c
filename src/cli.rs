//! The command line interface for the diffusion engine.
use crate::diffusion::{DiffusionEngine, DiffusionResults};
use crate::log;
use crate::model::Model;
use crate::output::{create_output_directory, get_output_dir, write_diffusion_results};
use crate::settings::Settings;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// The command line interface for the diffusion engine.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Calculate technology diffusion for a model.
    Run {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Validate a model.
    Validate {
        /// The path to the model directory.
        model_dir: PathBuf,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { model_dir, opts } => handle_run_command(&model_dir, &opts, None),
            Self::Validate { model_dir } => handle_validate_command(&model_dir, None),
        }
    }
}

/// Parse CLI arguments and start the program
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Initialise the program logger, unless this has already been done
fn init_logger(settings: &Settings, log_file_path: Option<&Path>) -> Result<()> {
    if log::is_logger_initialised() {
        return Ok(());
    }

    log::init(settings.log_level.as_deref(), log_file_path)
        .context("Failed to initialise logging.")
}

/// Log the end-year service shares and any demand lost to regional capping
fn log_summary(model: &Model, results: &DiffusionResults) -> Result<()> {
    let end_year = model.parameters.end_year;
    for (end_use, end_use_diffusion) in &results.end_uses {
        for (technology, diffusion) in &end_use_diffusion.technologies {
            info!(
                "{end_use}/{technology}: {:.3} in {} -> {:.3} in {} ({})",
                diffusion.share_by,
                model.parameters.base_year,
                end_use_diffusion
                    .service_share(technology.0.as_ref(), end_year, None)?
                    .value(),
                end_year,
                diffusion.national.label()
            );
        }
    }

    let lost_demand = results.total_lost_demand();
    if lost_demand > f64::EPSILON {
        warn!("Total demand lost to regional capping: {lost_demand}");
    }

    Ok(())
}

/// Handle the `run` command.
pub fn handle_run_command(
    model_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    // Load program settings, if not provided
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    // Get path to output folder
    let pathbuf: PathBuf;
    let output_path = if let Some(p) = opts.output_dir.as_deref() {
        p
    } else {
        pathbuf = get_output_dir(model_path)?;
        &pathbuf
    };

    let overwrite = create_output_directory(output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    // Initialise program logger
    init_logger(&settings, Some(output_path))?;

    // Load the model to run
    let model = Model::from_path(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model_path.display());
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder was overwritten");
    }

    let results = DiffusionEngine::new(&model).run()?;
    log_summary(&model, &results)?;
    write_diffusion_results(output_path, &results)?;
    info!("Diffusion calculation complete!");

    Ok(())
}

/// Handle the `validate` command.
///
/// The switches are resolved and the trajectories fitted, but nothing is written.
pub fn handle_validate_command(model_path: &Path, settings: Option<Settings>) -> Result<()> {
    // Load program settings, if not provided
    let settings = if let Some(settings) = settings {
        settings
    } else {
        Settings::load().context("Failed to load settings.")?
    };

    // Initialise program logger (we won't save log files when running the validate command)
    init_logger(&settings, None)?;

    // Load/validate the model
    let model = Model::from_path(model_path).context("Failed to validate model.")?;
    DiffusionEngine::new(&model)
        .run()
        .context("Failed to validate model.")?;
    info!("Model validation successful!");

    Ok(())
}
