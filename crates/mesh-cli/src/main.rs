//! mesh-tetra: command-line host for tetrahedral meshing with Cleaver and
//! TetGen.
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=mesh_tetra=info` - Job and file logging
//! - `RUST_LOG=mesh_tetra::process=debug` - Mesher output and process lifecycle
//! - `RUST_LOG=mesh_tetra::timing=debug` - Performance timing
//! - `RUST_LOG=debug` - All debug output
//!
//! # Example
//!
//! ```bash
//! # Mesh regions 1 and 3 of a labelmap with Cleaver
//! mesh-tetra volume segmentation.nrrd -o tissue.vtk --labels 1,3
//!
//! # Mesh a closed surface with TetGen, streaming its output
//! mesh-tetra surface skull.ply -o skull.vtk --volume 2.5 --show-log
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use mesh_tetra::MesherSettings;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod output;

use commands::{info, locate, surface, volume};

/// mesh-tetra - Tetrahedral meshing through external mesh generators.
///
/// Turns segmentation labelmaps and closed surfaces into tetrahedral meshes
/// using Cleaver (volumetric) or TetGen (surface) and writes legacy VTK.
#[derive(Parser)]
#[command(name = "mesh-tetra")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Settings file (TOML) with mesher parameters and executable paths
    #[arg(long, global = true, env = "MESH_TETRA_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// Options shared by the meshing commands.
#[derive(Args, Clone)]
pub struct JobArgs {
    /// Keep the temporary working directory after the job
    #[arg(long)]
    pub keep_temp: bool,

    /// Base directory for temporary working directories
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Print mesher output while it runs
    #[arg(long)]
    pub show_log: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Mesh labelmap regions with Cleaver
    Volume {
        /// Input labelmap (NRRD)
        input: PathBuf,

        /// Output mesh (legacy VTK)
        #[arg(short, long)]
        output: PathBuf,

        /// Region labels to mesh (default: every label in the volume)
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<u16>>,

        /// Sizing field scale, larger values give coarser meshes
        #[arg(long)]
        feature_scaling: Option<f64>,

        /// Sampling rate of the input indicator functions
        #[arg(long)]
        sampling_rate: Option<f64>,

        /// Rate of change of the sizing field
        #[arg(long)]
        lipschitz: Option<f64>,

        /// Background margin, percent of each axis
        #[arg(long)]
        padding_percent: Option<u32>,

        /// Keep cells labeled as background
        #[arg(long)]
        keep_background: bool,

        /// Additional Cleaver arguments (split on whitespace)
        #[arg(long, allow_hyphen_values = true)]
        extra: Option<String>,

        /// Path to the cleaver-cli executable
        #[arg(long, env = "CLEAVER_PATH")]
        cleaver: Option<PathBuf>,

        #[command(flatten)]
        job: JobArgs,
    },

    /// Mesh a closed surface with TetGen
    Surface {
        /// Input surface (PLY) or labelmap (NRRD)
        input: PathBuf,

        /// Output mesh (legacy VTK)
        #[arg(short, long)]
        output: PathBuf,

        /// Region labels to mesh when the input is a labelmap
        #[arg(long, value_delimiter = ',')]
        labels: Option<Vec<u16>>,

        /// Maximum radius-edge ratio
        #[arg(long)]
        ratio: Option<f64>,

        /// Minimum dihedral angle in degrees
        #[arg(long)]
        angle: Option<f64>,

        /// Maximum tetrahedron volume
        #[arg(long)]
        volume: Option<f64>,

        /// Additional TetGen switches, appended to the quality switch
        #[arg(long, allow_hyphen_values = true)]
        extra: Option<String>,

        /// Path to the tetgen executable
        #[arg(long, env = "TETGEN_PATH")]
        tetgen: Option<PathBuf>,

        #[command(flatten)]
        job: JobArgs,
    },

    /// Show where the mesher executables are found
    Locate {
        /// Search relative to this directory instead of the executable's
        #[arg(long)]
        search_root: Option<PathBuf>,
    },

    /// Display statistics of a legacy VTK unstructured grid
    Info {
        /// Input mesh (legacy VTK)
        input: PathBuf,

        /// List every attribute array
        #[arg(long)]
        detailed: bool,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "mesh_tetra=info",
            2 => "mesh_tetra=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

impl Cli {
    /// Settings from `--config`, or defaults.
    pub fn settings(&self) -> Result<MesherSettings> {
        match &self.config {
            Some(path) => MesherSettings::load(path)
                .with_context(|| format!("Failed to load settings from {:?}", path)),
            None => Ok(MesherSettings::default()),
        }
    }
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Volume {
            input,
            output,
            labels,
            feature_scaling,
            sampling_rate,
            lipschitz,
            padding_percent,
            keep_background,
            extra,
            cleaver,
            job,
        } => volume::run(
            volume::VolumeArgs {
                input,
                output,
                labels: labels.as_deref(),
                feature_scaling: *feature_scaling,
                sampling_rate: *sampling_rate,
                lipschitz: *lipschitz,
                padding_percent: *padding_percent,
                keep_background: *keep_background,
                extra: extra.as_deref(),
                cleaver: cleaver.as_deref(),
                job,
            },
            &cli,
        ),
        Commands::Surface {
            input,
            output,
            labels,
            ratio,
            angle,
            volume,
            extra,
            tetgen,
            job,
        } => surface::run(
            surface::SurfaceArgs {
                input,
                output,
                labels: labels.as_deref(),
                ratio: *ratio,
                angle: *angle,
                volume: *volume,
                extra: extra.as_deref(),
                tetgen: tetgen.as_deref(),
                job,
            },
            &cli,
        ),
        Commands::Locate { search_root } => locate::run(search_root.as_deref(), &cli),
        Commands::Info { input, detailed } => info::run(input, *detailed, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(tetra_err) = e.downcast_ref::<mesh_tetra::TetraError>() {
                eprintln!("{}: {}", "Error".red().bold(), tetra_err);
                eprintln!("  {}: {}", "Code".cyan(), tetra_err.code());
                eprintln!(
                    "  {}: {}",
                    "Suggestion".green(),
                    tetra_err.recovery_suggestion()
                );
                if let Some(location) = tetra_err.location() {
                    eprintln!("  {}: {}", "Location".yellow(), location);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
