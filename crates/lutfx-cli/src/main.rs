//! lutfx - apply .cube color LUTs from the command line

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "lutfx")]
#[command(author, version, about = "Apply .cube color LUTs with cross-fade blending")]
#[command(long_about = "
Inspect .cube lookup tables and apply them to images.

Examples:
  lutfx info look.cube                      # Show LUT header and sample count
  lutfx apply shot.png -l look.cube -o graded.png
  lutfx apply shot.png -l look.cube -m 0.5 -o half.png
  lutfx identity -d 3 -s 33 -o identity.cube
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (repeat for more; RUST_LOG overrides)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Display LUT information
    #[command(visible_alias = "i")]
    Info(InfoArgs),

    /// Apply a LUT to a PNG image
    #[command(visible_alias = "a")]
    Apply(ApplyArgs),

    /// Write an identity LUT
    Identity(IdentityArgs),
}

#[derive(Args)]
struct InfoArgs {
    /// LUT file(s)
    #[arg(required = true)]
    input: Vec<PathBuf>,
}

#[derive(Args)]
struct ApplyArgs {
    /// Input image (PNG)
    input: PathBuf,

    /// Output image (PNG)
    #[arg(short, long)]
    output: PathBuf,

    /// LUT file (.cube)
    #[arg(short, long)]
    lut: PathBuf,

    /// Blend weight: 0 = original, 1 = fully graded
    #[arg(short, long, default_value = "1.0")]
    mix: f32,
}

#[derive(Clone, Copy, ValueEnum)]
enum DimensionArg {
    #[value(name = "1")]
    One,
    #[value(name = "3")]
    Three,
}

#[derive(Args)]
struct IdentityArgs {
    /// Output LUT file
    #[arg(short, long)]
    output: PathBuf,

    /// Table dimension
    #[arg(short, long, value_enum, default_value = "3")]
    dimension: DimensionArg,

    /// Grid size
    #[arg(short, long, default_value = "33")]
    size: usize,
}

fn init_logging(verbose: u8, log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::prelude::*;

    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_ref())?;

    // Configure thread pool
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Info(args) => commands::info::run(args),
        Commands::Apply(args) => commands::apply::run(args),
        Commands::Identity(args) => commands::identity::run(args),
    }
}
