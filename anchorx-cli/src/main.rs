use anchorx_accel::BackendKind;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod config;
mod error;

use config::Config;
use error::{print_error_and_exit, CliError};

#[derive(Parser)]
#[command(name = "anchorx")]
#[command(about = "AnchorX - seed anchor chaining engine")]
#[command(version)]
#[command(long_about = "
AnchorX chains seed anchors into colinear chains with a minimap2-style
dynamic program. Scoring runs in software or on an accelerator.

Examples:
  anchorx demo --backend emulated
  anchorx chain --input anchors.tsv --output chains.tsv
  anchorx chain --input anchors.tsv --format json --min-score 60
  anchorx config --output anchorx.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of threads to use
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chain the built-in eight anchor example
    Demo {
        /// Scoring backend (reference, emulated, rocc)
        #[arg(long)]
        backend: Option<BackendKind>,
    },

    /// Chain grouped anchors from a TSV file
    Chain {
        /// Anchor file: group, ref_pos, query_pos, span, optional segment
        #[arg(short, long, required = true)]
        input: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Scoring backend (reference, emulated, rocc)
        #[arg(long)]
        backend: Option<BackendKind>,

        /// Minimum chain score
        #[arg(long)]
        min_score: Option<i32>,

        /// Minimum number of anchors per chain
        #[arg(long)]
        min_count: Option<i32>,
    },

    /// Print or write an example configuration
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    Tsv,
    Json,
}

impl OutputFormat {
    fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Tsv => "tsv",
            OutputFormat::Json => "json",
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_secs()
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.verbose, cli.quiet)?;

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // Set global thread count: CLI flag, then config
    let threads = cli.threads.unwrap_or(config.general.threads);
    if threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to set thread count")?;
    }

    match cli.command {
        Commands::Demo { backend } => {
            commands::demo::execute(&config, backend)?;
        }

        Commands::Chain {
            input,
            output,
            format,
            backend,
            min_score,
            min_count,
        } => {
            commands::chain::execute(
                &config,
                input,
                output,
                format.map(|f| f.as_str().to_string()),
                backend,
                min_score,
                min_count,
            )?;
        }

        Commands::Config { output } => {
            commands::config::execute(output)?;
        }
    }

    Ok(())
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        match err.downcast_ref::<CliError>() {
            Some(cli_err) => print_error_and_exit(cli_err),
            None => {
                eprintln!("Error: {:#}", err);
                std::process::exit(1);
            }
        }
    }
}
