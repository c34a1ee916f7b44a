//! Passage CLI - Command-line interface for Passage
//!
//! Runs barrier connectivity analyses on watershed files and inspects the
//! stored results.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "passage")]
#[command(author = "Passage Contributors")]
#[command(version)]
#[command(about = "Barrier connectivity and remediation priorities for stream networks", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Passage in the current directory
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Analyze a watershed file and store the results
    Analyze {
        /// Watershed JSON file
        input: PathBuf,

        /// Watershed id (defaults to the one in the file)
        #[arg(short, long)]
        watershed: Option<String>,

        /// Species to analyze, overriding the config (repeatable)
        #[arg(short, long)]
        species: Vec<String>,

        /// Number of top barriers to show per species
        #[arg(long, default_value = "10")]
        top: usize,

        /// Project directory holding .passage (defaults to current directory)
        #[arg(long, default_value = ".")]
        path: PathBuf,
    },

    /// Export stored results to JSON
    Export {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only export this species
        #[arg(short, long)]
        species: Option<String>,

        /// Project directory holding .passage (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show configuration and stored run reports
    Status {
        /// Path to check (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Analyze {
            input,
            watershed,
            species,
            top,
            path,
        } => commands::analyze(&path, &input, watershed, species, top).await,
        Commands::Export {
            output,
            species,
            path,
        } => commands::export(&path, output.as_deref(), species.as_deref()),
        Commands::Status { path } => commands::status(&path),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
