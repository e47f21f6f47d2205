//! Tributary CLI - Data lineage from the command line.
//!
//! Tributary stores column-level lineage asserted by SQL analyzers and
//! answers impact and origin questions over it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::export::ExportFormat;
use cli::Context;

/// Tributary: Data lineage catalog and traversal engine.
#[derive(Parser)]
#[command(name = "tributary")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Database file (overrides the configured database path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Configuration file (defaults to .tributary/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Ingest analyzer output (one object analysis or an array of them)
    Ingest {
        /// JSON file produced by an analyzer
        file: PathBuf,
    },

    /// Show everything downstream of a table or column
    Impact {
        /// `schema.object`, `schema.object.column` or `database.schema.object.column`
        target: String,

        /// Database, when the target does not name one
        #[arg(short = 'D', long)]
        database: Option<String>,

        /// Maximum number of hops to follow
        #[arg(short, long)]
        depth: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show where a table or column's value comes from
    Trace {
        /// `schema.object`, `schema.object.column` or `database.schema.object.column`
        target: String,

        /// Database, when the target does not name one
        #[arg(short = 'D', long)]
        database: Option<String>,

        /// Maximum number of hops to follow
        #[arg(short, long)]
        depth: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile the catalog with a live schema listing
    Sync {
        /// JSON array of live objects produced by a schema inspector
        file: PathBuf,
    },

    /// Delete all nodes, edges and runs
    Wipe {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show recent analysis runs
    Runs {
        /// Maximum number of runs
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Also print each run's warnings
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show catalog statistics
    Stats {
        /// Refresh query planner statistics first
        #[arg(long)]
        analyze: bool,

        /// Reclaim unused space in the database file first
        #[arg(long)]
        vacuum: bool,
    },

    /// Export the lineage graph
    Export {
        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Include deactivated nodes and edges
        #[arg(long)]
        include_inactive: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::new(cli.db, cli.config);

    // Run the appropriate command
    let result = match cli.command {
        Commands::Init { force } => cli::init::run(&ctx, force),
        Commands::Ingest { file } => cli::ingest::run(&ctx, &file),
        Commands::Impact {
            target,
            database,
            depth,
            json,
        } => cli::impact::run(&ctx, &target, database, depth, json),
        Commands::Trace {
            target,
            database,
            depth,
            json,
        } => cli::trace::run(&ctx, &target, database, depth, json),
        Commands::Sync { file } => cli::sync::run(&ctx, &file),
        Commands::Wipe { yes } => cli::wipe::run(&ctx, yes),
        Commands::Runs { limit, warnings } => cli::runs::run(&ctx, limit, warnings),
        Commands::Stats { analyze, vacuum } => cli::stats::run(&ctx, analyze, vacuum),
        Commands::Export {
            format,
            include_inactive,
            output,
        } => cli::export::run(&ctx, format, include_inactive, output.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            // Show cause chain for nested errors
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  {}: {cause}", "caused by".dimmed());
                source = std::error::Error::source(cause);
            }
            ExitCode::FAILURE
        }
    }
}
