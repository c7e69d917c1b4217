//! interdictus CLI - Command-line interface
//!
//! Checks boundary files against a restricted-zone dataset.
//!
//! Exit status: 0 when every file is CLEAR, 2 when any file is ALERT,
//! 3 when no file alerts but some layers could not be checked, 1 on errors.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use interdictus::analysis::LabelOrdering;

use commands::check::CheckArgs;
use commands::config::ConfigCommands;
use commands::layers::LayersArgs;

#[derive(Parser)]
#[command(name = "interdictus")]
#[command(version = interdictus::VERSION)]
#[command(about = "Check land boundaries against restricted-zone datasets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OrderingArg {
    /// Plain alphabetical order
    Lexicographic,
    /// Public forest registry labels after all others
    RegistryLast,
}

impl From<OrderingArg> for LabelOrdering {
    fn from(arg: OrderingArg) -> Self {
        match arg {
            OrderingArg::Lexicographic => LabelOrdering::Lexicographic,
            OrderingArg::RegistryLast => LabelOrdering::RegistryLast,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check boundary files (KML/KMZ) for overlaps with restricted zones
    Check {
        /// Boundary files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Restriction GeoPackage (overrides [dataset] path)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Report every intersecting feature pair with its overlap area
        #[arg(long)]
        detail: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Worker threads (overrides [analysis] threads)
        #[arg(long)]
        threads: Option<usize>,

        /// Label ordering (overrides [analysis] ordering)
        #[arg(long, value_enum)]
        ordering: Option<OrderingArg>,

        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },

    /// List the layers of the restriction dataset and their labels
    Layers {
        /// Restriction GeoPackage (overrides [dataset] path)
        #[arg(long)]
        dataset: Option<PathBuf>,

        /// Load every layer and report feature counts
        #[arg(long)]
        counts: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the label a raw layer identifier maps to
    Label {
        /// Raw layer identifiers
        #[arg(required = true)]
        raw: Vec<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check {
            files,
            dataset,
            detail,
            json,
            threads,
            ordering,
            debug,
        } => commands::check::run(CheckArgs {
            files,
            dataset,
            detail,
            json,
            threads,
            ordering: ordering.map(LabelOrdering::from),
            debug,
        })
        .map(|outcome| outcome.exit_code()),
        Commands::Layers {
            dataset,
            counts,
            json,
        } => commands::layers::run(LayersArgs {
            dataset,
            counts,
            json,
        })
        .map(|_| 0),
        Commands::Label { raw, json } => commands::label::run(&raw, json).map(|_| 0),
        Commands::Config { command } => commands::config::run(command).map(|_| 0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => e.exit(),
    }
}
