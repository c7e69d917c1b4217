//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use clap::Subcommand;
use interdictus::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration (defaults merged with the file)
    Show,

    /// Write a commented configuration file with default values
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => run_path(),
        ConfigCommands::Show => run_show(),
        ConfigCommands::Init { force } => run_init(force),
    }
}

fn run_path() -> Result<(), CliError> {
    let path = config_file_path();
    println!("{}", path.display());
    if !path.exists() {
        println!("(file does not exist; defaults are in effect)");
    }
    Ok(())
}

fn run_show() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let priority: Vec<&str> = config
        .labels
        .rules
        .order()
        .iter()
        .map(|kind| kind.name())
        .collect();

    println!("[dataset]");
    match &config.dataset.path {
        Some(path) => println!("path = {}", path.display()),
        None => println!("path = (not set)"),
    }
    println!();
    println!("[analysis]");
    println!("threads = {}", config.analysis.threads);
    match config.analysis.layer_timeout_secs {
        0 => println!("layer_timeout = 0 (disabled)"),
        secs => println!("layer_timeout = {}s", secs),
    }
    println!("report = {}", config.analysis.report);
    println!("ordering = {}", config.analysis.ordering);
    println!();
    println!("[labels]");
    println!("priority = {}", priority.join(", "));
    println!();
    println!("[logging]");
    println!("file = {}", config.logging.file.display());
    Ok(())
}

fn run_init(force: bool) -> Result<(), CliError> {
    if force {
        let path = config_file_path();
        ConfigFile::default().save_to(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let (path, created) = ConfigFile::ensure_exists()?;
    if created {
        println!("Wrote default configuration to {}", path.display());
    } else {
        println!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    Ok(())
}
