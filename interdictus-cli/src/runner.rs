//! CLI runner for common setup and operations.
//!
//! Encapsulates configuration loading, logging initialization and dataset
//! resolution to reduce duplication across command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use interdictus::catalog::{open_dataset, CachedCatalog, LayerCatalog};
use interdictus::config::ConfigFile;
use interdictus::logging::{init_logging, split_log_path, LoggingGuard};
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
}

impl CliRunner {
    /// Create a new CLI runner with optional debug logging.
    ///
    /// Log events are mirrored to stderr only when stderr is not a terminal
    /// or debug mode is on, so interactive output stays readable.
    pub fn with_debug(debug_mode: bool) -> Result<Self, CliError> {
        let config = ConfigFile::load()?;

        let (log_dir, log_file) = split_log_path(&config.logging.file);
        let console = debug_mode || !atty::is(atty::Stream::Stderr);

        let logging_guard = init_logging(&log_dir, &log_file, console, debug_mode)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("interdictus v{}", interdictus::VERSION);
        info!(
            log_file = %self.logging_guard.log_path().display(),
            "interdictus CLI: {} command",
            command
        );
    }

    /// Dataset path from the command line, falling back to the config file.
    pub fn dataset_path(&self, override_path: Option<&Path>) -> Result<PathBuf, CliError> {
        override_path
            .map(Path::to_path_buf)
            .or_else(|| self.config.dataset.path.clone())
            .ok_or(CliError::NoDataset)
    }

    /// Open the restriction dataset (GeoPackage or shapefile directory)
    /// behind a layer cache.
    pub fn open_catalog(
        &self,
        override_path: Option<&Path>,
    ) -> Result<CachedCatalog<Arc<dyn LayerCatalog>>, CliError> {
        let path = self.dataset_path(override_path)?;
        let catalog = open_dataset(&path)?;
        info!(dataset = %path.display(), "Opened restriction dataset");
        Ok(CachedCatalog::new(catalog))
    }
}
