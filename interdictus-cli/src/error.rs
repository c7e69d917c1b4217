//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use interdictus::analysis::AnalysisError;
use interdictus::boundary::LoadError;
use interdictus::catalog::CatalogError;
use interdictus::config::ConfigFileError;

/// Exit status for a run that found restricted overlaps.
pub const EXIT_ALERT: i32 = 2;

/// Exit status for a run without overlaps in which some layers were skipped.
pub const EXIT_PARTIAL: i32 = 3;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// No restriction dataset configured or given
    NoDataset,
    /// Restriction dataset could not be opened or listed
    Catalog(CatalogError),
    /// Boundary file could not be loaded
    Boundary { path: PathBuf, error: LoadError },
    /// Analysis aborted
    Analysis(AnalysisError),
    /// Failed to render output
    Output(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::NoDataset => {
                eprintln!();
                eprintln!("Point interdictus at a restriction GeoPackage or shapefile folder, either:");
                eprintln!("  1. per run:   interdictus check --dataset <FILE.gpkg|DIR> <BOUNDARY>");
                eprintln!("  2. persisted: set [dataset] path in the config file");
                eprintln!(
                    "     ({})",
                    interdictus::config::config_file_path().display()
                );
            }
            CliError::Boundary { .. } => {
                eprintln!();
                eprintln!("Boundary files must be KML documents or KMZ archives containing one,");
                eprintln!("with at least one valid (non self-intersecting) polygon.");
            }
            CliError::Catalog(CatalogError::NotGeoPackage(_)) => {
                eprintln!();
                eprintln!("The restriction dataset must be an OGC GeoPackage (.gpkg)");
                eprintln!("or a directory of shapefiles (.shp).");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::NoDataset => write!(f, "No restriction dataset configured"),
            CliError::Catalog(e) => write!(f, "{}", e),
            CliError::Boundary { path, error } => write!(
                f,
                "Could not process the submitted file '{}': {}",
                path.display(),
                error
            ),
            CliError::Analysis(e) => write!(f, "{}", e),
            CliError::Output(msg) => write!(f, "Failed to write output: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Catalog(e) => Some(e),
            CliError::Boundary { error, .. } => Some(error),
            CliError::Analysis(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<CatalogError> for CliError {
    fn from(e: CatalogError) -> Self {
        CliError::Catalog(e)
    }
}

impl From<AnalysisError> for CliError {
    fn from(e: AnalysisError) -> Self {
        CliError::Analysis(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Output(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_error_names_file() {
        let err = CliError::Boundary {
            path: PathBuf::from("area.kml"),
            error: LoadError::NoGeometry,
        };
        let msg = err.to_string();
        assert!(msg.contains("area.kml"));
        assert!(msg.starts_with("Could not process the submitted file"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: CliError = ConfigFileError::InvalidValue {
            section: "analysis".to_string(),
            key: "threads".to_string(),
            value: "x".to_string(),
            reason: "must be a positive integer".to_string(),
        }
        .into();
        assert!(err.to_string().contains("analysis.threads"));
    }
}
