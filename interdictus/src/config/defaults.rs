//! Default values and constants for all configuration settings.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::analysis::{default_threads, LabelOrdering, DEFAULT_LAYER_TIMEOUT};
use crate::labels::LabelRules;
use crate::overlay::ReportMode;

/// Default per-layer time budget in seconds.
pub const DEFAULT_LAYER_TIMEOUT_SECS: u64 = DEFAULT_LAYER_TIMEOUT.as_secs();

/// Default log file name inside the config directory.
pub const DEFAULT_LOG_FILE_NAME: &str = "interdictus.log";

/// Default log file path (~/.interdictus/interdictus.log).
pub fn default_log_file() -> PathBuf {
    config_directory().join(DEFAULT_LOG_FILE_NAME)
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            layer_timeout_secs: DEFAULT_LAYER_TIMEOUT_SECS,
            report: ReportMode::default(),
            ordering: LabelOrdering::default(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: default_log_file(),
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            dataset: DatasetSettings::default(),
            analysis: AnalysisSettings::default(),
            labels: LabelSettings {
                rules: LabelRules::default(),
            },
            logging: LoggingSettings::default(),
        }
    }
}
