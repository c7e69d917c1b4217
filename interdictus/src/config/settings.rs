//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;
use std::time::Duration;

use crate::analysis::{AnalysisConfig, LabelOrdering};
use crate::labels::LabelRules;
use crate::overlay::ReportMode;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub dataset: DatasetSettings,
    pub analysis: AnalysisSettings,
    pub labels: LabelSettings,
    pub logging: LoggingSettings,
}

/// Restriction dataset location.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetSettings {
    /// Path to the restriction GeoPackage. `None` when not configured.
    pub path: Option<PathBuf>,
}

/// Analysis tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSettings {
    /// Worker threads for the per-layer fan-out.
    pub threads: usize,
    /// Per-layer time budget in seconds, 0 disables it.
    pub layer_timeout_secs: u64,
    /// Per-layer or per-feature reporting.
    pub report: ReportMode,
    /// Ordering of hit labels in reports.
    pub ordering: LabelOrdering,
}

/// Layer naming.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelSettings {
    /// First-match-wins order of the naming rules.
    pub rules: LabelRules,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log file path.
    pub file: PathBuf,
}

impl ConfigFile {
    /// Core analysis configuration derived from these settings.
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig {
            threads: self.analysis.threads.max(1),
            layer_timeout: match self.analysis.layer_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            mode: self.analysis.report,
            ordering: self.analysis.ordering,
        }
    }

    /// Naming rules derived from these settings.
    pub fn label_rules(&self) -> LabelRules {
        self.labels.rules.clone()
    }
}
