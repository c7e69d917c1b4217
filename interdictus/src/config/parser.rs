//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;

use ini::Ini;

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::labels::LabelRules;

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [dataset] section
    if let Some(section) = ini.section(Some("dataset")) {
        if let Some(v) = section.get("path") {
            let v = v.trim();
            if !v.is_empty() {
                config.dataset.path = Some(expand_tilde(v));
            }
        }
    }

    // [analysis] section
    if let Some(section) = ini.section(Some("analysis")) {
        if let Some(v) = section.get("threads") {
            let threads: usize = v
                .trim()
                .parse()
                .map_err(|_| invalid("analysis", "threads", v, "must be a positive integer"))?;
            if threads == 0 {
                return Err(invalid("analysis", "threads", v, "must be at least 1"));
            }
            config.analysis.threads = threads;
        }
        if let Some(v) = section.get("layer_timeout") {
            config.analysis.layer_timeout_secs = v.trim().parse().map_err(|_| {
                invalid(
                    "analysis",
                    "layer_timeout",
                    v,
                    "must be a non-negative integer (seconds, 0 disables)",
                )
            })?;
        }
        if let Some(v) = section.get("report") {
            config.analysis.report = v
                .parse()
                .map_err(|_| invalid("analysis", "report", v, "must be 'layer' or 'feature'"))?;
        }
        if let Some(v) = section.get("ordering") {
            config.analysis.ordering = v.parse().map_err(|_| {
                invalid(
                    "analysis",
                    "ordering",
                    v,
                    "must be 'lexicographic' or 'registry_last'",
                )
            })?;
        }
    }

    // [labels] section
    if let Some(section) = ini.section(Some("labels")) {
        if let Some(v) = section.get("priority") {
            config.labels.rules = LabelRules::parse_priority(v)
                .map_err(|e| invalid("labels", "priority", v, e.to_string()))?;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = expand_tilde(v);
            }
        }
    }

    Ok(config)
}

pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
