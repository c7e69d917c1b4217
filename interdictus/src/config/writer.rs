//! INI serialization logic for converting `ConfigFile` → INI string.
//!
//! Produces the commented INI representation written to `config.ini`.

use std::path::Path;

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string for saving.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let dataset_path = config
        .dataset
        .path
        .as_deref()
        .map(path_to_string)
        .unwrap_or_default();
    let priority = config
        .labels
        .rules
        .order()
        .iter()
        .map(|kind| kind.name())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"[dataset]
; Restriction dataset (GeoPackage). Provisioned outside interdictus.
; Example: path = ~/data/restricoes.gpkg
path = {}

[analysis]
; Worker threads used to process layers in parallel (default: number of CPUs)
threads = {}
; Per-layer time budget in seconds. A layer that exceeds it is reported as
; skipped. 0 disables the budget.
layer_timeout = {}
; Intersection detail:
;   layer   - one record per intersecting layer (fast, stops at first hit)
;   feature - one record per intersecting feature pair, with overlap area
report = {}
; Ordering of labels in the verdict:
;   lexicographic - plain alphabetical order
;   registry_last - public forest registry labels after all others
ordering = {}

[labels]
; First-match-wins order of the naming rules. Rules left out keep their
; default relative order after the listed ones.
; Rules: embargo_icmbio, settlement, quilombola, indigenous_land,
;        conservation_unit, public_forest_registry
priority = {}

[logging]
; Log file (cleared at the start of every run)
file = {}
"#,
        dataset_path,
        config.analysis.threads,
        config.analysis.layer_timeout_secs,
        config.analysis.report,
        config.analysis.ordering,
        priority,
        path_to_string(&config.logging.file),
    )
}

fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::settings::ConfigFile;
    use crate::analysis::LabelOrdering;
    use crate::labels::{LabelRules, RuleKind};
    use crate::overlay::ReportMode;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_saved_config_loads_back() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.dataset.path = Some(PathBuf::from("/data/restricoes.gpkg"));
        config.analysis.threads = 2;
        config.analysis.layer_timeout_secs = 0;
        config.analysis.report = ReportMode::Feature;
        config.analysis.ordering = LabelOrdering::RegistryLast;
        config.labels.rules =
            LabelRules::from_priority(&[RuleKind::PublicForestRegistry]).unwrap();
        config.logging.file = PathBuf::from("/tmp/interdictus-test.log");

        config.save_to(&config_path).unwrap();
        let loaded = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_written_file_is_commented() {
        let content = super::to_config_string(&ConfigFile::default());
        assert!(content.contains("[dataset]"));
        assert!(content.contains("; First-match-wins"));
        assert!(content.contains(
            "priority = embargo_icmbio, settlement, quilombola, indigenous_land, conservation_unit, public_forest_registry"
        ));
    }
}
