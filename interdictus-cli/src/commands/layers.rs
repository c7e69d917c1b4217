//! Layers command - list the restriction layers of a dataset.

use std::path::PathBuf;

use serde::Serialize;

use interdictus::catalog::LayerCatalog;
use interdictus::labels::Classification;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the layers command.
#[derive(Default)]
pub struct LayersArgs {
    pub dataset: Option<PathBuf>,
    /// Load every layer and report feature counts.
    pub counts: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct LayerEntry {
    id: String,
    #[serde(flatten)]
    classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    features: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dropped: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the layers command.
pub fn run(args: LayersArgs) -> Result<(), CliError> {
    let runner = CliRunner::with_debug(false)?;
    runner.log_startup("layers");

    let catalog = runner.open_catalog(args.dataset.as_deref())?;
    let rules = runner.config().label_rules();

    let mut entries = Vec::new();
    for id in catalog.list_layers()? {
        let classification = rules.classify(&id);
        let mut entry = LayerEntry {
            id,
            classification,
            features: None,
            dropped: None,
            error: None,
        };
        if args.counts {
            match catalog.load_layer(&entry.id) {
                Ok(layer) => {
                    entry.features = Some(layer.len());
                    entry.dropped = Some(layer.dropped());
                }
                Err(e) => entry.error = Some(e.failure.to_string()),
            }
        }
        entries.push(entry);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{}", catalog.describe());
    println!();
    let width = entries
        .iter()
        .map(|e| e.id.chars().count())
        .max()
        .unwrap_or(0)
        .max("Layer".len());
    println!("{:<width$}  Label", "Layer", width = width);
    println!("{:-<width$}  -----", "", width = width);
    for entry in &entries {
        let mut line = format!(
            "{:<width$}  {}",
            entry.id,
            entry.classification.label,
            width = width
        );
        if let Some(features) = entry.features {
            line.push_str(&format!(
                "  [{} features, {} dropped]",
                features,
                entry.dropped.unwrap_or(0)
            ));
        }
        if let Some(error) = &entry.error {
            line.push_str(&format!("  [unreadable: {}]", error));
        }
        println!("{}", line);
    }
    println!();
    println!("{} layers", entries.len());

    Ok(())
}
