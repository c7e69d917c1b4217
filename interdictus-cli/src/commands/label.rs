//! Label command - show how raw layer identifiers are named.

use interdictus::config::ConfigFile;

use crate::error::CliError;

/// Run the label command.
pub fn run(raw_ids: &[String], json: bool) -> Result<(), CliError> {
    let rules = ConfigFile::load()?.label_rules();
    let classified: Vec<_> = raw_ids.iter().map(|raw| rules.classify(raw)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&classified)?);
        return Ok(());
    }

    for (raw, classification) in raw_ids.iter().zip(&classified) {
        let rule = classification
            .category
            .map(|kind| kind.name())
            .unwrap_or("fallback");
        match &classification.region {
            Some(region) => println!(
                "{} -> {} [{}, region {}]",
                raw, classification.label, rule, region
            ),
            None => println!("{} -> {} [{}]", raw, classification.label, rule),
        }
    }
    Ok(())
}
