//! Restriction layer naming.
//!
//! Dataset layers carry terse internal identifiers such as
//! `embargos_icmbio_pa` or `cnfp_2020_am`. [`LabelRules::classify`] maps
//! them to the category label shown to users, extracting a trailing
//! two-letter region code where one is present.
//!
//! Rules are tried in a fixed priority order and the first match wins. The
//! order is data, not code: [`LabelRules::from_priority`] builds it from the
//! `[labels] priority` configuration key.
//!
//! # Example
//!
//! ```
//! use interdictus::labels::{normalize, LabelRules};
//!
//! assert_eq!(normalize("embargos_icmbio_pa").as_str(), "Embargoed Area (ICMBio)");
//! assert_eq!(
//!     normalize("cnfp-2020--am").as_str(),
//!     "National Public Forest Registry (AM)"
//! );
//!
//! let c = LabelRules::default().classify("terra_indigena_xx");
//! assert_eq!(c.label.as_str(), "Indigenous Land");
//! assert_eq!(c.region.as_deref(), Some("XX"));
//! ```

mod key;

pub use key::{fold_key, LayerKey};

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub const EMBARGO_ICMBIO: &str = "Embargoed Area (ICMBio)";
pub const RURAL_SETTLEMENT: &str = "Rural Settlement";
pub const QUILOMBOLA_TERRITORY: &str = "Quilombola Territory";
pub const INDIGENOUS_LAND: &str = "Indigenous Land";
pub const FEDERAL_CONSERVATION_UNIT: &str = "Federal Conservation Unit";
pub const FEDERAL_CONSERVATION_UNIT_LIMIT: &str = "Federal Conservation Unit (Boundary Limit)";
pub const PUBLIC_FOREST_REGISTRY: &str = "National Public Forest Registry";

/// Human-facing name of a restriction category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalLabel(String);

impl CanonicalLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this label names a public forest registry layer.
    pub fn is_public_forest_registry(&self) -> bool {
        self.0.starts_with(PUBLIC_FOREST_REGISTRY)
    }
}

impl fmt::Display for CanonicalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl AsRef<str> for CanonicalLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One naming rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Embargoed areas published by ICMBio.
    EmbargoIcmbio,
    /// Rural settlements (assentamentos).
    Settlement,
    /// Quilombola territories.
    Quilombola,
    /// Indigenous lands.
    IndigenousLand,
    /// Federal conservation units and their boundary strips.
    ConservationUnit,
    /// National public forest registry (CNFP).
    PublicForestRegistry,
}

impl RuleKind {
    /// All rules in their default priority order.
    pub const DEFAULT_ORDER: [RuleKind; 6] = [
        RuleKind::EmbargoIcmbio,
        RuleKind::Settlement,
        RuleKind::Quilombola,
        RuleKind::IndigenousLand,
        RuleKind::ConservationUnit,
        RuleKind::PublicForestRegistry,
    ];

    /// Configuration name of the rule.
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::EmbargoIcmbio => "embargo_icmbio",
            RuleKind::Settlement => "settlement",
            RuleKind::Quilombola => "quilombola",
            RuleKind::IndigenousLand => "indigenous_land",
            RuleKind::ConservationUnit => "conservation_unit",
            RuleKind::PublicForestRegistry => "public_forest_registry",
        }
    }

    /// Try this rule against a folded key. Returns the label on a match.
    fn apply(&self, key: &LayerKey) -> Option<String> {
        match self {
            RuleKind::EmbargoIcmbio => (key.contains("embargo") && key.contains("icmbio"))
                .then(|| EMBARGO_ICMBIO.to_string()),
            RuleKind::Settlement => key
                .contains("assentamento")
                .then(|| RURAL_SETTLEMENT.to_string()),
            RuleKind::Quilombola => key
                .contains("quilombo")
                .then(|| QUILOMBOLA_TERRITORY.to_string()),
            RuleKind::IndigenousLand => {
                let matched = key.has_token("ti")
                    || key.has_token("tis")
                    || key.contains("indigena")
                    || key.contains("indigenous");
                matched.then(|| INDIGENOUS_LAND.to_string())
            }
            RuleKind::ConservationUnit => {
                let unit = key.has_token_prefix("uc") || key.contains("conservacao");
                let federal = key.contains("federa");
                let limit = key.contains("limite");
                if unit && federal {
                    Some(if limit {
                        FEDERAL_CONSERVATION_UNIT_LIMIT.to_string()
                    } else {
                        FEDERAL_CONSERVATION_UNIT.to_string()
                    })
                } else if limit {
                    Some(FEDERAL_CONSERVATION_UNIT_LIMIT.to_string())
                } else {
                    None
                }
            }
            RuleKind::PublicForestRegistry => key.contains("cnfp").then(|| match key.region() {
                Some(region) => format!("{} ({})", PUBLIC_FOREST_REGISTRY, region),
                None => PUBLIC_FOREST_REGISTRY.to_string(),
            }),
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuleKind {
    type Err = LabelRulesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        RuleKind::DEFAULT_ORDER
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| LabelRulesError::UnknownRule(s.trim().to_string()))
    }
}

/// Errors building a rule order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelRulesError {
    #[error("Unknown label rule '{0}' (expected one of: embargo_icmbio, settlement, quilombola, indigenous_land, conservation_unit, public_forest_registry)")]
    UnknownRule(String),

    #[error("Label rule '{0}' is listed more than once")]
    DuplicateRule(String),
}

/// Result of classifying a raw layer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Rule that matched, or `None` when the fallback label was used.
    pub category: Option<RuleKind>,
    /// Trailing two-letter region code, uppercased.
    pub region: Option<String>,
    /// Display label.
    pub label: CanonicalLabel,
}

/// Ordered naming rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRules {
    order: Vec<RuleKind>,
}

impl Default for LabelRules {
    fn default() -> Self {
        Self {
            order: RuleKind::DEFAULT_ORDER.to_vec(),
        }
    }
}

impl LabelRules {
    /// Build a rule order from a priority list.
    ///
    /// Listed rules come first in the given order; rules not listed keep
    /// their default relative order after them.
    pub fn from_priority(priority: &[RuleKind]) -> Result<Self, LabelRulesError> {
        let mut order = Vec::with_capacity(RuleKind::DEFAULT_ORDER.len());
        for kind in priority {
            if order.contains(kind) {
                return Err(LabelRulesError::DuplicateRule(kind.name().to_string()));
            }
            order.push(*kind);
        }
        for kind in RuleKind::DEFAULT_ORDER {
            if !order.contains(&kind) {
                order.push(kind);
            }
        }
        Ok(Self { order })
    }

    /// Parse a comma-separated priority list such as
    /// `"quilombola, embargo_icmbio"`. An empty string yields the default order.
    pub fn parse_priority(list: &str) -> Result<Self, LabelRulesError> {
        let kinds = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(RuleKind::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_priority(&kinds)
    }

    /// The effective rule order.
    pub fn order(&self) -> &[RuleKind] {
        &self.order
    }

    /// Classify a raw layer identifier.
    pub fn classify(&self, raw_id: &str) -> Classification {
        let key = LayerKey::new(raw_id);
        let region = key.region();

        for kind in &self.order {
            if let Some(label) = kind.apply(&key) {
                return Classification {
                    category: Some(*kind),
                    region,
                    label: CanonicalLabel(label),
                };
            }
        }

        Classification {
            category: None,
            region,
            label: CanonicalLabel(title_case(raw_id)),
        }
    }

    /// Canonical label for a raw layer identifier.
    pub fn normalize(&self, raw_id: &str) -> CanonicalLabel {
        self.classify(raw_id).label
    }
}

/// Normalize with the default rule order.
pub fn normalize(raw_id: &str) -> CanonicalLabel {
    LabelRules::default().normalize(raw_id)
}

/// Split on separators and capitalise each word.
fn title_case(raw_id: &str) -> String {
    raw_id
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embargo_icmbio() {
        assert_eq!(normalize("embargos_icmbio_pa").as_str(), EMBARGO_ICMBIO);
        assert_eq!(normalize("Embargo-ICMBio").as_str(), EMBARGO_ICMBIO);
    }

    #[test]
    fn test_embargo_without_icmbio_falls_through() {
        assert_eq!(normalize("embargos_ibama").as_str(), "Embargos Ibama");
    }

    #[test]
    fn test_first_match_wins_embargo_over_quilombo() {
        assert_eq!(
            normalize("embargo_icmbio_quilombo_ba").as_str(),
            EMBARGO_ICMBIO
        );
    }

    #[test]
    fn test_settlement_and_quilombola() {
        assert_eq!(normalize("assentamento_brasil").as_str(), RURAL_SETTLEMENT);
        assert_eq!(normalize("areas_quilombolas").as_str(), QUILOMBOLA_TERRITORY);
    }

    #[test]
    fn test_indigenous_variants() {
        for raw in [
            "terra_indigena_xx",
            "Terras Indígenas",
            "tis_poligonais",
            "ti_sirgas",
            "indigenous_lands",
        ] {
            assert_eq!(normalize(raw).as_str(), INDIGENOUS_LAND, "for {}", raw);
        }
    }

    #[test]
    fn test_ti_must_be_a_whole_token() {
        assert_ne!(normalize("estatisticas").as_str(), INDIGENOUS_LAND);
    }

    #[test]
    fn test_conservation_units() {
        assert_eq!(normalize("uc_federal").as_str(), FEDERAL_CONSERVATION_UNIT);
        assert_eq!(
            normalize("Unidades de Conservação Federais").as_str(),
            FEDERAL_CONSERVATION_UNIT
        );
        assert_eq!(
            normalize("uc_federal_limite").as_str(),
            FEDERAL_CONSERVATION_UNIT_LIMIT
        );
        assert_eq!(
            normalize("limite_10km").as_str(),
            FEDERAL_CONSERVATION_UNIT_LIMIT
        );
    }

    #[test]
    fn test_conservation_unit_without_separators() {
        assert_eq!(normalize("ucfederal").as_str(), FEDERAL_CONSERVATION_UNIT);
        assert_eq!(normalize("UCFederal_PA").as_str(), FEDERAL_CONSERVATION_UNIT);
        assert_eq!(normalize("ucs-federais").as_str(), FEDERAL_CONSERVATION_UNIT);
        assert_eq!(
            normalize("ucfederal_limite").as_str(),
            FEDERAL_CONSERVATION_UNIT_LIMIT
        );
        assert_eq!(normalize("educacao_federal").as_str(), "Educacao Federal");
    }

    #[test]
    fn test_public_forest_registry_region() {
        assert_eq!(
            normalize("cnfp_pa").as_str(),
            "National Public Forest Registry (PA)"
        );
        assert_eq!(
            normalize("CNFP__2020-am").as_str(),
            "National Public Forest Registry (AM)"
        );
        assert_eq!(normalize("cnfp").as_str(), PUBLIC_FOREST_REGISTRY);
        assert_eq!(normalize("cnfp_2020").as_str(), PUBLIC_FOREST_REGISTRY);
    }

    #[test]
    fn test_fallback_title_case() {
        assert_eq!(normalize("areas_prioritarias").as_str(), "Areas Prioritarias");
        assert_eq!(normalize("MOSAICOS--de_areas").as_str(), "Mosaicos De Areas");
    }

    #[test]
    fn test_separator_and_case_insensitive() {
        let a = normalize("Terra-Indigena__XX");
        let b = normalize("terra indigena xx");
        assert_eq!(a, b);
    }

    #[test]
    fn test_classify_reports_category_and_region() {
        let c = LabelRules::default().classify("quilombolas_ma");
        assert_eq!(c.category, Some(RuleKind::Quilombola));
        assert_eq!(c.region.as_deref(), Some("MA"));

        let c = LabelRules::default().classify("something_else");
        assert_eq!(c.category, None);
    }

    #[test]
    fn test_custom_priority_changes_winner() {
        let rules = LabelRules::parse_priority("quilombola").unwrap();
        assert_eq!(rules.order()[0], RuleKind::Quilombola);
        assert_eq!(rules.order().len(), 6);
        assert_eq!(
            rules.normalize("embargo_icmbio_quilombo").as_str(),
            QUILOMBOLA_TERRITORY
        );
    }

    #[test]
    fn test_priority_errors() {
        assert_eq!(
            LabelRules::parse_priority("settlement, nope"),
            Err(LabelRulesError::UnknownRule("nope".to_string()))
        );
        assert_eq!(
            LabelRules::parse_priority("settlement,settlement"),
            Err(LabelRulesError::DuplicateRule("settlement".to_string()))
        );
        assert_eq!(LabelRules::parse_priority("").unwrap(), LabelRules::default());
    }

    #[test]
    fn test_rule_kind_round_trip_names() {
        for kind in RuleKind::DEFAULT_ORDER {
            assert_eq!(kind.name().parse::<RuleKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_registry_flag() {
        assert!(normalize("cnfp_pa").is_public_forest_registry());
        assert!(!normalize("terra_indigena").is_public_forest_registry());
    }
}
