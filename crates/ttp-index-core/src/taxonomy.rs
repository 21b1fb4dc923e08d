// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Taxonomy Registry
// ─────────────────────────────────────────────────────────────────────
//! Versioned mapping from pattern label to the dimensions it feeds.
//!
//! A registry is validated once at construction and is read-only
//! afterwards; share it as `Arc<TaxonomyRegistry>`. Several versions may
//! live side by side in one process.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use ttp_index_types::{IndexError, IndexResult};

/// One scoring axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub key: String,
    pub display_name: String,
}

/// `{label, dimension, weight}` row of a taxonomy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    pub label: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub dimension: String,
    pub weight: f64,
}

/// Label pair whose sentence-local co-occurrence earns a bonus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairDef {
    pub dimension: String,
    pub left: String,
    pub right: String,
}

/// Serialised taxonomy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyTable {
    pub version: String,
    pub dimensions: Vec<Dimension>,
    pub entries: Vec<TaxonomyEntry>,
    #[serde(default)]
    pub co_occurrence: Vec<PairDef>,
}

/// What one label contributes, per dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionWeights {
    pub display_name: String,
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct TaxonomyRegistry {
    version: String,
    dimensions: Vec<Dimension>,
    patterns: BTreeMap<String, DimensionWeights>,
    by_dimension: BTreeMap<String, BTreeMap<String, f64>>,
    pairs: BTreeMap<String, Vec<(String, String)>>,
    canonical: BTreeMap<String, String>,
}

/// Canonical spelling used to match sloppy classifier labels.
pub fn canonicalize(label: &str) -> String {
    label
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

fn fallback_display_name(label: &str) -> String {
    let lower = label.replace('_', " ").to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn taxonomy_err(msg: String) -> IndexError {
    IndexError::Taxonomy(msg)
}

impl TaxonomyRegistry {
    /// Validate a table and build the registry. Any violation is fatal.
    pub fn from_table(table: TaxonomyTable) -> IndexResult<Self> {
        if table.version.trim().is_empty() {
            return Err(taxonomy_err("version must not be empty".into()));
        }
        if table.dimensions.is_empty() {
            return Err(taxonomy_err("at least one dimension is required".into()));
        }

        let mut dimension_keys = BTreeSet::new();
        for dim in &table.dimensions {
            if dim.key.trim().is_empty() {
                return Err(taxonomy_err("dimension key must not be empty".into()));
            }
            if !dimension_keys.insert(dim.key.as_str()) {
                return Err(taxonomy_err(format!("duplicate dimension '{}'", dim.key)));
            }
        }

        let mut patterns: BTreeMap<String, DimensionWeights> = BTreeMap::new();
        let mut by_dimension: BTreeMap<String, BTreeMap<String, f64>> = table
            .dimensions
            .iter()
            .map(|d| (d.key.clone(), BTreeMap::new()))
            .collect();

        for entry in &table.entries {
            if entry.label.trim().is_empty() {
                return Err(taxonomy_err("entry label must not be empty".into()));
            }
            let Some(dim_labels) = by_dimension.get_mut(&entry.dimension) else {
                return Err(taxonomy_err(format!(
                    "label '{}' references unknown dimension '{}'",
                    entry.label, entry.dimension
                )));
            };
            if !entry.weight.is_finite() || entry.weight <= 0.0 {
                return Err(taxonomy_err(format!(
                    "weight of '{}' in '{}' must be finite and > 0, got {}",
                    entry.label, entry.dimension, entry.weight
                )));
            }
            if dim_labels.insert(entry.label.clone(), entry.weight).is_some() {
                return Err(taxonomy_err(format!(
                    "duplicate entry for '{}' in '{}'",
                    entry.label, entry.dimension
                )));
            }

            let pattern = patterns
                .entry(entry.label.clone())
                .or_insert_with(|| DimensionWeights {
                    display_name: String::new(),
                    weights: BTreeMap::new(),
                });
            pattern.weights.insert(entry.dimension.clone(), entry.weight);
            if let Some(name) = &entry.display_name {
                if !pattern.display_name.is_empty() && &pattern.display_name != name {
                    return Err(taxonomy_err(format!(
                        "conflicting display names for '{}': '{}' vs '{}'",
                        entry.label, pattern.display_name, name
                    )));
                }
                pattern.display_name = name.clone();
            }
        }

        let mut canonical = BTreeMap::new();
        for (label, pattern) in patterns.iter_mut() {
            if pattern.display_name.is_empty() {
                pattern.display_name = fallback_display_name(label);
            }
            if let Some(other) = canonical.insert(canonicalize(label), label.clone()) {
                return Err(taxonomy_err(format!(
                    "labels '{other}' and '{label}' are indistinguishable after canonicalisation"
                )));
            }
        }

        let mut pairs: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for pair in &table.co_occurrence {
            let Some(dim_labels) = by_dimension.get(&pair.dimension) else {
                return Err(taxonomy_err(format!(
                    "co-occurrence pair references unknown dimension '{}'",
                    pair.dimension
                )));
            };
            if pair.left == pair.right {
                return Err(taxonomy_err(format!(
                    "co-occurrence pair '{}' pairs a label with itself",
                    pair.left
                )));
            }
            for label in [&pair.left, &pair.right] {
                if !dim_labels.contains_key(label) {
                    return Err(taxonomy_err(format!(
                        "co-occurrence label '{label}' does not contribute to '{}'",
                        pair.dimension
                    )));
                }
            }
            let ordered = if pair.left < pair.right {
                (pair.left.clone(), pair.right.clone())
            } else {
                (pair.right.clone(), pair.left.clone())
            };
            let list = pairs.entry(pair.dimension.clone()).or_default();
            if list.contains(&ordered) {
                return Err(taxonomy_err(format!(
                    "duplicate co-occurrence pair ({}, {}) in '{}'",
                    ordered.0, ordered.1, pair.dimension
                )));
            }
            list.push(ordered);
        }

        log::info!(
            "Taxonomy '{}' loaded: {} dimensions, {} patterns",
            table.version,
            table.dimensions.len(),
            patterns.len()
        );

        Ok(Self {
            version: table.version,
            dimensions: table.dimensions,
            patterns,
            by_dimension,
            pairs,
            canonical,
        })
    }

    /// Parse a JSON `TaxonomyTable` and validate it.
    pub fn from_json(json: &str) -> IndexResult<Self> {
        let table: TaxonomyTable = serde_json::from_str(json)
            .map_err(|e| taxonomy_err(format!("JSON parse error: {e}")))?;
        Self::from_table(table)
    }

    /// The built-in propaganda/recruitment taxonomy.
    pub fn builtin() -> IndexResult<Self> {
        Self::from_table(builtin_table())
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Dimensions in load order.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension(&self, key: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.key == key)
    }

    pub fn lookup(&self, label: &str) -> Option<&DimensionWeights> {
        self.patterns.get(label)
    }

    /// The registry's own copy of `label`, if registered.
    pub fn resolve(&self, label: &str) -> Option<&str> {
        self.patterns.get_key_value(label).map(|(l, _)| l.as_str())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.patterns.contains_key(label)
    }

    /// Registry label matching `raw` after canonicalisation.
    pub fn canonical_label(&self, raw: &str) -> Option<&str> {
        self.canonical.get(&canonicalize(raw)).map(String::as_str)
    }

    pub fn weight(&self, label: &str, dimension: &str) -> Option<f64> {
        self.by_dimension
            .get(dimension)
            .and_then(|labels| labels.get(label))
            .copied()
    }

    /// Contributing labels of a dimension with their weights, label-ordered.
    pub fn contributors(&self, dimension: &str) -> Option<&BTreeMap<String, f64>> {
        self.by_dimension.get(dimension)
    }

    /// Configured co-occurrence pairs of a dimension, each `(lesser, greater)`.
    pub fn pairs(&self, dimension: &str) -> &[(String, String)] {
        self.pairs.get(dimension).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn display_name<'a>(&'a self, label: &'a str) -> &'a str {
        self.patterns
            .get(label)
            .map(|p| p.display_name.as_str())
            .unwrap_or(label)
    }

    /// All labels with their display names.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.patterns
            .iter()
            .map(|(l, p)| (l.as_str(), p.display_name.as_str()))
    }
}

/// `(label, display name, [(dimension, weight)])`.
type BuiltinRow = (&'static str, &'static str, &'static [(&'static str, f64)]);

const BUILTIN_DIMENSIONS: [(&str, &str); 4] = [
    ("russian_alignment", "Russian state alignment"),
    ("sophistication", "Sophistication"),
    ("effectiveness", "Effectiveness"),
    ("financial_leverage", "Financial leverage"),
];

#[rustfmt::skip]
const BUILTIN_ROWS: [BuiltinRow; 21] = [
    // Narrative frameworks
    ("ENCIRCLEMENT_NARRATIVE", "Encirclement narrative", &[("russian_alignment", 1.5), ("effectiveness", 0.75)]),
    ("NATO_EXPANSION_EXISTENTIAL_THREAT", "NATO as existential threat", &[("russian_alignment", 1.5)]),
    ("WESTERN_HYPOCRISY_FRAMING", "Western hypocrisy framing", &[("russian_alignment", 1.25), ("sophistication", 0.5)]),
    ("BOTH_SIDES_FALSE_EQUIVALENCY", "Both-sides framing", &[("russian_alignment", 1.0), ("sophistication", 0.75)]),
    ("US_DECLINE_DEGENERACY", "Western decline and degeneracy", &[("russian_alignment", 1.25), ("effectiveness", 0.5)]),
    ("TRADITIONAL_VALUES_DEFENSE", "Defence of traditional values", &[("russian_alignment", 1.0), ("effectiveness", 1.0)]),
    ("MULTIPOLAR_WORLD_ORDER", "Multipolar world order", &[("russian_alignment", 1.0), ("sophistication", 0.5)]),
    ("ILLEGITIMATE_SECURITY_CONCERNS", "Aggression framed as security", &[("russian_alignment", 1.5)]),
    ("HISTORICAL_GRIEVANCES", "Historical grievances", &[("russian_alignment", 1.0), ("effectiveness", 0.5)]),
    // Techniques
    ("WHATABOUTISM", "Whataboutism", &[("russian_alignment", 0.75), ("sophistication", 0.75)]),
    ("UKRAINE_CORRUPTION_NARRATIVE", "Ukrainian corruption narrative", &[("russian_alignment", 1.25)]),
    ("SANCTIONS_COUNTER_NARRATIVE", "Sanctions counter-narrative", &[("russian_alignment", 1.0), ("financial_leverage", 0.5)]),
    ("FALSE_EQUIVALENCY", "False equivalency", &[("sophistication", 1.0)]),
    ("EMOTIONAL_MANIPULATION", "Emotional manipulation", &[("effectiveness", 1.5)]),
    ("HISTORICAL_REVISIONISM", "Historical revisionism", &[("russian_alignment", 1.0), ("sophistication", 1.25)]),
    ("VICTIM_BLAMING", "Victim blaming", &[("effectiveness", 1.0)]),
    ("DEFLECTION", "Deflection", &[("sophistication", 0.5)]),
    // Funding and cultivation
    ("FUNDING_COVERT", "Covert funding", &[("financial_leverage", 2.5)]),
    ("FUNDING_STATE_MEDIA", "State media funding", &[("financial_leverage", 1.5), ("russian_alignment", 0.5)]),
    ("CULTIVATION_INTELLECTUAL", "Intellectual cultivation", &[("financial_leverage", 1.0), ("sophistication", 1.5)]),
    ("CULTIVATION_INFLUENCER", "Influencer cultivation", &[("financial_leverage", 1.0), ("effectiveness", 1.25)]),
];

const BUILTIN_PAIRS: [(&str, &str, &str); 5] = [
    ("financial_leverage", "FUNDING_COVERT", "CULTIVATION_INTELLECTUAL"),
    ("financial_leverage", "FUNDING_COVERT", "CULTIVATION_INFLUENCER"),
    ("russian_alignment", "NATO_EXPANSION_EXISTENTIAL_THREAT", "ILLEGITIMATE_SECURITY_CONCERNS"),
    ("russian_alignment", "WHATABOUTISM", "WESTERN_HYPOCRISY_FRAMING"),
    ("effectiveness", "EMOTIONAL_MANIPULATION", "VICTIM_BLAMING"),
];

/// Table behind [`TaxonomyRegistry::builtin`].
pub fn builtin_table() -> TaxonomyTable {
    TaxonomyTable {
        version: "builtin-2026.1".to_string(),
        dimensions: BUILTIN_DIMENSIONS
            .iter()
            .map(|(key, name)| Dimension {
                key: key.to_string(),
                display_name: name.to_string(),
            })
            .collect(),
        entries: BUILTIN_ROWS
            .iter()
            .flat_map(|(label, name, weights)| {
                weights.iter().map(move |(dimension, weight)| TaxonomyEntry {
                    label: label.to_string(),
                    display_name: Some(name.to_string()),
                    dimension: dimension.to_string(),
                    weight: *weight,
                })
            })
            .collect(),
        co_occurrence: BUILTIN_PAIRS
            .iter()
            .map(|(dimension, left, right)| PairDef {
                dimension: dimension.to_string(),
                left: left.to_string(),
                right: right.to_string(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn small_table() -> TaxonomyTable {
        TaxonomyTable {
            version: "t1".into(),
            dimensions: vec![
                Dimension { key: "a".into(), display_name: "Axis A".into() },
                Dimension { key: "b".into(), display_name: "Axis B".into() },
            ],
            entries: vec![
                TaxonomyEntry { label: "X".into(), display_name: None, dimension: "a".into(), weight: 1.0 },
                TaxonomyEntry { label: "X".into(), display_name: None, dimension: "b".into(), weight: 0.5 },
                TaxonomyEntry { label: "Y_Z".into(), display_name: Some("Why zed".into()), dimension: "a".into(), weight: 2.0 },
            ],
            co_occurrence: vec![PairDef { dimension: "a".into(), left: "Y_Z".into(), right: "X".into() }],
        }
    }

    #[test]
    fn test_builtin_loads() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        assert_eq!(registry.dimensions().len(), 4);
        assert_eq!(registry.dimensions()[0].key, "russian_alignment");
        assert_eq!(registry.weight("FUNDING_COVERT", "financial_leverage"), Some(2.5));
        assert_eq!(registry.pairs("financial_leverage").len(), 2);
    }

    #[test]
    fn test_lookup_multi_dimension() {
        let registry = TaxonomyRegistry::from_table(small_table()).unwrap();
        let weights = registry.lookup("X").unwrap();
        assert_eq!(weights.weights.len(), 2);
        assert_eq!(weights.weights["b"], 0.5);
        assert!(registry.lookup("NOPE").is_none());
    }

    #[test]
    fn test_dimension_order_preserved() {
        let registry = TaxonomyRegistry::from_table(small_table()).unwrap();
        let keys: Vec<&str> = registry.dimensions().iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_display_names() {
        let registry = TaxonomyRegistry::from_table(small_table()).unwrap();
        assert_eq!(registry.display_name("Y_Z"), "Why zed");
        assert_eq!(registry.display_name("X"), "X");
        assert_eq!(registry.display_name("UNKNOWN"), "UNKNOWN");
    }

    #[test]
    fn test_pairs_are_ordered() {
        let registry = TaxonomyRegistry::from_table(small_table()).unwrap();
        assert_eq!(registry.pairs("a"), &[("X".to_string(), "Y_Z".to_string())]);
        assert!(registry.pairs("b").is_empty());
    }

    #[test]
    fn test_canonical_label() {
        let registry = TaxonomyRegistry::builtin().unwrap();
        assert_eq!(registry.canonical_label(" False_Equivalency "), Some("FALSE_EQUIVALENCY"));
        assert_eq!(registry.canonical_label("emotional manipulation"), Some("EMOTIONAL_MANIPULATION"));
        assert_eq!(registry.canonical_label("victim-blaming"), Some("VICTIM_BLAMING"));
        assert_eq!(registry.canonical_label("nonsense"), None);
    }

    #[test]
    fn test_rejects_unknown_dimension() {
        let mut table = small_table();
        table.entries[0].dimension = "zzz".into();
        assert!(matches!(
            TaxonomyRegistry::from_table(table),
            Err(IndexError::Taxonomy(_))
        ));
    }

    #[test]
    fn test_rejects_bad_weights() {
        for weight in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let mut table = small_table();
            table.entries[0].weight = weight;
            assert!(TaxonomyRegistry::from_table(table).is_err(), "weight {weight}");
        }
    }

    #[test]
    fn test_rejects_duplicate_entry() {
        let mut table = small_table();
        let dup = table.entries[0].clone();
        table.entries.push(dup);
        assert!(TaxonomyRegistry::from_table(table).is_err());
    }

    #[test]
    fn test_rejects_duplicate_dimension() {
        let mut table = small_table();
        let dup = table.dimensions[0].clone();
        table.dimensions.push(dup);
        assert!(TaxonomyRegistry::from_table(table).is_err());
    }

    #[test]
    fn test_rejects_empty_tables() {
        let mut table = small_table();
        table.dimensions.clear();
        assert!(TaxonomyRegistry::from_table(table).is_err());

        let mut table = small_table();
        table.version = "  ".into();
        assert!(TaxonomyRegistry::from_table(table).is_err());
    }

    #[test]
    fn test_rejects_pair_outside_dimension() {
        let mut table = small_table();
        table.co_occurrence = vec![PairDef { dimension: "b".into(), left: "X".into(), right: "Y_Z".into() }];
        assert!(TaxonomyRegistry::from_table(table).is_err());
    }

    #[test]
    fn test_rejects_self_pair() {
        let mut table = small_table();
        table.co_occurrence = vec![PairDef { dimension: "a".into(), left: "X".into(), right: "X".into() }];
        assert!(TaxonomyRegistry::from_table(table).is_err());
    }

    #[test]
    fn test_rejects_canonical_collision() {
        let mut table = small_table();
        table.entries.push(TaxonomyEntry {
            label: "y-z".into(),
            display_name: None,
            dimension: "b".into(),
            weight: 1.0,
        });
        assert!(TaxonomyRegistry::from_table(table).is_err());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "version": "v2",
            "dimensions": [{"key": "risk", "display_name": "Risk"}],
            "entries": [{"label": "A", "dimension": "risk", "weight": 1.5}]
        }"#;
        let registry = TaxonomyRegistry::from_json(json).unwrap();
        assert_eq!(registry.version(), "v2");
        assert_eq!(registry.weight("A", "risk"), Some(1.5));
        assert!(registry.pairs("risk").is_empty());
    }

    #[test]
    fn test_from_json_schema_violation() {
        let json = r#"{"version": "v2", "dimensions": []}"#;
        assert!(matches!(
            TaxonomyRegistry::from_json(json),
            Err(IndexError::Taxonomy(_))
        ));
    }

    #[test]
    fn test_versions_coexist() {
        let a = TaxonomyRegistry::builtin().unwrap();
        let b = TaxonomyRegistry::from_table(small_table()).unwrap();
        assert_ne!(a.version(), b.version());
        assert!(a.contains("FUNDING_COVERT"));
        assert!(!b.contains("FUNDING_COVERT"));
    }
}
