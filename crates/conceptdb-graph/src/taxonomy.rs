//! Versioned category rule table: descriptions, aliases, parents, synonyms.
//!
//! Domain knowledge lives in JSON, not code. Extending coverage means adding
//! entries to the file; the assignment algorithm does not change.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use conceptdb_core::{normalize_name, Error, Result};

/// Format version this build understands.
pub const TAXONOMY_VERSION: u32 = 1;

const BUILTIN_TAXONOMY: &str = include_str!("../data/taxonomy.json");

/// Rules for a single category label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Taxonomy {
    pub version: u32,
    #[serde(default)]
    pub categories: BTreeMap<String, CategoryRule>,
    #[serde(default)]
    pub concept_synonyms: BTreeMap<String, Vec<String>>,
}

impl Taxonomy {
    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TAXONOMY)
    }

    /// Load from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let taxonomy = Self::from_json(&raw)?;
        info!(
            "Loaded taxonomy v{} from {}: {} categories",
            taxonomy.version,
            path.display(),
            taxonomy.categories.len()
        );
        Ok(taxonomy)
    }

    /// Load from `path` when given, else the built-in table.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::builtin(),
        }
    }

    /// Parse and normalise all labels.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: Taxonomy = serde_json::from_str(raw)?;
        if parsed.version != TAXONOMY_VERSION {
            return Err(Error::Config(format!(
                "Unsupported taxonomy version {} (expected {})",
                parsed.version, TAXONOMY_VERSION
            )));
        }
        Ok(parsed.normalized())
    }

    fn normalized(self) -> Self {
        let categories = self
            .categories
            .into_iter()
            .map(|(label, rule)| {
                let rule = CategoryRule {
                    description: rule.description.filter(|d| !d.trim().is_empty()),
                    aliases: clean_list(rule.aliases),
                    parent: rule
                        .parent
                        .map(|p| normalize_name(&p))
                        .filter(|p| !p.is_empty()),
                };
                (normalize_name(&label), rule)
            })
            .collect();
        let concept_synonyms = self
            .concept_synonyms
            .into_iter()
            .map(|(concept, syns)| (normalize_name(&concept), clean_list(syns)))
            .collect();
        Self {
            version: self.version,
            categories,
            concept_synonyms,
        }
    }

    pub fn rule(&self, label: &str) -> Option<&CategoryRule> {
        self.categories.get(&normalize_name(label))
    }

    pub fn description(&self, label: &str) -> Option<&str> {
        self.rule(label).and_then(|r| r.description.as_deref())
    }

    pub fn aliases(&self, label: &str) -> &[String] {
        self.rule(label).map(|r| r.aliases.as_slice()).unwrap_or(&[])
    }

    pub fn parent(&self, label: &str) -> Option<&str> {
        self.rule(label).and_then(|r| r.parent.as_deref())
    }

    pub fn synonyms(&self, concept: &str) -> &[String] {
        self.concept_synonyms
            .get(&normalize_name(concept))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = normalize_name(&item);
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_parses() {
        let t = Taxonomy::builtin().unwrap();
        assert_eq!(t.version, TAXONOMY_VERSION);
        assert_eq!(t.parent("microservices"), Some("software architecture"));
        assert!(t.aliases("machine learning").contains(&"ml".to_string()));
        assert!(t.description("unknown label").is_none());
    }

    #[test]
    fn test_builtin_parents_are_known_labels() {
        let t = Taxonomy::builtin().unwrap();
        for (label, rule) in &t.categories {
            if let Some(parent) = &rule.parent {
                assert!(t.categories.contains_key(parent), "{label} -> {parent}");
            }
        }
    }

    #[test]
    fn test_labels_are_normalized() {
        let t = Taxonomy::from_json(
            r#"{"version":1,"categories":{"  Graph Theory ":{"aliases":["Graphs","graphs",""],"parent":" Mathematics "}}}"#,
        )
        .unwrap();
        assert_eq!(t.parent("graph theory"), Some("mathematics"));
        assert_eq!(t.aliases("GRAPH THEORY"), &["graphs".to_string()]);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let err = Taxonomy::from_json(r#"{"version":2}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(
            &path,
            r#"{"version":1,"concept_synonyms":{"Event Sourcing":["ES"]}}"#,
        )
        .unwrap();
        let t = Taxonomy::load_or_builtin(Some(&path)).unwrap();
        assert_eq!(t.synonyms("event sourcing"), &["es".to_string()]);
        assert!(t.categories.is_empty());
    }
}
