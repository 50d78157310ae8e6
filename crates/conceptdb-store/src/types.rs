//! Row types for the four tables.
//!
//! List fields hold logical contents: placeholders are added on write and
//! stripped on read by the codec, never seen here.

use serde::{Deserialize, Serialize};

/// A list column that failed to decode on read.
///
/// The row carries it so a rewrite can put the original text back instead
/// of a placeholder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MalformedColumn {
    pub column: String,
    pub raw: String,
    pub reason: String,
}

/// A catalog row: one source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogDocument {
    pub id: i64,
    pub source: String,
    pub summary: String,
    /// Parallel to `concept_names`: `concept_ids[i]` names `concept_names[i]`.
    pub concept_ids: Vec<i64>,
    pub concept_names: Vec<String>,
    pub category_names: Vec<String>,
    pub category_ids: Vec<i64>,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub malformed: Vec<MalformedColumn>,
}

/// A passage ("chunk") row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: i64,
    pub catalog_id: i64,
    pub text: String,
    /// Page number or other location marker within the source.
    pub location: String,
    pub concept_ids: Vec<i64>,
    pub concept_names: Vec<String>,
    /// Always a subset of the owning document's `category_ids`.
    pub category_ids: Vec<i64>,
    pub concept_density: f32,
    pub vector: Vec<f32>,
    pub is_reference: bool,
    pub has_math: bool,
    pub has_extraction_issue: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub malformed: Vec<MalformedColumn>,
}

/// A derived concept row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: i64,
    pub concept: String,
    pub summary: String,
    pub catalog_ids: Vec<i64>,
    pub chunk_ids: Vec<i64>,
    /// Co-occurrence neighbours.
    pub adjacent_ids: Vec<i64>,
    /// Lexical neighbours. Not necessarily symmetric.
    pub related_ids: Vec<i64>,
    pub synonyms: Vec<String>,
    pub broader_terms: Vec<String>,
    pub narrower_terms: Vec<String>,
    pub weight: f32,
    pub vector: Vec<f32>,
}

/// A derived category row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub category: String,
    pub description: String,
    /// `0` when the category has no parent.
    pub parent_category_id: i64,
    pub aliases: Vec<String>,
    pub related_categories: Vec<i64>,
    pub document_count: i64,
    pub chunk_count: i64,
    pub concept_count: i64,
    pub vector: Vec<f32>,
}

impl Category {
    pub fn parent(&self) -> Option<i64> {
        (self.parent_category_id != 0).then_some(self.parent_category_id)
    }
}

/// Row counts per table. `None` when the table does not exist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub catalog: Option<usize>,
    pub passages: Option<usize>,
    pub concepts: Option<usize>,
    pub categories: Option<usize>,
    pub db_path: String,
    pub db_size_mb: f64,
}
