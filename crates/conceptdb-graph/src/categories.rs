//! Category assignment from catalog labels and the taxonomy rule table.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info};

use conceptdb_core::{normalize_name, IdentityRegistry, Result};
use conceptdb_store::{CatalogDocument, Category};

use crate::taxonomy::Taxonomy;

/// Category labels and concept names observed on one catalog document.
#[derive(Debug, Clone, Default)]
pub struct CategoryInput {
    pub catalog_id: i64,
    pub category_names: Vec<String>,
    pub concept_names: Vec<String>,
}

impl From<&CatalogDocument> for CategoryInput {
    fn from(doc: &CatalogDocument) -> Self {
        Self {
            catalog_id: doc.id,
            category_names: doc.category_names.clone(),
            concept_names: doc.concept_names.clone(),
        }
    }
}

/// Output of [`CategoryAssigner::assign`].
#[derive(Debug, Clone, Default)]
pub struct CategorySet {
    /// One row per distinct normalized label, ordered by label.
    pub categories: Vec<Category>,
    pub documents_without_categories: usize,
    pub related_edges: usize,
    by_label: HashMap<String, usize>,
    by_document: BTreeMap<i64, Vec<i64>>,
}

impl CategorySet {
    pub fn id_of(&self, label: &str) -> Option<i64> {
        self.by_label
            .get(&normalize_name(label))
            .map(|&i| self.categories[i].id)
    }

    pub fn get(&self, label: &str) -> Option<&Category> {
        self.by_label
            .get(&normalize_name(label))
            .map(|&i| &self.categories[i])
    }

    /// Category ids of a catalog document, in the document's label order.
    /// Unknown documents have none.
    pub fn categories_of(&self, catalog_id: i64) -> &[i64] {
        self.by_document
            .get(&catalog_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_document(&self, catalog_id: i64) -> bool {
        self.by_document.contains_key(&catalog_id)
    }

    /// Carry vectors over from the previous category table by label.
    pub fn carry_forward(&mut self, previous: &[Category]) -> usize {
        let prior: HashMap<String, &Category> = previous
            .iter()
            .map(|c| (normalize_name(&c.category), c))
            .collect();
        let mut carried = 0;
        for category in &mut self.categories {
            if let Some(old) = prior.get(&category.category) {
                if category.vector.is_empty() && !old.vector.is_empty() {
                    category.vector = old.vector.clone();
                    carried += 1;
                }
            }
        }
        carried
    }
}

/// Derives category rows from catalog labels.
pub struct CategoryAssigner<'t> {
    taxonomy: &'t Taxonomy,
    max_related: usize,
}

impl<'t> CategoryAssigner<'t> {
    pub fn new(taxonomy: &'t Taxonomy, max_related: usize) -> Self {
        Self {
            taxonomy,
            max_related,
        }
    }

    /// `passage_owners` yields the owning `catalog_id` of every passage and
    /// feeds `chunk_count`.
    pub fn assign(
        &self,
        documents: &[CategoryInput],
        passage_owners: impl IntoIterator<Item = i64>,
        registry: &mut IdentityRegistry,
    ) -> Result<CategorySet> {
        // Per-label source sets and concept sets.
        let mut sources: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
        let mut concepts: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut labels_by_document: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        let mut documents_without_categories = 0;

        for doc in documents {
            let labels = distinct_labels(&doc.category_names);
            if labels.is_empty() {
                documents_without_categories += 1;
            }
            for label in &labels {
                sources.entry(label.clone()).or_default().insert(doc.catalog_id);
                let set = concepts.entry(label.clone()).or_default();
                set.extend(
                    doc.concept_names
                        .iter()
                        .map(|n| normalize_name(n))
                        .filter(|n| !n.is_empty()),
                );
            }
            labels_by_document.insert(doc.catalog_id, labels);
        }

        let ids = registry.assign_sorted(sources.keys().map(String::as_str))?;
        let id_of = |label: &str| ids.get(label).map(|&id| i64::from(id));

        let mut chunk_counts: HashMap<i64, i64> = HashMap::new();
        for owner in passage_owners {
            if let Some(labels) = labels_by_document.get(&owner) {
                for label in labels {
                    if let Some(id) = id_of(label) {
                        *chunk_counts.entry(id).or_insert(0) += 1;
                    }
                }
            }
        }

        let related = self.related_by_overlap(&sources, &labels_by_document, &id_of);

        let mut set = CategorySet {
            documents_without_categories,
            ..Default::default()
        };

        for (label, docs) in &sources {
            let Some(id) = id_of(label) else { continue };
            let parent_category_id = match self.taxonomy.parent(label) {
                Some(parent) if parent != label => id_of(parent).unwrap_or_else(|| {
                    debug!("Parent '{}' of '{}' is not a known category", parent, label);
                    0
                }),
                _ => 0,
            };
            let description = self
                .taxonomy
                .description(label)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Concepts and practices related to {label}"));
            let related_categories = related.get(&id).cloned().unwrap_or_default();
            set.related_edges += related_categories.len();

            set.by_label.insert(label.clone(), set.categories.len());
            set.categories.push(Category {
                id,
                category: label.clone(),
                description,
                parent_category_id,
                aliases: self.taxonomy.aliases(label).to_vec(),
                related_categories,
                document_count: docs.len() as i64,
                chunk_count: chunk_counts.get(&id).copied().unwrap_or(0),
                concept_count: concepts.get(label).map_or(0, |c| c.len() as i64),
                vector: Vec::new(),
            });
        }

        set.by_document = labels_by_document
            .into_iter()
            .map(|(doc, labels)| {
                let ids: Vec<i64> = labels.iter().filter_map(|l| id_of(l)).collect();
                (doc, ids)
            })
            .collect();

        info!(
            "Categories: {} labels across {} documents ({} without categories), {} related edges",
            set.categories.len(),
            documents.len(),
            documents_without_categories,
            set.related_edges
        );

        Ok(set)
    }

    /// Top-N other categories by shared source documents, overlap
    /// descending then id ascending.
    fn related_by_overlap(
        &self,
        sources: &BTreeMap<String, BTreeSet<i64>>,
        labels_by_document: &BTreeMap<i64, Vec<String>>,
        id_of: &impl Fn(&str) -> Option<i64>,
    ) -> HashMap<i64, Vec<i64>> {
        let mut overlap: HashMap<i64, HashMap<i64, usize>> = HashMap::new();
        for labels in labels_by_document.values() {
            let doc_ids: Vec<i64> = labels.iter().filter_map(|l| id_of(l)).collect();
            for &a in &doc_ids {
                for &b in &doc_ids {
                    if a != b {
                        *overlap.entry(a).or_default().entry(b).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut out = HashMap::with_capacity(sources.len());
        for (id, counts) in overlap {
            let mut ranked: Vec<(i64, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            ranked.truncate(self.max_related);
            out.insert(id, ranked.into_iter().map(|(other, _)| other).collect());
        }
        out
    }
}

fn distinct_labels(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in names {
        let label = normalize_name(raw);
        if !label.is_empty() && !out.contains(&label) {
            out.push(label);
        }
    }
    out
}
