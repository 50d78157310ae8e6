//! Post-rebuild consistency checks over a store.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::info;

use conceptdb_core::Result;
use conceptdb_graph::significant_tokens;
use conceptdb_store::{Table, TableStore};

/// Result of [`validate`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub catalog: usize,
    pub passages: usize,
    pub concepts: usize,
    pub categories: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check a rebuilt store.
///
/// Errors: concept references without a concept row, passage categories
/// outside the owning document's set, non-parallel concept arrays, stray
/// placeholder ids, oversized or lexically unrelated `related_ids`, and
/// category links to unknown categories. Store failures are returned as `Err`.
pub fn validate<S: TableStore + ?Sized>(
    store: &S,
    min_word_length: usize,
    max_related: usize,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    let mut missing = false;
    for table in [Table::Catalog, Table::Passages, Table::Concepts, Table::Categories] {
        if !store.table_exists(table)? {
            report.errors.push(format!("Missing required table: {}", table));
            missing = true;
        }
    }
    if missing {
        return Ok(report);
    }

    let catalog = store.read_catalog(store.count_rows(Table::Catalog)?)?;
    let passages = store.read_passages(store.count_rows(Table::Passages)?)?;
    let concepts = store.read_concepts(store.count_rows(Table::Concepts)?)?;
    let categories = store.read_categories(store.count_rows(Table::Categories)?)?;
    report.catalog = catalog.len();
    report.passages = passages.len();
    report.concepts = concepts.len();
    report.categories = categories.len();

    let concept_ids: HashSet<i64> = concepts.iter().map(|c| c.id).collect();
    let category_ids: HashSet<i64> = categories.iter().map(|c| c.id).collect();

    // Catalog → concepts
    let mut doc_categories: HashMap<i64, HashSet<i64>> = HashMap::new();
    for doc in &catalog {
        if doc.id == 0 {
            report.warnings.push(
                "catalog 0: id collides with the list placeholder; [0] in catalog_ids reads back empty"
                    .to_string(),
            );
        }
        if doc.concept_ids.len() != doc.concept_names.len() {
            report.errors.push(format!(
                "catalog {}: {} concept ids but {} concept names",
                doc.id,
                doc.concept_ids.len(),
                doc.concept_names.len()
            ));
        }
        check_refs(&mut report, "catalog", doc.id, &doc.concept_ids, &concept_ids, "concept");
        check_refs(&mut report, "catalog", doc.id, &doc.category_ids, &category_ids, "category");
        doc_categories.insert(doc.id, doc.category_ids.iter().copied().collect());
    }

    // Passages → concepts, categories ⊆ owner
    for p in &passages {
        if p.id == 0 {
            report.warnings.push(
                "passage 0: id collides with the list placeholder; [0] in chunk_ids reads back empty"
                    .to_string(),
            );
        }
        check_refs(&mut report, "passage", p.id, &p.concept_ids, &concept_ids, "concept");
        match doc_categories.get(&p.catalog_id) {
            Some(owner) => {
                let extra: Vec<i64> = p
                    .category_ids
                    .iter()
                    .filter(|id| !owner.contains(*id))
                    .copied()
                    .collect();
                if !extra.is_empty() {
                    report.errors.push(format!(
                        "passage {}: categories {:?} not on catalog {}",
                        p.id, extra, p.catalog_id
                    ));
                }
            }
            None => {
                if !p.category_ids.is_empty() {
                    report.errors.push(format!(
                        "passage {}: has categories but catalog {} does not exist",
                        p.id, p.catalog_id
                    ));
                } else {
                    report.warnings.push(format!(
                        "passage {}: catalog {} does not exist",
                        p.id, p.catalog_id
                    ));
                }
            }
        }
    }

    // Concept edges
    let tokens: HashMap<i64, HashSet<String>> = concepts
        .iter()
        .map(|c| {
            (
                c.id,
                significant_tokens(&c.concept, min_word_length).into_iter().collect(),
            )
        })
        .collect();
    let empty = HashSet::new();
    for c in &concepts {
        check_refs(&mut report, "concept", c.id, &c.adjacent_ids, &concept_ids, "adjacent");
        check_refs(&mut report, "concept", c.id, &c.related_ids, &concept_ids, "related");
        if c.related_ids.len() > max_related {
            report.errors.push(format!(
                "concept {}: {} related ids exceeds limit {}",
                c.id,
                c.related_ids.len(),
                max_related
            ));
        }
        let own = tokens.get(&c.id).unwrap_or(&empty);
        for other in &c.related_ids {
            let shares = tokens
                .get(other)
                .is_some_and(|theirs| theirs.iter().any(|t| own.contains(t)));
            if !shares {
                report.errors.push(format!(
                    "concept {}: related {} shares no significant word",
                    c.id, other
                ));
            }
        }
    }

    // Category edges
    for cat in &categories {
        if let Some(parent) = cat.parent() {
            if !category_ids.contains(&parent) {
                report
                    .errors
                    .push(format!("category {}: unknown parent {}", cat.id, parent));
            }
        }
        check_refs(
            &mut report,
            "category",
            cat.id,
            &cat.related_categories,
            &category_ids,
            "related category",
        );
    }

    info!(
        "Validation: {} errors, {} warnings over {} concepts",
        report.errors.len(),
        report.warnings.len(),
        report.concepts
    );
    Ok(report)
}

fn check_refs(
    report: &mut ValidationReport,
    kind: &str,
    id: i64,
    refs: &[i64],
    known: &HashSet<i64>,
    what: &str,
) {
    for r in refs {
        if *r == 0 {
            report
                .errors
                .push(format!("{} {}: placeholder 0 inside {} list", kind, id, what));
        } else if !known.contains(r) {
            report
                .errors
                .push(format!("{} {}: unknown {} id {}", kind, id, what, r));
        }
    }
}

/// Print a validation report to stdout.
pub fn print_report(report: &ValidationReport) {
    println!("\n=== ConceptDB Validation ===\n");
    println!("  Catalog:    {}", report.catalog);
    println!("  Passages:   {}", report.passages);
    println!("  Concepts:   {}", report.concepts);
    println!("  Categories: {}", report.categories);

    if !report.warnings.is_empty() {
        println!("\n  Warnings:");
        for w in &report.warnings {
            println!("    - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!("\n  Errors:");
        for e in &report.errors {
            println!("    - {}", e);
        }
    }

    if report.is_valid() {
        println!("\n  Status: VALID\n");
    } else {
        println!("\n  Status: INVALID\n");
    }
}
