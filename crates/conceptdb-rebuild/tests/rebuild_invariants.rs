//! End-to-end rebuild properties over a real SQLite store.

use std::cell::Cell;
use std::collections::HashSet;

use conceptdb_core::{Error, RebuildConfig, Result};
use conceptdb_graph::Taxonomy;
use conceptdb_rebuild::{validate, RebuildOrchestrator, RebuildState};
use conceptdb_store::{
    CatalogDocument, Category, Concept, Passage, SqliteStore, Table, TableStore,
};
use tempfile::TempDir;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn corpus() -> (Vec<CatalogDocument>, Vec<Passage>) {
    let catalog = vec![
        CatalogDocument {
            id: 1,
            source: "library/building-microservices.pdf".into(),
            concept_names: strings(&[
                "Microservices",
                "Domain-Driven Design",
                "event sourcing",
                "service mesh",
            ]),
            category_names: strings(&["microservices", "software architecture"]),
            ..Default::default()
        },
        CatalogDocument {
            id: 2,
            source: "library/art-of-war.pdf".into(),
            concept_names: strings(&["military strategy", "deception", "terrain analysis"]),
            category_names: strings(&["military strategy", "strategy"]),
            ..Default::default()
        },
        CatalogDocument {
            id: 3,
            source: "library/design-patterns.pdf".into(),
            concept_names: strings(&["strategy pattern", "observer pattern", "event sourcing"]),
            category_names: strings(&["design patterns", "software architecture"]),
            ..Default::default()
        },
        CatalogDocument {
            id: 4,
            source: "library/untagged.pdf".into(),
            ..Default::default()
        },
    ];
    let passages = vec![
        Passage {
            id: 100,
            catalog_id: 1,
            text: "Services own their data.".into(),
            concept_names: strings(&["microservices", "Event Sourcing"]),
            ..Default::default()
        },
        Passage {
            id: 101,
            catalog_id: 2,
            text: "All warfare is based on deception.".into(),
            concept_names: strings(&["deception", "retired concept"]),
            ..Default::default()
        },
        Passage {
            id: 102,
            catalog_id: 3,
            text: "Define a family of algorithms.".into(),
            concept_names: strings(&["strategy pattern"]),
            ..Default::default()
        },
        Passage {
            id: 103,
            catalog_id: 4,
            text: "Front matter.".into(),
            ..Default::default()
        },
    ];
    (catalog, passages)
}

fn seeded_store() -> (SqliteStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path()).unwrap();
    let (catalog, passages) = corpus();
    store.insert_catalog(&catalog).unwrap();
    store.insert_passages(&passages).unwrap();
    (store, dir)
}

fn rebuild(store: &SqliteStore, dir: &TempDir) -> conceptdb_rebuild::RebuildReport {
    let config = RebuildConfig::new(dir.path()).unwrap();
    RebuildOrchestrator::new(store, config).unwrap().run().unwrap()
}

#[test]
fn rebuild_is_deterministic_across_stores() {
    let (a, dir_a) = seeded_store();
    let (b, dir_b) = seeded_store();
    let ra = rebuild(&a, &dir_a);
    let rb = rebuild(&b, &dir_b);

    assert_eq!(ra.concept_digest, rb.concept_digest);
    assert_ne!(ra.run_id, rb.run_id);
    assert_eq!(a.read_concepts(1000).unwrap(), b.read_concepts(1000).unwrap());
    assert_eq!(a.read_categories(1000).unwrap(), b.read_categories(1000).unwrap());
}

#[test]
fn rebuild_is_idempotent() {
    let (store, dir) = seeded_store();
    let first = rebuild(&store, &dir);
    let catalog_after_first = store.read_catalog(1000).unwrap();
    let second = rebuild(&store, &dir);

    assert_eq!(first.concept_digest, second.concept_digest);
    assert_eq!(catalog_after_first, store.read_catalog(1000).unwrap());
    // Dangling names were dropped by the first run.
    assert_eq!(first.counts.dangling_references, 1);
    assert_eq!(second.counts.dangling_references, 0);
}

#[test]
fn rebuilt_store_passes_validation() {
    let (store, dir) = seeded_store();
    let report = rebuild(&store, &dir);
    assert!(report.warnings.iter().any(|w| w.contains("Dropped 1")));

    let validation = validate(&store, 5, 20).unwrap();
    assert!(validation.is_valid(), "{:?}", validation.errors);
    assert_eq!(validation.catalog, 4);
}

#[test]
fn referential_completeness_and_inheritance() {
    let (store, dir) = seeded_store();
    rebuild(&store, &dir);

    let concept_ids: HashSet<i64> = store
        .read_concepts(1000)
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    let catalog = store.read_catalog(1000).unwrap();
    for doc in &catalog {
        assert_eq!(doc.concept_ids.len(), doc.concept_names.len());
        assert!(doc.concept_ids.iter().all(|id| concept_ids.contains(id)));
    }
    for p in store.read_passages(1000).unwrap() {
        assert!(p.concept_ids.iter().all(|id| concept_ids.contains(id)));
        let owner = catalog.iter().find(|d| d.id == p.catalog_id).unwrap();
        assert!(p.category_ids.iter().all(|id| owner.category_ids.contains(id)));
    }
}

#[test]
fn chunk_ids_and_adjacency() {
    let (store, dir) = seeded_store();
    rebuild(&store, &dir);
    let concepts = store.read_concepts(1000).unwrap();
    let by_name = |name: &str| concepts.iter().find(|c| c.concept == name).unwrap();

    let sourcing = by_name("event sourcing");
    assert_eq!(sourcing.catalog_ids, vec![1, 3]);
    assert_eq!(sourcing.chunk_ids, vec![100]);

    let micro = by_name("microservices");
    assert!(micro.adjacent_ids.contains(&sourcing.id));
    assert!(sourcing.adjacent_ids.contains(&micro.id));
    assert!(!micro.adjacent_ids.contains(&by_name("deception").id));

    let military = by_name("military strategy");
    let pattern = by_name("strategy pattern");
    assert!(military.related_ids.contains(&pattern.id));
    assert!(pattern.related_ids.contains(&military.id));
    assert_eq!(micro.synonyms, vec!["microservice architecture".to_string()]);
}

#[test]
fn category_parents_follow_taxonomy() {
    let (store, dir) = seeded_store();
    rebuild(&store, &dir);
    let categories = store.read_categories(1000).unwrap();
    let by_label = |label: &str| categories.iter().find(|c| c.category == label).unwrap();

    let architecture = by_label("software architecture");
    assert_eq!(by_label("microservices").parent(), Some(architecture.id));
    assert_eq!(by_label("design patterns").parent(), None);
    assert_eq!(by_label("military strategy").parent(), Some(by_label("strategy").id));
    assert_eq!(architecture.document_count, 2);
    assert_eq!(architecture.chunk_count, 2);
}

#[test]
fn large_tables_are_read_in_full() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path()).unwrap();
    let catalog: Vec<CatalogDocument> = (1..=2500)
        .map(|i| CatalogDocument {
            id: i,
            source: format!("bulk/{i}.txt"),
            concept_names: vec![format!("topic {}", i % 300)],
            ..Default::default()
        })
        .collect();
    store.insert_catalog(&catalog).unwrap();
    store.insert_passages(&[]).unwrap();

    let report = rebuild(&store, &dir);
    assert_eq!(report.counts.catalog_rows_read, 2500);
    assert_eq!(report.counts.concepts, 300);
    assert_eq!(store.count_rows(Table::Catalog).unwrap(), 2500);
}

/// Delegates to SQLite, failing the configured operations.
struct FlakyStore {
    inner: SqliteStore,
    fail_stage: Option<Table>,
    fail_indexes: bool,
    swaps: Cell<usize>,
}

impl FlakyStore {
    fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_stage: None,
            fail_indexes: false,
            swaps: Cell::new(0),
        }
    }

    fn check(&self, table: Table) -> Result<()> {
        if self.fail_stage == Some(table) {
            return Err(Error::Storage(format!("injected failure staging {}", table)));
        }
        Ok(())
    }
}

impl TableStore for FlakyStore {
    fn table_exists(&self, table: Table) -> Result<bool> {
        self.inner.table_exists(table)
    }
    fn count_rows(&self, table: Table) -> Result<usize> {
        self.inner.count_rows(table)
    }
    fn read_catalog(&self, limit: usize) -> Result<Vec<CatalogDocument>> {
        self.inner.read_catalog(limit)
    }
    fn read_passages(&self, limit: usize) -> Result<Vec<Passage>> {
        self.inner.read_passages(limit)
    }
    fn read_concepts(&self, limit: usize) -> Result<Vec<Concept>> {
        self.inner.read_concepts(limit)
    }
    fn read_categories(&self, limit: usize) -> Result<Vec<Category>> {
        self.inner.read_categories(limit)
    }
    fn stage_catalog(&self, rows: &[CatalogDocument]) -> Result<usize> {
        self.check(Table::Catalog)?;
        self.inner.stage_catalog(rows)
    }
    fn stage_passages(&self, rows: &[Passage]) -> Result<usize> {
        self.check(Table::Passages)?;
        self.inner.stage_passages(rows)
    }
    fn stage_concepts(&self, rows: &[Concept]) -> Result<usize> {
        self.check(Table::Concepts)?;
        self.inner.stage_concepts(rows)
    }
    fn stage_categories(&self, rows: &[Category]) -> Result<usize> {
        self.check(Table::Categories)?;
        self.inner.stage_categories(rows)
    }
    fn swap_staged(&self, table: Table, expected_rows: usize) -> Result<()> {
        self.swaps.set(self.swaps.get() + 1);
        self.inner.swap_staged(table, expected_rows)
    }
    fn create_indexes(&self, table: Table) -> Result<()> {
        if self.fail_indexes {
            return Err(Error::Storage(format!("injected index failure on {}", table)));
        }
        self.inner.create_indexes(table)
    }
}

#[test]
fn failure_before_source_update_leaves_sources_untouched() {
    let (inner, dir) = seeded_store();
    let before = inner.read_catalog(1000).unwrap();
    let mut store = FlakyStore::new(inner);
    store.fail_stage = Some(Table::Catalog);

    let config = RebuildConfig::new(dir.path()).unwrap();
    let mut orch = RebuildOrchestrator::with_taxonomy(&store, config, Taxonomy::builtin().unwrap());
    let err = orch.run().unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(orch.state(), RebuildState::Failed);
    let report = orch.report();
    assert_eq!(report.failed_in, Some(RebuildState::UpdatingSourceTables));
    assert_eq!(report.tables_written, vec!["concepts", "categories"]);
    assert!(report.error.as_deref().unwrap().contains("injected"));

    // Derived tables are in place; the catalog is exactly as it was.
    assert!(store.table_exists(Table::Concepts).unwrap());
    assert_eq!(store.read_catalog(1000).unwrap(), before);
    assert_eq!(store.swaps.get(), 2);
}

#[test]
fn failure_staging_derived_table_keeps_previous_version() {
    let (inner, dir) = seeded_store();
    rebuild(&inner, &dir);
    let previous = inner.read_concepts(1000).unwrap();

    let mut store = FlakyStore::new(inner);
    store.fail_stage = Some(Table::Concepts);
    let config = RebuildConfig::new(dir.path()).unwrap();
    let mut orch = RebuildOrchestrator::new(&store, config).unwrap();
    assert!(orch.run().is_err());
    assert_eq!(orch.report().failed_in, Some(RebuildState::WritingDerivedTables));
    assert_eq!(store.read_concepts(1000).unwrap(), previous);
    assert_eq!(store.swaps.get(), 0);
}

#[test]
fn index_failure_is_not_fatal() {
    let (inner, dir) = seeded_store();
    let mut store = FlakyStore::new(inner);
    store.fail_indexes = true;

    let config = RebuildConfig::new(dir.path()).unwrap();
    let report = RebuildOrchestrator::new(&store, config)
        .unwrap()
        .run()
        .unwrap();
    assert!(report.succeeded());
    assert_eq!(report.counts.index_failures, 4);
    assert_eq!(report.tables_written.len(), 4);
}

#[test]
fn orchestrator_accepts_trait_objects() {
    let (store, dir) = seeded_store();
    let dyn_store: &dyn TableStore = &store;
    let config = RebuildConfig::new(dir.path()).unwrap();
    let report = RebuildOrchestrator::new(dyn_store, config)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(report.state, RebuildState::Done);
}

#[test]
fn malformed_source_lists_are_reported_and_kept() {
    let (store, dir) = seeded_store();
    {
        let conn = rusqlite::Connection::open(store.path()).unwrap();
        conn.execute(
            "UPDATE catalog SET concept_names = 'rust, tokio', \
             category_names = 'systems; async' WHERE id = 1",
            [],
        )
        .unwrap();
    }

    for _ in 0..2 {
        let report = rebuild(&store, &dir);
        assert!(report.succeeded());
        assert_eq!(report.counts.malformed_records, 2);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("catalog 1: concept_names is malformed")));
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("catalog 1: category_names is malformed")));
    }

    let conn = rusqlite::Connection::open(store.path()).unwrap();
    let (concepts, categories): (String, String) = conn
        .query_row(
            "SELECT concept_names, category_names FROM catalog WHERE id = 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(concepts, "rust, tokio");
    assert_eq!(categories, "systems; async");

    // The row still takes part as a document with no mentions.
    let concepts = store.read_concepts(1000).unwrap();
    assert!(!concepts.iter().any(|c| c.catalog_ids.contains(&1)));
}

#[test]
fn catalog_identities_are_checked_against_sources() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path()).unwrap();
    let (catalog, _) = corpus();
    let loaded = store.load_catalog(catalog, 1024).unwrap();
    store
        .insert_passages(&[Passage {
            id: 100,
            catalog_id: loaded[0].id,
            concept_names: strings(&["microservices"]),
            ..Default::default()
        }])
        .unwrap();

    let report = rebuild(&store, &dir);
    assert!(report.succeeded());
    assert_eq!(report.counts.catalog_identity_mismatches, 0);
    assert!(!report.warnings.iter().any(|w| w.contains("source identity")));

    // A row inserted with an arbitrary id is reported, not rewritten.
    store
        .insert_catalog(&[CatalogDocument {
            id: 5,
            source: "library/hand-numbered.pdf".into(),
            ..Default::default()
        }])
        .unwrap();
    let report = rebuild(&store, &dir);
    assert!(report.succeeded());
    assert_eq!(report.counts.catalog_identity_mismatches, 1);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("1 catalog rows have ids that do not match")));
    assert!(store.read_catalog(1000).unwrap().iter().any(|d| d.id == 5));
}
