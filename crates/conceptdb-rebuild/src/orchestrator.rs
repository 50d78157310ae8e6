//! Rebuild orchestrator.
//!
//! Every row set is computed in memory before the first write. Derived tables
//! are replaced before source tables, so a failure before
//! `UpdatingSourceTables` leaves the sources untouched.

use std::time::Instant;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use conceptdb_core::{assign_document_identities, Error, IdentityRegistry, RebuildConfig, Result};
use conceptdb_graph::{
    CategoryAssigner, CategoryInput, CategorySet, ConceptGraph, ConceptGraphBuilder,
    DocumentConceptMentions, LexicalLinker, PassageMentions, Taxonomy,
};
use conceptdb_store::{
    CatalogDocument, Category, Concept, MalformedColumn, Passage, Table, TableStore,
};

use crate::types::*;

/// Source rows plus the previous derived tables.
struct Sources {
    catalog: Vec<CatalogDocument>,
    passages: Vec<Passage>,
    previous_concepts: Vec<Concept>,
    previous_categories: Vec<Category>,
}

/// Everything that gets written, computed up front.
struct Rows {
    concepts: Vec<Concept>,
    categories: Vec<Category>,
    catalog: Vec<CatalogDocument>,
    passages: Vec<Passage>,
}

/// Drives one rebuild of the derived tables over a [`TableStore`].
pub struct RebuildOrchestrator<'s, S: TableStore + ?Sized> {
    store: &'s S,
    config: RebuildConfig,
    taxonomy: Taxonomy,
    state: RebuildState,
    report: RebuildReport,
}

impl<'s, S: TableStore + ?Sized> RebuildOrchestrator<'s, S> {
    /// Create an orchestrator, loading the taxonomy named by the config or
    /// the built-in one.
    pub fn new(store: &'s S, config: RebuildConfig) -> Result<Self> {
        let taxonomy = Taxonomy::load_or_builtin(config.taxonomy_path.as_deref())?;
        Ok(Self::with_taxonomy(store, config, taxonomy))
    }

    /// Create an orchestrator with an explicit taxonomy (for testing).
    pub fn with_taxonomy(store: &'s S, config: RebuildConfig, taxonomy: Taxonomy) -> Self {
        Self {
            store,
            config,
            taxonomy,
            state: RebuildState::Idle,
            report: RebuildReport::new(Uuid::new_v4().to_string()),
        }
    }

    pub fn state(&self) -> RebuildState {
        self.state
    }

    pub fn report(&self) -> &RebuildReport {
        &self.report
    }

    /// Run the rebuild to `Done` or `Failed`.
    ///
    /// On failure the error is returned and the report keeps the stage it
    /// failed in. Nothing is rolled back: tables already swapped stay swapped.
    pub fn run(&mut self) -> Result<RebuildReport> {
        if self.state != RebuildState::Idle {
            return Err(Error::Internal(format!(
                "Rebuild {} already ran (state: {})",
                self.report.run_id, self.state
            )));
        }

        let start = Instant::now();
        self.report.started_at = Utc::now();
        info!("Starting rebuild {}", self.report.run_id);

        let result = self.execute();

        self.report.duration_ms = start.elapsed().as_millis() as u64;
        self.report.finished_at = Some(Utc::now());

        match result {
            Ok(()) => {
                self.advance(RebuildState::Done);
                let c = &self.report.counts;
                info!(
                    "Rebuild complete: concepts={}, categories={}, adjacency={}, related={}, dangling={}, duration={}ms",
                    c.concepts,
                    c.categories,
                    c.adjacency_edges,
                    c.related_edges,
                    c.dangling_references,
                    self.report.duration_ms
                );
                Ok(self.report.clone())
            }
            Err(e) => {
                let failed_in = self.state;
                self.state = RebuildState::Failed;
                self.report.state = RebuildState::Failed;
                self.report.failed_in = Some(failed_in);
                self.report.error = Some(e.to_string());
                error!("Rebuild failed during {}: {}", failed_in, e);
                if let Error::PartialWriteFailure { table, .. } = &e {
                    error!(
                        "Table '{}' may be missing or stale; rerun the rebuild to restore it",
                        table
                    );
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<()> {
        self.advance(RebuildState::ExtractingSources);
        let sources = self.extract_sources()?;

        self.advance(RebuildState::AssigningIdentities);
        let (mut graph, mut categories) = self.assign_identities(&sources)?;

        self.advance(RebuildState::ComputingEdges);
        self.compute_edges(&mut graph, &mut categories, &sources);
        let rows = self.assemble_rows(graph, categories, sources)?;

        self.advance(RebuildState::WritingDerivedTables);
        self.replace_table(Table::Concepts, rows.concepts.len(), |s| {
            s.stage_concepts(&rows.concepts)
        })?;
        self.replace_table(Table::Categories, rows.categories.len(), |s| {
            s.stage_categories(&rows.categories)
        })?;

        self.advance(RebuildState::UpdatingSourceTables);
        self.replace_table(Table::Catalog, rows.catalog.len(), |s| {
            s.stage_catalog(&rows.catalog)
        })?;
        self.replace_table(Table::Passages, rows.passages.len(), |s| {
            s.stage_passages(&rows.passages)
        })?;

        Ok(())
    }

    fn advance(&mut self, to: RebuildState) {
        debug!("Rebuild state: {} -> {}", self.state, to);
        self.state = to;
        self.report.state = to;
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    fn extract_sources(&mut self) -> Result<Sources> {
        for table in [Table::Catalog, Table::Passages] {
            if !self.store.table_exists(table)? {
                return Err(Error::MissingTable(table.name().to_string()));
            }
        }

        // Explicit limits: the full row count, never a default page size.
        let catalog_rows = self.store.count_rows(Table::Catalog)?;
        let catalog = self.store.read_catalog(catalog_rows)?;
        let passage_rows = self.store.count_rows(Table::Passages)?;
        let passages = self.store.read_passages(passage_rows)?;

        let previous_concepts = self.read_previous(Table::Concepts, |s, n| s.read_concepts(n));
        let previous_categories =
            self.read_previous(Table::Categories, |s, n| s.read_categories(n));

        self.report_malformed("catalog", catalog.iter().map(|d| (d.id, &d.malformed)));
        self.report_malformed("passage", passages.iter().map(|p| (p.id, &p.malformed)));

        let counts = &mut self.report.counts;
        counts.catalog_rows_read = catalog.len();
        counts.passage_rows_read = passages.len();
        counts.previous_concepts = previous_concepts.len();
        counts.previous_categories = previous_categories.len();

        info!(
            "Extracted {} catalog rows, {} passages ({} previous concepts, {} previous categories)",
            catalog.len(),
            passages.len(),
            previous_concepts.len(),
            previous_categories.len()
        );

        Ok(Sources {
            catalog,
            passages,
            previous_concepts,
            previous_categories,
        })
    }

    /// One warning per list column that did not decode. Such columns are
    /// treated as empty and written back with their stored text.
    fn report_malformed<'r>(
        &mut self,
        kind: &str,
        rows: impl Iterator<Item = (i64, &'r Vec<MalformedColumn>)>,
    ) {
        for (id, columns) in rows {
            for column in columns {
                let msg = format!(
                    "{} {}: {} is malformed ({}); kept as stored, read as empty",
                    kind, id, column.column, column.reason
                );
                warn!("{}", msg);
                self.report.warnings.push(msg);
                self.report.counts.malformed_records += 1;
            }
        }
    }

    /// Previous derived rows, used only to carry summaries and vectors
    /// forward. Unreadable tables are skipped.
    fn read_previous<T>(
        &mut self,
        table: Table,
        read: impl FnOnce(&S, usize) -> Result<Vec<T>>,
    ) -> Vec<T> {
        let rows = self
            .store
            .table_exists(table)
            .and_then(|exists| {
                if exists {
                    self.store.count_rows(table).and_then(|n| read(self.store, n))
                } else {
                    Ok(Vec::new())
                }
            });
        match rows {
            Ok(rows) => rows,
            Err(e) => {
                let msg = format!("Could not read previous {} table: {}", table, e);
                warn!("{}", msg);
                self.report.warnings.push(msg);
                Vec::new()
            }
        }
    }

    fn assign_identities(&mut self, sources: &Sources) -> Result<(ConceptGraph, CategorySet)> {
        self.verify_catalog_identities(&sources.catalog)?;

        let documents: Vec<DocumentConceptMentions> =
            sources.catalog.iter().map(DocumentConceptMentions::from).collect();
        let passages: Vec<PassageMentions> =
            sources.passages.iter().map(PassageMentions::from).collect();

        let mut concept_ids = IdentityRegistry::new(self.config.collision_attempts);
        let graph = ConceptGraphBuilder::new(self.config.max_adjacent).build(
            &documents,
            &passages,
            &mut concept_ids,
        )?;

        let inputs: Vec<CategoryInput> = sources.catalog.iter().map(CategoryInput::from).collect();
        let mut category_ids = IdentityRegistry::new(self.config.collision_attempts);
        let categories = CategoryAssigner::new(&self.taxonomy, self.config.max_related_categories)
            .assign(
                &inputs,
                sources.passages.iter().map(|p| p.catalog_id),
                &mut category_ids,
            )?;

        let counts = &mut self.report.counts;
        counts.concepts = graph.concepts.len();
        counts.categories = categories.categories.len();
        counts.documents_skipped = graph.documents_skipped;
        counts.documents_without_categories = categories.documents_without_categories;
        counts.adjacency_edges = graph.adjacency_edges;
        counts.category_related_edges = categories.related_edges;

        info!(
            "Assigned {} concept identities and {} category identities",
            counts.concepts, counts.categories
        );

        Ok((graph, categories))
    }

    /// Compare catalog ids with the identities their sources would be
    /// assigned. Mismatched rows keep their ids; passages point at them.
    fn verify_catalog_identities(&mut self, catalog: &[CatalogDocument]) -> Result<()> {
        let expected = assign_document_identities(
            catalog.iter().map(|d| d.source.as_str()),
            self.config.collision_attempts,
        )?;

        let mut mismatches = 0;
        for doc in catalog {
            let assigned = expected.get(doc.source.trim()).map(|id| i64::from(*id));
            if assigned != Some(doc.id) {
                debug!(
                    "catalog {}: source {:?} has identity {:?}",
                    doc.id, doc.source, assigned
                );
                mismatches += 1;
            }
        }

        self.report.counts.catalog_identity_mismatches = mismatches;
        if mismatches > 0 {
            let msg = format!(
                "{} catalog rows have ids that do not match their source identity",
                mismatches
            );
            warn!("{}", msg);
            self.report.warnings.push(msg);
        }
        Ok(())
    }

    fn compute_edges(
        &mut self,
        graph: &mut ConceptGraph,
        categories: &mut CategorySet,
        sources: &Sources,
    ) {
        let linker = LexicalLinker::new(self.config.min_word_length, self.config.max_related);
        graph.attach_lexical(&linker);
        graph.attach_synonyms(&self.taxonomy);

        let counts = &mut self.report.counts;
        counts.related_edges = graph.related_edges;
        counts.concepts_carried_forward = graph.carry_forward(&sources.previous_concepts);
        counts.categories_carried_forward = categories.carry_forward(&sources.previous_categories);

        info!(
            "Computed edges: {} co-occurrence, {} lexical, {} category",
            counts.adjacency_edges, counts.related_edges, counts.category_related_edges
        );
    }

    /// Final row sets for all four tables, plus the concept digest.
    fn assemble_rows(
        &mut self,
        graph: ConceptGraph,
        categories: CategorySet,
        sources: Sources,
    ) -> Result<Rows> {
        let catalog: Vec<CatalogDocument> = sources
            .catalog
            .into_iter()
            .map(|doc| {
                let resolved = graph.resolve_names(&doc.concept_names);
                CatalogDocument {
                    concept_ids: resolved.concept_ids,
                    concept_names: resolved.concept_names,
                    category_ids: categories.categories_of(doc.id).to_vec(),
                    ..doc
                }
            })
            .collect();

        let mut orphans = 0;
        let passages: Vec<Passage> = sources
            .passages
            .into_iter()
            .map(|p| {
                if !categories.has_document(p.catalog_id) {
                    orphans += 1;
                    debug!("Passage {} has unknown owner {}", p.id, p.catalog_id);
                }
                let resolved = graph.passages.get(&p.id).cloned().unwrap_or_default();
                Passage {
                    concept_ids: resolved.concept_ids,
                    concept_names: resolved.concept_names,
                    category_ids: categories.categories_of(p.catalog_id).to_vec(),
                    ..p
                }
            })
            .collect();

        let counts = &mut self.report.counts;
        counts.passages_reconciled = graph.passages.len();
        counts.dangling_references = graph.dangling_references();
        counts.orphan_passages = orphans;
        if counts.dangling_references > 0 {
            let msg = format!(
                "Dropped {} passage concept references with no concept row",
                counts.dangling_references
            );
            warn!("{}", msg);
            self.report.warnings.push(msg);
        }
        if orphans > 0 {
            let msg = format!("{} passages reference a missing catalog document", orphans);
            warn!("{}", msg);
            self.report.warnings.push(msg);
        }

        self.report.concept_digest = Some(concept_digest(&graph.concepts)?);

        Ok(Rows {
            concepts: graph.concepts,
            categories: categories.categories,
            catalog,
            passages,
        })
    }

    /// Stage, swap, then index one table. Index failures are recorded and
    /// do not fail the run.
    fn replace_table(
        &mut self,
        table: Table,
        rows: usize,
        stage: impl FnOnce(&S) -> Result<usize>,
    ) -> Result<()> {
        let written = stage(self.store)?;
        self.store.swap_staged(table, rows)?;
        self.report.counts.rows_written += written;
        self.report.tables_written.push(table.name().to_string());
        info!("Replaced table {} ({} rows)", table, written);

        if let Err(e) = self.store.create_indexes(table) {
            let msg = format!("Index build failed on {}: {}", table, e);
            warn!("{}", msg);
            self.report.counts.index_failures += 1;
            self.report.warnings.push(msg);
        }
        Ok(())
    }
}

/// SHA-256 over the serialized concept rows.
pub fn concept_digest(concepts: &[Concept]) -> Result<String> {
    let mut hasher = Sha256::new();
    for concept in concepts {
        hasher.update(serde_json::to_vec(concept)?);
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}
