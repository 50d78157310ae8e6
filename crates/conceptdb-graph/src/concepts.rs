//! Concept graph builder.
//!
//! Aggregates per-document concept mentions into canonical concepts, assigns
//! identities in sorted-name order, builds the co-occurrence graph and the
//! reverse concept → passage mapping.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use tracing::{debug, info};

use conceptdb_core::{normalize_name, IdentityRegistry, Result};
use conceptdb_store::{CatalogDocument, Concept, Passage};

use crate::lexical::LexicalLinker;
use crate::taxonomy::Taxonomy;
use crate::terms::derive_term_hierarchy;

/// Concept names extracted for one catalog document.
#[derive(Debug, Clone, Default)]
pub struct DocumentConceptMentions {
    pub catalog_id: i64,
    pub concept_names: Vec<String>,
}

impl From<&CatalogDocument> for DocumentConceptMentions {
    fn from(doc: &CatalogDocument) -> Self {
        Self {
            catalog_id: doc.id,
            concept_names: doc.concept_names.clone(),
        }
    }
}

/// Concept references carried by one passage.
///
/// Names win over ids: ids may be stale from a previous rebuild, names are
/// re-hashed. Ids are only consulted when a passage carries no names.
#[derive(Debug, Clone, Default)]
pub struct PassageMentions {
    pub passage_id: i64,
    pub concept_names: Vec<String>,
    pub concept_ids: Vec<i64>,
}

impl From<&Passage> for PassageMentions {
    fn from(p: &Passage) -> Self {
        Self {
            passage_id: p.id,
            concept_names: p.concept_names.clone(),
            concept_ids: p.concept_ids.clone(),
        }
    }
}

/// A row's concept references rewritten against the rebuilt concept set.
/// `concept_ids[i]` and `concept_names[i]` name the same concept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConcepts {
    pub concept_ids: Vec<i64>,
    pub concept_names: Vec<String>,
    /// References with no matching concept; dropped.
    pub dangling: usize,
}

/// Output of [`ConceptGraphBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    /// One row per distinct normalized name, ordered by name.
    pub concepts: Vec<Concept>,
    pub passages: BTreeMap<i64, ResolvedConcepts>,
    pub documents_skipped: usize,
    pub adjacency_edges: usize,
    pub related_edges: usize,
    by_name: HashMap<String, usize>,
    by_id: HashMap<i64, usize>,
}

impl ConceptGraph {
    pub fn id_of(&self, name: &str) -> Option<i64> {
        self.by_name
            .get(&normalize_name(name))
            .map(|&i| self.concepts[i].id)
    }

    pub fn get(&self, id: i64) -> Option<&Concept> {
        self.by_id.get(&id).map(|&i| &self.concepts[i])
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Rewrite a name list into parallel id/name arrays.
    ///
    /// Unknown and blank names are dropped; duplicates keep their first
    /// spelling.
    pub fn resolve_names(&self, names: &[String]) -> ResolvedConcepts {
        let mut out = ResolvedConcepts::default();
        for raw in names {
            let normalized = normalize_name(raw);
            if normalized.is_empty() {
                continue;
            }
            match self.id_of(&normalized) {
                Some(id) if !out.concept_ids.contains(&id) => {
                    out.concept_ids.push(id);
                    out.concept_names.push(raw.trim().to_string());
                }
                Some(_) => {}
                // No document mentions this name any more. It is removed from
                // the rewritten passage for good; only the count survives.
                None => out.dangling += 1,
            }
        }
        out
    }

    /// Keep the ids that still exist, paired with their canonical names.
    pub fn resolve_ids(&self, ids: &[i64]) -> ResolvedConcepts {
        let mut out = ResolvedConcepts::default();
        for &id in ids {
            match self.get(id) {
                Some(c) if !out.concept_ids.contains(&id) => {
                    out.concept_ids.push(id);
                    out.concept_names.push(c.concept.clone());
                }
                Some(_) => {}
                None => out.dangling += 1,
            }
        }
        out
    }

    pub fn dangling_references(&self) -> usize {
        self.passages.values().map(|p| p.dangling).sum()
    }

    /// Fill `related_ids` and broader/narrower terms from concept names.
    pub fn attach_lexical(&mut self, linker: &LexicalLinker) {
        let index = linker.index(self.concepts.iter().map(|c| (c.id, c.concept.as_str())));
        let related = linker.link_indexed(&index);
        let names: BTreeMap<i64, String> = self
            .concepts
            .iter()
            .map(|c| (c.id, c.concept.clone()))
            .collect();
        let hierarchy = derive_term_hierarchy(&index, &names, linker.max_links_per_concept);

        self.related_edges = 0;
        for concept in &mut self.concepts {
            concept.related_ids = related.get(&concept.id).cloned().unwrap_or_default();
            concept.broader_terms = hierarchy.broader_of(concept.id);
            concept.narrower_terms = hierarchy.narrower_of(concept.id);
            self.related_edges += concept.related_ids.len();
        }
        debug!(
            "Lexical linking: {} tokens, {} related edges",
            index.vocabulary_size(),
            self.related_edges
        );
    }

    /// Synonyms from the taxonomy's concept table.
    pub fn attach_synonyms(&mut self, taxonomy: &Taxonomy) {
        for concept in &mut self.concepts {
            concept.synonyms = taxonomy
                .synonyms(&concept.concept)
                .iter()
                .filter(|s| **s != concept.concept)
                .cloned()
                .collect();
        }
    }

    /// Carry summaries and vectors over from the previous concept table by
    /// name. Returns how many concepts picked something up.
    pub fn carry_forward(&mut self, previous: &[Concept]) -> usize {
        let prior: HashMap<String, &Concept> = previous
            .iter()
            .map(|c| (normalize_name(&c.concept), c))
            .collect();
        let mut carried = 0;
        for concept in &mut self.concepts {
            if let Some(old) = prior.get(&concept.concept) {
                let mut touched = false;
                if concept.summary.is_empty() && !old.summary.is_empty() {
                    concept.summary = old.summary.clone();
                    touched = true;
                }
                if concept.vector.is_empty() && !old.vector.is_empty() {
                    concept.vector = old.vector.clone();
                    touched = true;
                }
                if touched {
                    carried += 1;
                }
            }
        }
        carried
    }
}

/// Builds a [`ConceptGraph`] from source mentions.
#[derive(Debug, Clone, Default)]
pub struct ConceptGraphBuilder {
    /// Cap on `adjacent_ids`, keeping the most frequent co-occurrences.
    pub max_adjacent: Option<usize>,
}

impl ConceptGraphBuilder {
    pub fn new(max_adjacent: Option<usize>) -> Self {
        Self { max_adjacent }
    }

    pub fn build(
        &self,
        documents: &[DocumentConceptMentions],
        passages: &[PassageMentions],
        registry: &mut IdentityRegistry,
    ) -> Result<ConceptGraph> {
        // 1. Accumulate mentions per normalized name.
        let mut mentions: BTreeMap<String, BTreeSet<i64>> = BTreeMap::new();
        let mut per_document: Vec<Vec<String>> = Vec::with_capacity(documents.len());
        let mut documents_skipped = 0;

        for doc in documents {
            let names = distinct_normalized(&doc.concept_names);
            if names.is_empty() {
                debug!("Document {} has no concepts; skipped", doc.catalog_id);
                documents_skipped += 1;
                continue;
            }
            for name in &names {
                mentions.entry(name.clone()).or_default().insert(doc.catalog_id);
            }
            per_document.push(names);
        }

        // 2. Identities in sorted-name order.
        let assigned = registry.assign_sorted(mentions.keys().map(String::as_str))?;
        let ids: BTreeMap<&str, i64> = assigned
            .iter()
            .map(|(name, &id)| (name.as_str(), i64::from(id)))
            .collect();

        // 3. Co-occurrence.
        let cooccurrence = Cooccurrence::build(ids.values().copied(), &per_document, &ids);
        let adjacency_edges = cooccurrence.edge_count();

        // 4. Reverse passage mapping.
        let mut graph = ConceptGraph {
            documents_skipped,
            adjacency_edges,
            ..Default::default()
        };
        let total_documents = per_document.len().max(1) as f32;
        for (name, docs) in &mentions {
            let id = ids[name.as_str()];
            graph.by_name.insert(name.clone(), graph.concepts.len());
            graph.by_id.insert(id, graph.concepts.len());
            graph.concepts.push(Concept {
                id,
                concept: name.clone(),
                catalog_ids: docs.iter().copied().collect(),
                adjacent_ids: cooccurrence.neighbours(id, self.max_adjacent),
                weight: docs.len() as f32 / total_documents,
                ..Default::default()
            });
        }

        let mut chunk_seen: HashMap<i64, HashSet<i64>> = HashMap::new();
        for passage in passages {
            let resolved = if passage.concept_names.iter().any(|n| !n.trim().is_empty()) {
                graph.resolve_names(&passage.concept_names)
            } else {
                graph.resolve_ids(&passage.concept_ids)
            };
            for &concept_id in &resolved.concept_ids {
                if chunk_seen
                    .entry(concept_id)
                    .or_default()
                    .insert(passage.passage_id)
                {
                    let idx = graph.by_id[&concept_id];
                    graph.concepts[idx].chunk_ids.push(passage.passage_id);
                }
            }
            graph.passages.insert(passage.passage_id, resolved);
        }

        info!(
            "Concept graph: {} concepts from {} documents ({} skipped), {} co-occurrence edges, {} passages mapped",
            graph.concepts.len(),
            per_document.len(),
            documents_skipped,
            adjacency_edges,
            graph.passages.len()
        );

        Ok(graph)
    }
}

fn distinct_normalized(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in names {
        let n = normalize_name(raw);
        if !n.is_empty() && !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

/// Undirected co-occurrence graph; edge weight counts shared documents.
struct Cooccurrence {
    graph: UnGraph<i64, u32>,
    nodes: HashMap<i64, NodeIndex>,
}

impl Cooccurrence {
    fn build(
        concept_ids: impl Iterator<Item = i64>,
        per_document: &[Vec<String>],
        ids: &BTreeMap<&str, i64>,
    ) -> Self {
        let mut graph = UnGraph::<i64, u32>::default();
        let nodes: HashMap<i64, NodeIndex> = concept_ids
            .map(|id| (id, graph.add_node(id)))
            .collect();

        for names in per_document {
            let mut doc_ids: Vec<i64> = names.iter().map(|n| ids[n.as_str()]).collect();
            doc_ids.sort_unstable();
            doc_ids.dedup();
            for (i, a) in doc_ids.iter().enumerate() {
                for b in &doc_ids[i + 1..] {
                    let (na, nb) = (nodes[a], nodes[b]);
                    match graph.find_edge(na, nb) {
                        Some(edge) => graph[edge] += 1,
                        None => {
                            graph.add_edge(na, nb, 1);
                        }
                    }
                }
            }
        }

        Self { graph, nodes }
    }

    fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Neighbours by co-occurrence count descending, id ascending.
    fn neighbours(&self, id: i64, cap: Option<usize>) -> Vec<i64> {
        let Some(&node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let mut ranked: Vec<(i64, u32)> = self
            .graph
            .edges(node)
            .map(|e| {
                let other = if e.source() == node { e.target() } else { e.source() };
                (self.graph[other], *e.weight())
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        if let Some(cap) = cap {
            ranked.truncate(cap);
        }
        ranked.into_iter().map(|(other, _)| other).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptdb_core::hash_identity;

    fn doc(id: i64, names: &[&str]) -> DocumentConceptMentions {
        DocumentConceptMentions {
            catalog_id: id,
            concept_names: names.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn passage(id: i64, names: &[&str], ids: &[i64]) -> PassageMentions {
        PassageMentions {
            passage_id: id,
            concept_names: names.iter().map(|s| s.to_string()).collect(),
            concept_ids: ids.to_vec(),
        }
    }

    fn build(docs: &[DocumentConceptMentions], passages: &[PassageMentions]) -> ConceptGraph {
        let mut registry = IdentityRegistry::new(64);
        ConceptGraphBuilder::default()
            .build(docs, passages, &mut registry)
            .unwrap()
    }

    fn id(name: &str) -> i64 {
        i64::from(hash_identity(name))
    }

    #[test]
    fn test_aggregates_by_normalized_name() {
        let graph = build(
            &[doc(1, &["Rust", " rust "]), doc(2, &["RUST", "Tokio"])],
            &[],
        );
        assert_eq!(graph.concepts.len(), 2);
        let rust = graph.get(id("rust")).unwrap();
        assert_eq!(rust.concept, "rust");
        assert_eq!(rust.catalog_ids, vec![1, 2]);
        assert_eq!(rust.weight, 1.0);
        assert_eq!(graph.get(id("tokio")).unwrap().weight, 0.5);
    }

    #[test]
    fn test_empty_documents_are_skipped() {
        let graph = build(&[doc(1, &[]), doc(2, &["", "  "]), doc(3, &["graph"])], &[]);
        assert_eq!(graph.documents_skipped, 2);
        assert_eq!(graph.concepts.len(), 1);
    }

    #[test]
    fn test_cooccurrence_is_mutual_and_ranked() {
        let graph = build(
            &[
                doc(1, &["a1", "b1", "c1"]),
                doc(2, &["a1", "c1"]),
                doc(3, &["d1"]),
            ],
            &[],
        );
        let a = graph.get(id("a1")).unwrap();
        // c1 co-occurs with a1 twice, b1 once.
        assert_eq!(a.adjacent_ids, vec![id("c1"), id("b1")]);
        let b = graph.get(id("b1")).unwrap();
        assert!(b.adjacent_ids.contains(&id("a1")));
        assert!(graph.get(id("d1")).unwrap().adjacent_ids.is_empty());
        assert_eq!(graph.adjacency_edges, 3);
    }

    #[test]
    fn test_adjacency_cap_keeps_most_frequent() {
        let docs = [doc(1, &["x1", "y1", "z1"]), doc(2, &["x1", "z1"])];
        let mut registry = IdentityRegistry::new(64);
        let graph = ConceptGraphBuilder::new(Some(1))
            .build(&docs, &[], &mut registry)
            .unwrap();
        assert_eq!(graph.get(id("x1")).unwrap().adjacent_ids, vec![id("z1")]);
    }

    #[test]
    fn test_chunk_ids_preserve_discovery_order_and_dedupe() {
        let graph = build(
            &[doc(1, &["alpha", "beta"])],
            &[
                passage(30, &["beta", "Alpha"], &[]),
                passage(10, &["alpha", "alpha"], &[]),
                passage(20, &["gamma"], &[]),
            ],
        );
        let alpha = graph.get(id("alpha")).unwrap();
        assert_eq!(alpha.chunk_ids, vec![30, 10]);
        assert_eq!(graph.get(id("beta")).unwrap().chunk_ids, vec![30]);
        assert_eq!(graph.passages[&20].dangling, 1);
        assert!(graph.passages[&20].concept_ids.is_empty());
        assert_eq!(graph.dangling_references(), 1);
    }

    #[test]
    fn test_passage_ids_used_when_names_absent() {
        let graph = build(
            &[doc(1, &["alpha"])],
            &[passage(5, &[], &[id("alpha"), 999])],
        );
        let resolved = &graph.passages[&5];
        assert_eq!(resolved.concept_ids, vec![id("alpha")]);
        assert_eq!(resolved.concept_names, vec!["alpha".to_string()]);
        assert_eq!(resolved.dangling, 1);
    }

    #[test]
    fn test_build_is_input_order_independent() {
        let forward = [doc(1, &["b!", "a@", "zeta"]), doc(2, &["zeta", "eta"])];
        let backward = [doc(2, &["eta", "zeta"]), doc(1, &["zeta", "a@", "b!"])];
        let g1 = build(&forward, &[]);
        let g2 = build(&backward, &[]);
        assert_eq!(g1.concepts, g2.concepts);

        // "a@" sorts before "b!", so "b!" takes the perturbed identity.
        assert_eq!(g1.id_of("a@"), Some(id("a@")));
        assert_eq!(g1.id_of("b!"), Some(id("b!#1")));
    }

    #[test]
    fn test_attach_lexical_and_hierarchy() {
        let mut graph = build(
            &[doc(1, &["military strategy"]), doc(2, &["strategy pattern", "strategy"])],
            &[],
        );
        graph.attach_lexical(&LexicalLinker::new(5, 20));
        let military = graph.get(id("military strategy")).unwrap();
        assert!(military.related_ids.contains(&id("strategy pattern")));
        assert_eq!(military.broader_terms, vec!["strategy".to_string()]);
        let strategy = graph.get(id("strategy")).unwrap();
        assert_eq!(
            strategy.narrower_terms,
            vec!["military strategy".to_string(), "strategy pattern".to_string()]
        );
        assert!(graph.related_edges > 0);
    }

    #[test]
    fn test_resolve_names_keeps_parallel_arrays() {
        let graph = build(&[doc(1, &["alpha", "beta"])], &[]);
        let resolved = graph.resolve_names(&[
            "Beta".to_string(),
            "unknown".to_string(),
            "beta".to_string(),
            "alpha".to_string(),
        ]);
        assert_eq!(resolved.concept_ids, vec![id("beta"), id("alpha")]);
        assert_eq!(resolved.concept_names, vec!["Beta", "alpha"]);
        assert_eq!(resolved.dangling, 1);
    }

    #[test]
    fn test_carry_forward_by_name() {
        let mut graph = build(&[doc(1, &["alpha"])], &[]);
        let previous = vec![Concept {
            id: 1,
            concept: "Alpha".into(),
            summary: "first letter".into(),
            vector: vec![0.1, 0.2],
            ..Default::default()
        }];
        assert_eq!(graph.carry_forward(&previous), 1);
        let alpha = graph.get(id("alpha")).unwrap();
        assert_eq!(alpha.summary, "first letter");
        assert_eq!(alpha.vector, vec![0.1, 0.2]);
    }

    #[test]
    fn test_synonyms_from_taxonomy() {
        let mut graph = build(&[doc(1, &["Machine Learning"])], &[]);
        graph.attach_synonyms(&Taxonomy::builtin().unwrap());
        assert_eq!(
            graph.get(id("machine learning")).unwrap().synonyms,
            vec!["ml".to_string()]
        );
    }
}
