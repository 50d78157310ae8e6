//! Rebuild types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rebuild state machine.
///
/// `Idle → ExtractingSources → AssigningIdentities → ComputingEdges →
/// WritingDerivedTables → UpdatingSourceTables → Done`, with `Failed`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildState {
    Idle,
    ExtractingSources,
    AssigningIdentities,
    ComputingEdges,
    WritingDerivedTables,
    UpdatingSourceTables,
    Done,
    Failed,
}

impl RebuildState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The state a successful stage advances to.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::ExtractingSources),
            Self::ExtractingSources => Some(Self::AssigningIdentities),
            Self::AssigningIdentities => Some(Self::ComputingEdges),
            Self::ComputingEdges => Some(Self::WritingDerivedTables),
            Self::WritingDerivedTables => Some(Self::UpdatingSourceTables),
            Self::UpdatingSourceTables => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ExtractingSources => "extracting_sources",
            Self::AssigningIdentities => "assigning_identities",
            Self::ComputingEdges => "computing_edges",
            Self::WritingDerivedTables => "writing_derived_tables",
            Self::UpdatingSourceTables => "updating_source_tables",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RebuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageCounts {
    // Extraction
    pub catalog_rows_read: usize,
    pub passage_rows_read: usize,
    pub previous_concepts: usize,
    pub previous_categories: usize,
    /// List columns that did not decode, across catalog and passages.
    pub malformed_records: usize,

    // Identities
    pub catalog_identity_mismatches: usize,
    pub concepts: usize,
    pub categories: usize,
    pub documents_skipped: usize,
    pub documents_without_categories: usize,

    // Edges
    pub adjacency_edges: usize,
    pub related_edges: usize,
    pub category_related_edges: usize,
    pub concepts_carried_forward: usize,
    pub categories_carried_forward: usize,

    // Source rewrite
    pub passages_reconciled: usize,
    pub dangling_references: usize,
    pub orphan_passages: usize,

    // Writes
    pub rows_written: usize,
    pub index_failures: usize,
}

/// Result of one rebuild run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RebuildState,
    /// The stage that was running when the rebuild failed.
    pub failed_in: Option<RebuildState>,
    pub error: Option<String>,
    pub counts: StageCounts,
    /// Tables replaced, in swap order.
    pub tables_written: Vec<String>,
    pub warnings: Vec<String>,
    /// SHA-256 over the concept rows, in write order.
    pub concept_digest: Option<String>,
    pub duration_ms: u64,
}

impl RebuildReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            state: RebuildState::Idle,
            failed_in: None,
            error: None,
            counts: StageCounts::default(),
            tables_written: Vec::new(),
            warnings: Vec::new(),
            concept_digest: None,
            duration_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == RebuildState::Done
    }
}
