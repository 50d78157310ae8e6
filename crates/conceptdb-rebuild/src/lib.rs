//! Rebuild of the derived concept and category tables.
//!
//! Reads the authoritative catalog and passage tables, recomputes concepts,
//! categories and their edges in memory, then replaces the derived tables
//! and the source identity columns through staged table swaps.

pub mod orchestrator;
pub mod types;
pub mod validate;

pub use orchestrator::RebuildOrchestrator;
pub use types::*;
pub use validate::{print_report, validate, ValidationReport};
