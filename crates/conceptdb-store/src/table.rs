//! Table names and the store operations a rebuild depends on.

use conceptdb_core::Result;

use crate::types::*;

/// The four tables the rebuild touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Catalog,
    Passages,
    Concepts,
    Categories,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Passages => "passages",
            Self::Concepts => "concepts",
            Self::Categories => "categories",
        }
    }

    /// Name the next version of this table is written under before the swap.
    pub fn staging_name(self) -> String {
        format!("{}__staging", self.name())
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Bulk-read / staged-write interface over the table store.
///
/// Every write goes to a staging table first; [`TableStore::swap_staged`]
/// replaces the live table in one step. There is no row-level update.
pub trait TableStore {
    fn table_exists(&self, table: Table) -> Result<bool>;
    fn count_rows(&self, table: Table) -> Result<usize>;

    /// Reads return at most `limit` rows ordered by id.
    fn read_catalog(&self, limit: usize) -> Result<Vec<CatalogDocument>>;
    fn read_passages(&self, limit: usize) -> Result<Vec<Passage>>;
    fn read_concepts(&self, limit: usize) -> Result<Vec<Concept>>;
    fn read_categories(&self, limit: usize) -> Result<Vec<Category>>;

    /// Replace the staging table with `rows`. Returns rows written.
    fn stage_catalog(&self, rows: &[CatalogDocument]) -> Result<usize>;
    fn stage_passages(&self, rows: &[Passage]) -> Result<usize>;
    fn stage_concepts(&self, rows: &[Concept]) -> Result<usize>;
    fn stage_categories(&self, rows: &[Category]) -> Result<usize>;

    /// Verify the staged row count, then drop the live table and rename the
    /// staging table into its place.
    fn swap_staged(&self, table: Table, expected_rows: usize) -> Result<()>;

    /// Best-effort secondary indexes on the live table.
    fn create_indexes(&self, table: Table) -> Result<()>;
}
