//! ConceptDB Store: SQLite-backed tables with array columns and staged table swaps.

pub mod codec;
pub mod schema;
pub mod sqlite;
pub mod table;
pub mod types;

pub use sqlite::SqliteStore;
pub use table::{Table, TableStore};
pub use types::*;
