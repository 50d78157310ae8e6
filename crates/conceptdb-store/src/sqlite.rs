//! SQLite implementation of [`TableStore`].
//!
//! Tables are only ever replaced wholesale: rows are written into a
//! `<table>__staging` table, the staged count is verified, and a single
//! transaction drops the live table and renames the staging table into place.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, Statement};
use tracing::{debug, info};

use crate::codec::{
    blob_to_vector, decode_json_list, decode_source_list, encode_json_list, encode_source_list,
    vector_to_blob,
};
use crate::schema::{categories_sql, catalog_sql, concepts_sql, index_sql, passages_sql};
use crate::table::{Table, TableStore};
use crate::types::*;
use conceptdb_core::{assign_document_identities, Error, Result};

const CATALOG_INSERT: &str = "INSERT OR REPLACE INTO {table} \
    (id, source, summary, concept_ids, concept_names, category_names, category_ids, vector) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

const PASSAGES_INSERT: &str = "INSERT OR REPLACE INTO {table} \
    (id, catalog_id, text, location, concept_ids, concept_names, category_ids, \
     concept_density, vector, is_reference, has_math, has_extraction_issue) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const CONCEPTS_INSERT: &str = "INSERT INTO {table} \
    (id, concept, summary, catalog_ids, chunk_ids, adjacent_ids, related_ids, \
     synonyms, broader_terms, narrower_terms, weight, vector) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)";

const CATEGORIES_INSERT: &str = "INSERT INTO {table} \
    (id, category, description, parent_category_id, aliases, related_categories, \
     document_count, chunk_count, concept_count, vector) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

fn db_err(e: rusqlite::Error) -> Error {
    Error::Database(e.to_string())
}

/// SQLite-backed table store. Single writer; the mutex only serialises
/// access within one process.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `data_dir` is the directory (e.g., `data/`). The file will be `data_dir/conceptdb.db`.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).map_err(|e| Error::Storage(e.to_string()))?;
        Self::open_file(data_dir.join("conceptdb.db"))
    }

    /// Open a specific database file.
    pub fn open_file(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA cache_size = -65536;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(db_err)?;

        info!("SqliteStore opened: path={}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Source table loading
    // ---------------------------------------------------------------

    /// Create empty `catalog` and `passages` tables if they are missing.
    ///
    /// Loaders call this; a rebuild never does, so a missing source table
    /// stays a hard error there.
    pub fn ensure_source_tables(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(&format!(
            "{}\n{}",
            catalog_sql(Table::Catalog.name()),
            passages_sql(Table::Passages.name())
        ))
        .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    /// Insert or replace catalog rows in the live table.
    pub fn insert_catalog(&self, rows: &[CatalogDocument]) -> Result<usize> {
        self.ensure_source_tables()?;
        self.insert_rows(Table::Catalog.name(), CATALOG_INSERT, rows, bind_catalog)
    }

    /// Insert catalog rows with ids assigned from their source paths.
    ///
    /// Identities are assigned over the stored sources plus the new ones, in
    /// sorted order, so reloading a source replaces its row. Fails without
    /// writing if a new source would move the id of a stored one.
    pub fn load_catalog(
        &self,
        mut rows: Vec<CatalogDocument>,
        max_attempts: u32,
    ) -> Result<Vec<CatalogDocument>> {
        self.ensure_source_tables()?;
        let existing = self.read_catalog(self.count_rows(Table::Catalog)?)?;

        for row in &rows {
            if row.source.trim().is_empty() {
                return Err(Error::MalformedRecord {
                    table: Table::Catalog.name().to_string(),
                    id: row.id,
                    reason: "empty source".into(),
                });
            }
        }

        let ids = assign_document_identities(
            existing
                .iter()
                .chain(rows.iter())
                .map(|d| d.source.as_str()),
            max_attempts,
        )?;

        for stored in &existing {
            let assigned = ids.get(stored.source.trim()).map(|id| i64::from(*id));
            if assigned != Some(stored.id) {
                return Err(Error::Storage(format!(
                    "catalog {} ({}) would be reassigned to {:?}; reload the whole catalog",
                    stored.id, stored.source, assigned
                )));
            }
        }

        for row in &mut rows {
            if let Some(id) = ids.get(row.source.trim()) {
                row.id = i64::from(*id);
            }
        }

        let written = self.insert_catalog(&rows)?;
        debug!("Loaded {} catalog rows ({} already stored)", written, existing.len());
        Ok(rows)
    }

    /// Insert or replace passage rows in the live table.
    pub fn insert_passages(&self, rows: &[Passage]) -> Result<usize> {
        self.ensure_source_tables()?;
        self.insert_rows(Table::Passages.name(), PASSAGES_INSERT, rows, bind_passage)
    }

    /// Per-table row counts.
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |table: Table| -> Result<Option<usize>> {
            if self.table_exists(table)? {
                Ok(Some(self.count_rows(table)?))
            } else {
                Ok(None)
            }
        };

        let db_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            catalog: count(Table::Catalog)?,
            passages: count(Table::Passages)?,
            concepts: count(Table::Concepts)?,
            categories: count(Table::Categories)?,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn exists_in(conn: &Connection, name: &str) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    fn count_in(conn: &Connection, name: &str) -> Result<usize> {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", name), [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }

    fn read_rows<T>(
        &self,
        table: Table,
        limit: usize,
        map: fn(&rusqlite::Row<'_>) -> T,
    ) -> Result<Vec<T>> {
        let conn = self.conn.lock();
        if !Self::exists_in(&conn, table.name())? {
            return Err(Error::MissingTable(table.name().to_string()));
        }
        let sql = format!("SELECT * FROM {} ORDER BY id LIMIT ?1", table.name());
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| Ok(map(row)))
            .map_err(db_err)?;
        let out: Vec<T> = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)?;
        debug!("Read {} rows from {}", out.len(), table);
        Ok(out)
    }

    fn insert_rows<T>(
        &self,
        target: &str,
        insert: &str,
        rows: &[T],
        bind: fn(&mut Statement<'_>, &T) -> Result<()>,
    ) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare(&insert.replace("{table}", target))
                .map_err(db_err)?;
            for row in rows {
                bind(&mut stmt, row)?;
            }
        }
        tx.commit().map_err(db_err)?;
        Ok(rows.len())
    }

    fn stage_rows<T>(
        &self,
        table: Table,
        ddl: fn(&str) -> String,
        insert: &str,
        rows: &[T],
        bind: fn(&mut Statement<'_>, &T) -> Result<()>,
    ) -> Result<usize> {
        let staging = table.staging_name();
        {
            let conn = self.conn.lock();
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {};\n{}", staging, ddl(&staging)))
                .map_err(db_err)?;
        }
        let written = self.insert_rows(&staging, insert, rows, bind)?;
        debug!("Staged {} rows into {}", written, staging);
        Ok(written)
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn row_to_catalog(row: &rusqlite::Row<'_>) -> CatalogDocument {
        let id: i64 = row.get("id").unwrap_or(0);
        let list = |col: &str| row.get::<_, Option<String>>(col).ok().flatten();
        let mut malformed = Vec::new();
        let concept_ids = decode_source_list(
            list("concept_ids").as_deref(),
            "catalog",
            id,
            "concept_ids",
            &mut malformed,
        );
        let concept_names = decode_source_list(
            list("concept_names").as_deref(),
            "catalog",
            id,
            "concept_names",
            &mut malformed,
        );
        let category_names = decode_source_list(
            list("category_names").as_deref(),
            "catalog",
            id,
            "category_names",
            &mut malformed,
        );
        let category_ids = decode_source_list(
            list("category_ids").as_deref(),
            "catalog",
            id,
            "category_ids",
            &mut malformed,
        );
        CatalogDocument {
            id,
            source: row.get("source").unwrap_or_default(),
            summary: row.get("summary").unwrap_or_default(),
            concept_ids,
            concept_names,
            category_names,
            category_ids,
            vector: blob_to_vector(
                row.get::<_, Option<Vec<u8>>>("vector")
                    .ok()
                    .flatten()
                    .as_deref(),
            ),
            malformed,
        }
    }

    fn row_to_passage(row: &rusqlite::Row<'_>) -> Passage {
        let id: i64 = row.get("id").unwrap_or(0);
        let list = |col: &str| row.get::<_, Option<String>>(col).ok().flatten();
        let mut malformed = Vec::new();
        let concept_ids = decode_source_list(
            list("concept_ids").as_deref(),
            "passages",
            id,
            "concept_ids",
            &mut malformed,
        );
        let concept_names = decode_source_list(
            list("concept_names").as_deref(),
            "passages",
            id,
            "concept_names",
            &mut malformed,
        );
        let category_ids = decode_source_list(
            list("category_ids").as_deref(),
            "passages",
            id,
            "category_ids",
            &mut malformed,
        );
        Passage {
            id,
            catalog_id: row.get("catalog_id").unwrap_or(0),
            text: row.get("text").unwrap_or_default(),
            location: row.get("location").unwrap_or_default(),
            concept_ids,
            concept_names,
            category_ids,
            concept_density: row.get::<_, f64>("concept_density").unwrap_or(0.0) as f32,
            vector: blob_to_vector(
                row.get::<_, Option<Vec<u8>>>("vector")
                    .ok()
                    .flatten()
                    .as_deref(),
            ),
            is_reference: row.get("is_reference").unwrap_or(false),
            has_math: row.get("has_math").unwrap_or(false),
            has_extraction_issue: row.get("has_extraction_issue").unwrap_or(false),
            malformed,
        }
    }

    fn row_to_concept(row: &rusqlite::Row<'_>) -> Concept {
        let id: i64 = row.get("id").unwrap_or(0);
        let list = |col: &str| row.get::<_, Option<String>>(col).ok().flatten();
        Concept {
            id,
            concept: row.get("concept").unwrap_or_default(),
            summary: row.get("summary").unwrap_or_default(),
            catalog_ids: decode_json_list(list("catalog_ids").as_deref(), "concepts", id),
            chunk_ids: decode_json_list(list("chunk_ids").as_deref(), "concepts", id),
            adjacent_ids: decode_json_list(list("adjacent_ids").as_deref(), "concepts", id),
            related_ids: decode_json_list(list("related_ids").as_deref(), "concepts", id),
            synonyms: decode_json_list(list("synonyms").as_deref(), "concepts", id),
            broader_terms: decode_json_list(list("broader_terms").as_deref(), "concepts", id),
            narrower_terms: decode_json_list(list("narrower_terms").as_deref(), "concepts", id),
            weight: row.get::<_, f64>("weight").unwrap_or(0.0) as f32,
            vector: blob_to_vector(
                row.get::<_, Option<Vec<u8>>>("vector")
                    .ok()
                    .flatten()
                    .as_deref(),
            ),
        }
    }

    fn row_to_category(row: &rusqlite::Row<'_>) -> Category {
        let id: i64 = row.get("id").unwrap_or(0);
        let list = |col: &str| row.get::<_, Option<String>>(col).ok().flatten();
        Category {
            id,
            category: row.get("category").unwrap_or_default(),
            description: row.get("description").unwrap_or_default(),
            parent_category_id: row.get("parent_category_id").unwrap_or(0),
            aliases: decode_json_list(list("aliases").as_deref(), "categories", id),
            related_categories: decode_json_list(
                list("related_categories").as_deref(),
                "categories",
                id,
            ),
            document_count: row.get("document_count").unwrap_or(0),
            chunk_count: row.get("chunk_count").unwrap_or(0),
            concept_count: row.get("concept_count").unwrap_or(0),
            vector: blob_to_vector(
                row.get::<_, Option<Vec<u8>>>("vector")
                    .ok()
                    .flatten()
                    .as_deref(),
            ),
        }
    }
}

fn bind_catalog(stmt: &mut Statement<'_>, d: &CatalogDocument) -> Result<()> {
    stmt.execute(params![
        d.id,
        d.source,
        d.summary,
        encode_source_list(&d.concept_ids, "concept_ids", &d.malformed)?,
        encode_source_list(&d.concept_names, "concept_names", &d.malformed)?,
        encode_source_list(&d.category_names, "category_names", &d.malformed)?,
        encode_source_list(&d.category_ids, "category_ids", &d.malformed)?,
        vector_to_blob(&d.vector),
    ])
    .map_err(db_err)?;
    Ok(())
}

fn bind_passage(stmt: &mut Statement<'_>, p: &Passage) -> Result<()> {
    stmt.execute(params![
        p.id,
        p.catalog_id,
        p.text,
        p.location,
        encode_source_list(&p.concept_ids, "concept_ids", &p.malformed)?,
        encode_source_list(&p.concept_names, "concept_names", &p.malformed)?,
        encode_source_list(&p.category_ids, "category_ids", &p.malformed)?,
        f64::from(p.concept_density),
        vector_to_blob(&p.vector),
        p.is_reference,
        p.has_math,
        p.has_extraction_issue,
    ])
    .map_err(db_err)?;
    Ok(())
}

fn bind_concept(stmt: &mut Statement<'_>, c: &Concept) -> Result<()> {
    stmt.execute(params![
        c.id,
        c.concept,
        c.summary,
        encode_json_list(&c.catalog_ids)?,
        encode_json_list(&c.chunk_ids)?,
        encode_json_list(&c.adjacent_ids)?,
        encode_json_list(&c.related_ids)?,
        encode_json_list(&c.synonyms)?,
        encode_json_list(&c.broader_terms)?,
        encode_json_list(&c.narrower_terms)?,
        f64::from(c.weight),
        vector_to_blob(&c.vector),
    ])
    .map_err(db_err)?;
    Ok(())
}

fn bind_category(stmt: &mut Statement<'_>, c: &Category) -> Result<()> {
    stmt.execute(params![
        c.id,
        c.category,
        c.description,
        c.parent_category_id,
        encode_json_list(&c.aliases)?,
        encode_json_list(&c.related_categories)?,
        c.document_count,
        c.chunk_count,
        c.concept_count,
        vector_to_blob(&c.vector),
    ])
    .map_err(db_err)?;
    Ok(())
}

impl TableStore for SqliteStore {
    fn table_exists(&self, table: Table) -> Result<bool> {
        let conn = self.conn.lock();
        Self::exists_in(&conn, table.name())
    }

    fn count_rows(&self, table: Table) -> Result<usize> {
        let conn = self.conn.lock();
        if !Self::exists_in(&conn, table.name())? {
            return Err(Error::MissingTable(table.name().to_string()));
        }
        Self::count_in(&conn, table.name())
    }

    fn read_catalog(&self, limit: usize) -> Result<Vec<CatalogDocument>> {
        self.read_rows(Table::Catalog, limit, Self::row_to_catalog)
    }

    fn read_passages(&self, limit: usize) -> Result<Vec<Passage>> {
        self.read_rows(Table::Passages, limit, Self::row_to_passage)
    }

    fn read_concepts(&self, limit: usize) -> Result<Vec<Concept>> {
        self.read_rows(Table::Concepts, limit, Self::row_to_concept)
    }

    fn read_categories(&self, limit: usize) -> Result<Vec<Category>> {
        self.read_rows(Table::Categories, limit, Self::row_to_category)
    }

    fn stage_catalog(&self, rows: &[CatalogDocument]) -> Result<usize> {
        self.stage_rows(Table::Catalog, catalog_sql, CATALOG_INSERT, rows, bind_catalog)
    }

    fn stage_passages(&self, rows: &[Passage]) -> Result<usize> {
        self.stage_rows(Table::Passages, passages_sql, PASSAGES_INSERT, rows, bind_passage)
    }

    fn stage_concepts(&self, rows: &[Concept]) -> Result<usize> {
        self.stage_rows(Table::Concepts, concepts_sql, CONCEPTS_INSERT, rows, bind_concept)
    }

    fn stage_categories(&self, rows: &[Category]) -> Result<usize> {
        self.stage_rows(
            Table::Categories,
            categories_sql,
            CATEGORIES_INSERT,
            rows,
            bind_category,
        )
    }

    fn swap_staged(&self, table: Table, expected_rows: usize) -> Result<()> {
        let staging = table.staging_name();
        let live = table.name();

        let mut conn = self.conn.lock();
        if !Self::exists_in(&conn, &staging)? {
            return Err(Error::Storage(format!("No staged data for {}", live)));
        }
        let staged = Self::count_in(&conn, &staging)?;
        if staged != expected_rows {
            return Err(Error::Storage(format!(
                "Staged {} rows for {}, expected {}; live table left untouched",
                staged, live, expected_rows
            )));
        }

        let partial = |e: rusqlite::Error| Error::PartialWriteFailure {
            table: live.to_string(),
            reason: e.to_string(),
        };
        let tx = conn.transaction().map_err(partial)?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {live};\nALTER TABLE {staging} RENAME TO {live};"
        ))
        .map_err(partial)?;
        tx.commit().map_err(partial)?;

        info!("Swapped {} ({} rows)", live, staged);
        Ok(())
    }

    fn create_indexes(&self, table: Table) -> Result<()> {
        let Some(sql) = index_sql(table.name()) else {
            return Ok(());
        };
        let conn = self.conn.lock();
        conn.execute_batch(&sql)
            .map_err(|e| Error::Storage(format!("Index creation on {} failed: {}", table, e)))?;
        Ok(())
    }
}
