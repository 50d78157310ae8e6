//! Table DDL. List columns are JSON arrays in TEXT, vectors are f32 BLOBs.
//!
//! DDL is generated per table name so the same shape can be created under a
//! staging name and swapped into place.

pub fn catalog_sql(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            id INTEGER PRIMARY KEY,
            source TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            concept_ids TEXT NOT NULL DEFAULT '[0]',
            concept_names TEXT NOT NULL DEFAULT '[\"\"]',
            category_names TEXT NOT NULL DEFAULT '[\"\"]',
            category_ids TEXT NOT NULL DEFAULT '[0]',
            vector BLOB
        );"
    )
}

pub fn passages_sql(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            id INTEGER PRIMARY KEY,
            catalog_id INTEGER NOT NULL,
            text TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            concept_ids TEXT NOT NULL DEFAULT '[0]',
            concept_names TEXT NOT NULL DEFAULT '[\"\"]',
            category_ids TEXT NOT NULL DEFAULT '[0]',
            concept_density REAL NOT NULL DEFAULT 0,
            vector BLOB,
            is_reference INTEGER NOT NULL DEFAULT 0,
            has_math INTEGER NOT NULL DEFAULT 0,
            has_extraction_issue INTEGER NOT NULL DEFAULT 0
        );"
    )
}

pub fn concepts_sql(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            id INTEGER PRIMARY KEY,
            concept TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            catalog_ids TEXT NOT NULL,
            chunk_ids TEXT NOT NULL,
            adjacent_ids TEXT NOT NULL,
            related_ids TEXT NOT NULL,
            synonyms TEXT NOT NULL,
            broader_terms TEXT NOT NULL,
            narrower_terms TEXT NOT NULL,
            weight REAL NOT NULL DEFAULT 0,
            vector BLOB
        );"
    )
}

pub fn categories_sql(name: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            id INTEGER PRIMARY KEY,
            category TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            parent_category_id INTEGER NOT NULL DEFAULT 0,
            aliases TEXT NOT NULL,
            related_categories TEXT NOT NULL,
            document_count INTEGER NOT NULL DEFAULT 0,
            chunk_count INTEGER NOT NULL DEFAULT 0,
            concept_count INTEGER NOT NULL DEFAULT 0,
            vector BLOB
        );"
    )
}

/// Secondary indexes, created after a swap. Failure only costs lookup speed.
pub fn index_sql(table: &str) -> Option<String> {
    match table {
        "catalog" => Some("CREATE INDEX IF NOT EXISTS idx_catalog_source ON catalog(source);".into()),
        "passages" => Some(
            "CREATE INDEX IF NOT EXISTS idx_passages_catalog_id ON passages(catalog_id);".into(),
        ),
        "concepts" => Some(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_concepts_concept ON concepts(concept);".into(),
        ),
        "categories" => Some(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_categories_category ON categories(category);"
                .into(),
        ),
        _ => None,
    }
}
