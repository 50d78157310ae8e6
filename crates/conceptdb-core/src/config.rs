//! Configuration and data directory management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default minimum token length for lexical linking.
pub const DEFAULT_MIN_WORD_LENGTH: usize = 5;
/// Default cap on lexical links per concept.
pub const DEFAULT_MAX_RELATED: usize = 20;
/// Default cap on related categories per category.
pub const DEFAULT_MAX_RELATED_CATEGORIES: usize = 5;
/// Default number of perturbation attempts before giving up on a name.
pub const DEFAULT_COLLISION_ATTEMPTS: u32 = 1024;

/// Paths to all ConceptDB data locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Database file (`data/conceptdb.db`).
    pub database: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            database: root.join("conceptdb.db"),
            root,
        })
    }
}

/// Tunables for a rebuild run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildConfig {
    pub data_paths: DataPaths,
    /// Tokens shorter than this never produce lexical links.
    pub min_word_length: usize,
    /// Upper bound on `related_ids` per concept.
    pub max_related: usize,
    /// Optional cap on `adjacent_ids` per concept. `None` keeps every edge.
    pub max_adjacent: Option<usize>,
    /// Upper bound on `related_categories` per category.
    pub max_related_categories: usize,
    /// Perturbation attempts before `IdentityCollisionExhaustion`.
    pub collision_attempts: u32,
    /// External taxonomy file. The built-in table is used when absent.
    pub taxonomy_path: Option<PathBuf>,
}

impl RebuildConfig {
    /// Defaults for a data directory, without consulting the environment.
    pub fn new(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            data_paths: DataPaths::new(data_dir)?,
            min_word_length: DEFAULT_MIN_WORD_LENGTH,
            max_related: DEFAULT_MAX_RELATED,
            max_adjacent: None,
            max_related_categories: DEFAULT_MAX_RELATED_CATEGORIES,
            collision_attempts: DEFAULT_COLLISION_ATTEMPTS,
            taxonomy_path: None,
        })
    }

    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::new(data_dir)?;

        if let Some(v) = env_parse::<usize>("CONCEPTDB_MIN_WORD_LENGTH")? {
            config.min_word_length = v;
        }
        if let Some(v) = env_parse::<usize>("CONCEPTDB_MAX_RELATED")? {
            config.max_related = v;
        }
        if let Some(v) = env_parse::<usize>("CONCEPTDB_MAX_ADJACENT")? {
            config.max_adjacent = Some(v);
        }
        if let Some(v) = env_parse::<usize>("CONCEPTDB_MAX_RELATED_CATEGORIES")? {
            config.max_related_categories = v;
        }
        if let Some(v) = env_parse::<u32>("CONCEPTDB_COLLISION_ATTEMPTS")? {
            if v == 0 {
                return Err(Error::Config(
                    "CONCEPTDB_COLLISION_ATTEMPTS must be at least 1".to_string(),
                ));
            }
            config.collision_attempts = v;
        }
        config.taxonomy_path = std::env::var("CONCEPTDB_TAXONOMY").ok().map(PathBuf::from);

        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a valid number: {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}
