//! ConceptDB Core: error taxonomy, configuration, identity assignment, placeholder encoding.

pub mod config;
pub mod error;
pub mod identity;
pub mod placeholder;

pub use config::{DataPaths, RebuildConfig};
pub use error::{Error, Result};
pub use identity::{assign_document_identities, hash_identity, normalize_name, IdentityRegistry};
pub use placeholder::Placeholder;
