//! ConceptDB Graph: derives concepts, categories and their edges from source rows.
//!
//! Nothing here touches the store: inputs are plain mention lists and outputs
//! are row sets ready to be staged.

pub mod categories;
pub mod concepts;
pub mod lexical;
pub mod taxonomy;
pub mod terms;

pub use categories::{CategoryAssigner, CategoryInput, CategorySet};
pub use concepts::{
    ConceptGraph, ConceptGraphBuilder, DocumentConceptMentions, PassageMentions, ResolvedConcepts,
};
pub use lexical::{significant_tokens, LexicalIndex, LexicalLinker};
pub use taxonomy::{CategoryRule, Taxonomy};
pub use terms::{derive_term_hierarchy, TermHierarchy};
