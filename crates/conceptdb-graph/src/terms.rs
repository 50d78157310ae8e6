//! Broader / narrower terms from token containment.
//!
//! A concept whose significant tokens are a strict subset of another's is the
//! broader term: "strategy" is broader than "military strategy".

use std::collections::BTreeMap;

use crate::lexical::LexicalIndex;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TermHierarchy {
    pub broader: BTreeMap<i64, Vec<String>>,
    pub narrower: BTreeMap<i64, Vec<String>>,
}

impl TermHierarchy {
    pub fn broader_of(&self, id: i64) -> Vec<String> {
        self.broader.get(&id).cloned().unwrap_or_default()
    }

    pub fn narrower_of(&self, id: i64) -> Vec<String> {
        self.narrower.get(&id).cloned().unwrap_or_default()
    }
}

pub fn derive_term_hierarchy(
    index: &LexicalIndex,
    names: &BTreeMap<i64, String>,
    max_terms: usize,
) -> TermHierarchy {
    let mut hierarchy = TermHierarchy::default();

    for id in index.ids() {
        let own = index.tokens(id).len();
        if own == 0 {
            continue;
        }
        let Some(name) = names.get(&id) else {
            continue;
        };
        for (other, shared) in index.candidates(id) {
            if shared == own && index.tokens(other).len() > own {
                if let Some(other_name) = names.get(&other) {
                    hierarchy.broader.entry(other).or_default().push(name.clone());
                    hierarchy.narrower.entry(id).or_default().push(other_name.clone());
                }
            }
        }
    }

    for list in hierarchy
        .broader
        .values_mut()
        .chain(hierarchy.narrower.values_mut())
    {
        list.sort();
        list.dedup();
        list.truncate(max_terms);
    }
    hierarchy
}
