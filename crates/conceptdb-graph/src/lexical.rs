//! Lexical relatedness: concepts whose names share significant words.
//!
//! The relation is ranked per source concept and truncated, so it is not
//! symmetric: B can be in A's top-N while A misses B's top-N.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z\s-]").unwrap());

/// Words that never count as shared vocabulary.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is",
        "it", "of", "on", "or", "the", "to", "with", "about", "above", "across", "after",
        "again", "against", "along", "among", "around", "based", "because", "before",
        "being", "below", "between", "beyond", "could", "during", "either", "every",
        "general", "other", "others", "should", "their", "there", "these", "those",
        "through", "toward", "towards", "under", "until", "using", "various", "where",
        "which", "while", "within", "without", "would", "basic", "introduction",
        "overview", "principles", "theory", "types", "approach", "approaches", "method",
        "methods", "system", "systems",
    ]
    .into_iter()
    .collect()
});

/// Significant tokens of a concept name, deduplicated in first-seen order.
pub fn significant_tokens(name: &str, min_word_length: usize) -> Vec<String> {
    let lower = name.to_lowercase();
    let without_parens = PARENTHETICAL.replace_all(&lower, " ");
    let cleaned = NON_WORD.replace_all(&without_parens, " ");

    let mut seen = HashSet::new();
    cleaned
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| t.chars().count() >= min_word_length && !STOP_WORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Token sets per concept and the inverted token → concepts index.
pub struct LexicalIndex {
    tokens: BTreeMap<i64, Vec<String>>,
    postings: HashMap<String, Vec<i64>>,
}

impl LexicalIndex {
    /// Build from `(id, name)` pairs.
    pub fn build<'a, I>(concepts: I, min_word_length: usize) -> Self
    where
        I: IntoIterator<Item = (i64, &'a str)>,
    {
        let mut tokens = BTreeMap::new();
        let mut postings: HashMap<String, Vec<i64>> = HashMap::new();

        for (id, name) in concepts {
            let words = significant_tokens(name, min_word_length);
            for word in &words {
                postings.entry(word.clone()).or_default().push(id);
            }
            tokens.insert(id, words);
        }
        for ids in postings.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }

        Self { tokens, postings }
    }

    pub fn tokens(&self, id: i64) -> &[String] {
        self.tokens.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Other concepts sharing at least one token with `id`, with the number
    /// of distinct shared tokens.
    pub fn candidates(&self, id: i64) -> HashMap<i64, usize> {
        let mut shared: HashMap<i64, usize> = HashMap::new();
        for word in self.tokens(id) {
            if let Some(ids) = self.postings.get(word) {
                for &other in ids {
                    if other != id {
                        *shared.entry(other).or_insert(0) += 1;
                    }
                }
            }
        }
        shared
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.tokens.keys().copied()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.postings.len()
    }
}

/// Ranks lexical neighbours per concept.
#[derive(Debug, Clone)]
pub struct LexicalLinker {
    pub min_word_length: usize,
    pub max_links_per_concept: usize,
}

impl Default for LexicalLinker {
    fn default() -> Self {
        Self {
            min_word_length: conceptdb_core::config::DEFAULT_MIN_WORD_LENGTH,
            max_links_per_concept: conceptdb_core::config::DEFAULT_MAX_RELATED,
        }
    }
}

impl LexicalLinker {
    pub fn new(min_word_length: usize, max_links_per_concept: usize) -> Self {
        Self {
            min_word_length,
            max_links_per_concept,
        }
    }

    pub fn index<'a, I>(&self, concepts: I) -> LexicalIndex
    where
        I: IntoIterator<Item = (i64, &'a str)>,
    {
        LexicalIndex::build(concepts, self.min_word_length)
    }

    /// Related ids per concept. Concepts without candidates get no entry.
    pub fn link<'a, I>(&self, concepts: I) -> BTreeMap<i64, Vec<i64>>
    where
        I: IntoIterator<Item = (i64, &'a str)>,
    {
        let index = self.index(concepts);
        self.link_indexed(&index)
    }

    pub fn link_indexed(&self, index: &LexicalIndex) -> BTreeMap<i64, Vec<i64>> {
        let mut out = BTreeMap::new();
        for id in index.ids() {
            let mut ranked: Vec<(i64, usize)> = index.candidates(id).into_iter().collect();
            if ranked.is_empty() {
                continue;
            }
            // Shared-token count first; id ascending keeps ties reproducible.
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            ranked.truncate(self.max_links_per_concept);
            out.insert(id, ranked.into_iter().map(|(other, _)| other).collect());
        }
        out
    }
}
