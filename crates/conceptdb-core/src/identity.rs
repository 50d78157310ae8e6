//! Deterministic 32-bit identities for concepts, categories and catalog documents.
//!
//! Every identity is recomputed from the normalized name, so two tables that
//! refer to the same entity agree without a central allocator. The hash is the
//! classic `h = h * 31 + c` over UTF-16 code units with 32-bit signed
//! wraparound, made non-negative by taking the absolute value. `i32::MIN` has
//! no positive counterpart and maps to `0x8000_0000`, which still fits in `u32`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::{Error, Result};

/// Identity `0` doubles as the integer placeholder and "no parent", so it is
/// never handed out.
///
/// Source rows must not use `0` as an id either: a list holding only that id
/// (`catalog_ids: [0]`, `chunk_ids: [0]`) is stored exactly like an empty
/// list and reads back empty. The same holds for a one-element `[0.0]`
/// vector.
pub const RESERVED_IDENTITY: u32 = 0;

/// Trim and lower-case a name. All hashing and comparison goes through this.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Raw hash of an already-normalized key.
pub fn hash_identity(key: &str) -> u32 {
    let mut h: i32 = 0;
    for unit in key.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    h.unsigned_abs()
}

/// Assign an identity for `name`, resolving collisions against `used`.
///
/// On collision the key `"{normalized}#{n}"` is hashed for `n = 1, 2, ...`
/// until a free value is found. The result is inserted into `used`.
pub fn assign(name: &str, used: &mut HashSet<u32>, max_attempts: u32) -> Result<u32> {
    assign_key(&normalize_name(name), used, max_attempts)
}

/// Like [`assign`], but `normalized` is hashed as given.
fn assign_key(normalized: &str, used: &mut HashSet<u32>, max_attempts: u32) -> Result<u32> {
    let first = hash_identity(normalized);
    if is_free(first, used) {
        used.insert(first);
        return Ok(first);
    }

    for n in 1..=max_attempts {
        let candidate = hash_identity(&format!("{}#{}", normalized, n));
        if is_free(candidate, used) {
            debug!(
                "Identity collision for {:?}: resolved with suffix #{} -> {}",
                normalized, n, candidate
            );
            used.insert(candidate);
            return Ok(candidate);
        }
    }

    Err(Error::IdentityCollisionExhaustion {
        name: normalized.to_string(),
        attempts: max_attempts,
    })
}

/// Identities for a batch of catalog documents, keyed by trimmed source path.
///
/// Paths are case-sensitive, so only surrounding whitespace is stripped.
/// Sources are assigned in sorted order with the same `#n` perturbation as
/// names. Blank sources get no identity.
pub fn assign_document_identities<'a, I>(
    sources: I,
    max_attempts: u32,
) -> Result<BTreeMap<String, u32>>
where
    I: IntoIterator<Item = &'a str>,
{
    let sorted: BTreeSet<String> = sources
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut used = HashSet::new();
    let mut out = BTreeMap::new();
    for source in sorted {
        let id = assign_key(&source, &mut used, max_attempts)?;
        out.insert(source, id);
    }
    Ok(out)
}

fn is_free(candidate: u32, used: &HashSet<u32>) -> bool {
    candidate != RESERVED_IDENTITY && !used.contains(&candidate)
}

/// Per-table identity context for one rebuild.
///
/// Holds the `used` set and a name cache so that a name seen twice gets the
/// same identity. Create one per derived table per run; registries never
/// share state.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    used: HashSet<u32>,
    assigned: HashMap<String, u32>,
    max_attempts: u32,
}

impl IdentityRegistry {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            used: HashSet::new(),
            assigned: HashMap::new(),
            max_attempts,
        }
    }

    /// Identity for `name`, assigning one on first sight.
    pub fn assign(&mut self, name: &str) -> Result<u32> {
        let normalized = normalize_name(name);
        if let Some(&id) = self.assigned.get(&normalized) {
            return Ok(id);
        }
        let id = assign(&normalized, &mut self.used, self.max_attempts)?;
        self.assigned.insert(normalized, id);
        Ok(id)
    }

    /// Assign a whole batch in sorted normalized order.
    ///
    /// Sorting first makes the result independent of the caller's iteration
    /// order, which is what keeps repeated rebuilds byte-identical.
    pub fn assign_sorted<'a, I>(&mut self, names: I) -> Result<BTreeMap<String, u32>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let sorted: std::collections::BTreeSet<String> = names
            .into_iter()
            .map(normalize_name)
            .filter(|n| !n.is_empty())
            .collect();

        let mut out = BTreeMap::new();
        for name in sorted {
            let id = self.assign(&name)?;
            out.insert(name, id);
        }
        Ok(out)
    }

    /// Previously assigned identity, if any.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.assigned.get(&normalize_name(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_matches_reference_values() {
        assert_eq!(hash_identity(""), 0);
        assert_eq!(hash_identity("a"), 97);
        assert_eq!(hash_identity("hello"), 99_162_322);
    }

    #[test]
    fn test_hash_wraps_and_takes_absolute_value() {
        // "microservices" overflows 32 bits several times over.
        let raw = "microservices"
            .encode_utf16()
            .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(i32::from(c)));
        assert_eq!(hash_identity("microservices"), raw.unsigned_abs());
    }

    #[test]
    fn test_min_value_maps_to_itself() {
        // Well-known string whose 31-polynomial hash is exactly i32::MIN.
        assert_eq!(hash_identity("polygenelubricants"), 0x8000_0000);
    }

    #[test]
    fn test_normalization_before_hashing() {
        let mut used = HashSet::new();
        let a = assign("  Military Strategy ", &mut used, 8).unwrap();
        assert_eq!(a, hash_identity("military strategy"));
    }

    #[test]
    fn test_collision_is_perturbed_deterministically() {
        // 98*31+33 == 97*31+64
        assert_eq!(hash_identity("b!"), hash_identity("a@"));

        let run = || {
            let mut used = HashSet::new();
            let first = assign("a@", &mut used, 8).unwrap();
            let second = assign("b!", &mut used, 8).unwrap();
            (first, second)
        };
        let (first, second) = run();
        assert_ne!(first, second);
        assert_eq!(second, hash_identity("b!#1"));
        assert_eq!(run(), (first, second));
    }

    #[test]
    fn test_reserved_zero_never_assigned() {
        let mut used = HashSet::new();
        let id = assign("", &mut used, 8).unwrap();
        assert_ne!(id, RESERVED_IDENTITY);
        assert_eq!(id, hash_identity("#1"));
    }

    #[test]
    fn test_exhaustion_surfaces_name() {
        let mut used = HashSet::new();
        used.insert(hash_identity("x"));
        used.insert(hash_identity("x#1"));
        let err = assign("X", &mut used, 1).unwrap_err();
        match err {
            Error::IdentityCollisionExhaustion { name, attempts } => {
                assert_eq!(name, "x");
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_registry_is_idempotent_per_name() {
        let mut registry = IdentityRegistry::new(8);
        let a = registry.assign("Rust").unwrap();
        let b = registry.assign(" rust ").unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_batch_is_order_independent() {
        let names = ["b!", "a@", "zeta", "alpha"];
        let mut reversed = names;
        reversed.reverse();

        let mut r1 = IdentityRegistry::new(8);
        let mut r2 = IdentityRegistry::new(8);
        let m1 = r1.assign_sorted(names.iter().copied()).unwrap();
        let m2 = r2.assign_sorted(reversed.iter().copied()).unwrap();
        assert_eq!(m1, m2);

        let distinct: HashSet<u32> = m1.values().copied().collect();
        assert_eq!(distinct.len(), names.len());
    }

    #[test]
    fn test_independent_registries_do_not_share_state() {
        let mut r1 = IdentityRegistry::new(8);
        let mut r2 = IdentityRegistry::new(8);
        r1.assign("a@").unwrap();
        assert_eq!(r2.assign("b!").unwrap(), hash_identity("b!"));
    }

    #[test]
    fn test_document_identities_are_case_sensitive() {
        let ids = assign_document_identities(["/docs/Design.pdf", "/docs/design.pdf"], 8).unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids["/docs/Design.pdf"], ids["/docs/design.pdf"]);

        let ids = assign_document_identities([" /docs/a.pdf ", "/docs/a.pdf", "  "], 8).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids["/docs/a.pdf"], hash_identity("/docs/a.pdf"));
    }

    #[test]
    fn test_document_identities_resolve_collisions_in_sorted_order() {
        assert_eq!(hash_identity("a@"), hash_identity("b!"));

        let ids = assign_document_identities(["b!", "a@"], 8).unwrap();
        assert_eq!(ids["a@"], hash_identity("a@"));
        assert_eq!(ids["b!"], hash_identity("b!#1"));

        let reversed = assign_document_identities(["a@", "b!"], 8).unwrap();
        assert_eq!(ids, reversed);
    }

    #[test]
    fn test_document_identities_exhaustion() {
        let err = assign_document_identities(["a@", "b!"], 0).unwrap_err();
        assert!(matches!(
            err,
            Error::IdentityCollisionExhaustion { ref name, attempts: 0 } if name == "b!"
        ));
    }
}
