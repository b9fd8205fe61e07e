//! Composite cache-key computation (§4.5 "Key").
//!
//! The key must be stable across processes for identical inputs (Invariant 3's caching
//! corollary), so every component is canonicalized (sorted, deduplicated) before hashing —
//! otherwise two equivalent queries whose caller happened to list categories in a different
//! order would miss each other's cache entries.

use crate::identifiers::{stable_fingerprint, Curie};

/// Everything that determines whether two execution edges can share a cache entry.
#[derive(Debug, Clone)]
pub struct CacheKeyInput<'a> {
    pub subject_categories: &'a [String],
    pub predicates: Option<&'a [String]>,
    pub object_categories: &'a [String],
    pub input_curies: &'a [Curie],
    /// The whole MetaKG catalog's registered operation count (`MetaKgCatalog::operation_count`),
    /// not the number matching this edge — the key invalidates whenever the universe of
    /// downstream APIs changes (§4.5 "Key").
    pub metakg_operation_count: usize,
    /// The whole catalog's distinct API identifiers (`MetaKgCatalog::all_api_identifiers`), not
    /// just the ones matching this edge (§4.5 "Key").
    pub api_identifiers: &'a [String],
}

/// Computes the Redis key an edge's cached records would live under.
pub fn compute(input: &CacheKeyInput<'_>) -> String {
    let mut subject_categories: Vec<&str> = input.subject_categories.iter().map(String::as_str).collect();
    subject_categories.sort_unstable();
    subject_categories.dedup();

    let mut object_categories: Vec<&str> = input.object_categories.iter().map(String::as_str).collect();
    object_categories.sort_unstable();
    object_categories.dedup();

    let mut predicates: Vec<&str> = input
        .predicates
        .map(|p| p.iter().map(String::as_str).collect())
        .unwrap_or_default();
    predicates.sort_unstable();
    predicates.dedup();

    let mut curies: Vec<&str> = input.input_curies.iter().map(Curie::as_str).collect();
    curies.sort_unstable();
    curies.dedup();

    let mut apis: Vec<&str> = input.api_identifiers.iter().map(String::as_str).collect();
    apis.sort_unstable();
    apis.dedup();

    let operation_count = input.metakg_operation_count.to_string();

    let fields = subject_categories
        .into_iter()
        .chain(std::iter::once("|"))
        .chain(predicates)
        .chain(std::iter::once("|"))
        .chain(object_categories)
        .chain(std::iter::once("|"))
        .chain(curies)
        .chain(std::iter::once("|"))
        .chain(std::iter::once(operation_count.as_str()))
        .chain(std::iter::once("|"))
        .chain(apis);

    let digest = stable_fingerprint(fields);
    format!("trapi:edge:{digest:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_under_input_reordering() {
        let a = compute(&CacheKeyInput {
            subject_categories: &["biolink:Gene".to_string(), "biolink:Protein".to_string()],
            predicates: Some(&["biolink:related_to".to_string()]),
            object_categories: &["biolink:Disease".to_string()],
            input_curies: &[Curie::new("A:1"), Curie::new("B:2")],
            metakg_operation_count: 3,
            api_identifiers: &["api1".to_string(), "api2".to_string()],
        });
        let b = compute(&CacheKeyInput {
            subject_categories: &["biolink:Protein".to_string(), "biolink:Gene".to_string()],
            predicates: Some(&["biolink:related_to".to_string()]),
            object_categories: &["biolink:Disease".to_string()],
            input_curies: &[Curie::new("B:2"), Curie::new("A:1")],
            metakg_operation_count: 3,
            api_identifiers: &["api2".to_string(), "api1".to_string()],
        });
        assert_eq!(a, b);
    }

    #[test]
    fn key_changes_with_operation_count() {
        let base = CacheKeyInput {
            subject_categories: &["biolink:Gene".to_string()],
            predicates: None,
            object_categories: &["biolink:Disease".to_string()],
            input_curies: &[Curie::new("A:1")],
            metakg_operation_count: 1,
            api_identifiers: &["api1".to_string()],
        };
        let mut other = base.clone();
        other.metakg_operation_count = 2;
        assert_ne!(compute(&base), compute(&other));
    }
}
