//! The MetaKG catalog boundary (§6 "MetaKG operation (consumed)", out of scope per §1).
//!
//! The core only ever asks "how many operations match this (subject categories, predicate,
//! object categories) triple" and "what's the full operation list for an execution edge" — it
//! never constructs or owns the catalog itself.

/// One entry in the MetaKG: an API's declared ability to answer a given
/// (input type, predicate, output type) triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaKgOperation {
    pub input_type: String,
    pub output_type: String,
    pub predicate: String,
    pub api_name: String,
    /// The owning SmartAPI registry id, used as part of the cache key (§4.5).
    pub smartapi_id: String,
}

/// Consumed boundary: a catalog of available operations across known APIs.
pub trait MetaKgCatalog: Send + Sync {
    /// All operations whose (input_type, predicate, output_type) could serve an edge with the
    /// given subject categories, predicate list (`None` meaning "any"), and object categories.
    fn matching_operations(
        &self,
        subject_categories: &[String],
        predicates: Option<&[String]>,
        object_categories: &[String],
    ) -> Vec<MetaKgOperation>;

    /// Total number of operations currently registered across the whole catalog, used in the
    /// cache key (§4.5 "Key": "the number of MetaKG operations currently registered").
    fn operation_count(&self) -> usize;

    /// Every distinct API name registered anywhere in the catalog, used in the cache key
    /// (§4.5 "Key": "the concatenation of all MetaKG API identifiers") — the whole catalog's
    /// identifier set, not just the ones matching one execution edge.
    fn all_api_identifiers(&self) -> Vec<String>;
}

/// An in-memory catalog, primarily for tests and small deployments.
#[derive(Debug, Default, Clone)]
pub struct StaticMetaKgCatalog {
    operations: Vec<MetaKgOperation>,
}

impl StaticMetaKgCatalog {
    pub fn new(operations: Vec<MetaKgOperation>) -> Self {
        StaticMetaKgCatalog { operations }
    }
}

impl MetaKgCatalog for StaticMetaKgCatalog {
    fn matching_operations(
        &self,
        subject_categories: &[String],
        predicates: Option<&[String]>,
        object_categories: &[String],
    ) -> Vec<MetaKgOperation> {
        self.operations
            .iter()
            .filter(|op| {
                subject_categories.iter().any(|c| c == &op.input_type)
                    && object_categories.iter().any(|c| c == &op.output_type)
                    && match predicates {
                        Some(preds) => preds.iter().any(|p| p == &op.predicate),
                        None => true,
                    }
            })
            .cloned()
            .collect()
    }

    fn operation_count(&self) -> usize {
        self.operations.len()
    }

    fn all_api_identifiers(&self) -> Vec<String> {
        let mut apis: Vec<String> = self.operations.iter().map(|op| op.api_name.clone()).collect();
        apis.sort();
        apis.dedup();
        apis
    }
}
