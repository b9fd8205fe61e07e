//! The [`Record`] type: the unit exchanged with downstream APIs (§3).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identifiers::{stable_fingerprint, Curie};

/// Normalized identity info for one endpoint (subject or object) of a record, as returned by
/// the identifier-resolution boundary (§6 "Identifier resolver").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedInfo {
    pub primary_curie: Curie,
    pub label: Option<String>,
    pub equivalent_curies: Vec<Curie>,
}

impl NormalizedInfo {
    pub fn identity_only(curie: Curie) -> Self {
        NormalizedInfo {
            primary_curie: curie,
            label: None,
            equivalent_curies: Vec::new(),
        }
    }
}

/// One endpoint (subject or object) of a [`Record`]: the original string the API returned plus
/// its normalized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordNode {
    pub original_curie: String,
    pub normalized: NormalizedInfo,
}

impl RecordNode {
    pub fn curie(&self) -> &Curie {
        &self.normalized.primary_curie
    }
}

/// An arbitrary typed attribute value carried by a record. Downstream APIs are heterogeneous in
/// what they attach, so this stays an open map rather than a fixed struct (Design Note 2).
pub type AttributeValue = serde_json::Value;

/// One (subject, predicate, object) observation returned by a downstream API, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub subject: RecordNode,
    pub object: RecordNode,
    pub predicate: String,
    pub api_name: String,
    pub source: String,
    pub publications: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
    /// `is_set` as declared by the *endpoint* that produced this record (distinct from the
    /// `is_set` flag on a QNode, though they're often the same value by the time a record
    /// reaches the assembler).
    pub is_set: bool,
    /// The identity-bearing fingerprint, computed once via [`Record::compute_hash`] and cached
    /// here since every downstream consumer (cache, store, assembler) needs it repeatedly.
    pub hash: u64,
    /// The qedge a cached record was originally fetched for. Dropped before a record is written
    /// to the cache (§8 "Cache round-trip") since the qedge id is a property of the query that
    /// produced the record, not of the record's own identity, and restored by the cache codec on
    /// read against whatever qedge id the new lookup is for.
    #[serde(default)]
    pub trapi_qedge_id: Option<String>,
}

impl Record {
    /// Builds a record and computes its identity hash over `identity_fields` (the configured
    /// identity-bearing field names, §4.5 "Key").
    pub fn new(
        subject: RecordNode,
        object: RecordNode,
        predicate: String,
        api_name: String,
        source: String,
        publications: Vec<String>,
        attributes: BTreeMap<String, AttributeValue>,
        is_set: bool,
        identity_fields: &[String],
    ) -> Self {
        let mut record = Record {
            subject,
            object,
            predicate,
            api_name,
            source,
            publications,
            attributes,
            is_set,
            hash: 0,
            trapi_qedge_id: None,
        };
        record.hash = record.compute_hash(identity_fields);
        record
    }

    /// Strips the qedge back-reference before this record is serialized into the cache
    /// (§8 "Cache round-trip").
    pub fn without_trapi_qedge_id(mut self) -> Self {
        self.trapi_qedge_id = None;
        self
    }

    /// Swaps subject and object in place, used when dumping a reverse-direction edge's records
    /// back in the query's original subject/object orientation (§9 "dump-records").
    pub fn swapped(mut self) -> Self {
        std::mem::swap(&mut self.subject, &mut self.object);
        self
    }

    /// Recomputes the identity fingerprint over the subset of fields named in `identity_fields`.
    /// Unknown field names are ignored; field values are read in the order `identity_fields`
    /// names them, so permuting the configuration list changes the hash (callers should keep
    /// configuration stable across a deployment, matching Invariant 3's "stable across
    /// processes" guarantee, which assumes a fixed configuration).
    pub fn compute_hash(&self, identity_fields: &[String]) -> u64 {
        let values: Vec<String> = identity_fields
            .iter()
            .map(|field| self.field_value(field))
            .collect();
        stable_fingerprint(values.iter().map(String::as_str))
    }

    fn field_value(&self, field: &str) -> String {
        match field {
            "subject" => self.subject.curie().as_str().to_string(),
            "object" => self.object.curie().as_str().to_string(),
            "predicate" => self.predicate.clone(),
            "api_name" => self.api_name.clone(),
            "source" => self.source.clone(),
            other => self
                .attributes
                .get(other)
                .map(|v| v.to_string())
                .unwrap_or_default(),
        }
    }
}

/// Exposed outside `#[cfg(test)]` (behind the `test-util` feature) so integration tests in
/// `tests/` can build records without duplicating this fixture logic.
#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::*;

    pub fn record(subject: &str, object: &str, predicate: &str, api: &str) -> Record {
        let identity_fields = default_identity_fields();
        Record::new(
            RecordNode {
                original_curie: subject.to_string(),
                normalized: NormalizedInfo::identity_only(Curie::new(subject)),
            },
            RecordNode {
                original_curie: object.to_string(),
                normalized: NormalizedInfo::identity_only(Curie::new(object)),
            },
            predicate.to_string(),
            api.to_string(),
            api.to_string(),
            Vec::new(),
            BTreeMap::new(),
            false,
            &identity_fields,
        )
    }

    pub fn default_identity_fields() -> Vec<String> {
        vec![
            "subject".to_string(),
            "predicate".to_string(),
            "object".to_string(),
            "api_name".to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn hash_is_stable_for_same_identity_fields() {
        let r1 = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        let r2 = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        assert_eq!(r1.hash, r2.hash);
    }

    #[test]
    fn hash_changes_with_identity_fields() {
        let r1 = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        let r2 = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api2");
        assert_ne!(r1.hash, r2.hash);
    }
}
