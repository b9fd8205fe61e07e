//! Curie normalization and the record identity fingerprint.
//!
//! Grounded on `apollo-federation`'s habit of wrapping bare strings that carry a specific
//! syntax in a newtype (cf. `NodeStr`, `Name`) rather than passing `String` around untyped.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A compact URI, e.g. `NCBIGene:3778`.
///
/// Normalization (Open Question, pinned in DESIGN.md): the prefix — the substring before the
/// first `:` — is uppercased; the local id after it is left verbatim. Curies with no `:` are
/// left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Curie(String);

impl Curie {
    pub fn new(raw: impl Into<String>) -> Self {
        Curie(normalize(&raw.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn normalize(raw: &str) -> String {
    match raw.split_once(':') {
        Some((prefix, local)) => format!("{}:{}", prefix.to_ascii_uppercase(), local),
        None => raw.to_string(),
    }
}

impl fmt::Display for Curie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Curie {
    fn from(value: &str) -> Self {
        Curie::new(value)
    }
}

impl From<String> for Curie {
    fn from(value: String) -> Self {
        Curie::new(value)
    }
}

/// Computes a stable 64-bit fingerprint over an ordered sequence of field values.
///
/// Uses `blake3` rather than `std::hash::DefaultHasher`: the latter's `RandomState` seed is
/// randomized per-process, which would violate the record-hash stability invariant (a record
/// hash must be reproducible across processes for the same identity-bearing field values).
pub fn stable_fingerprint<'a>(fields: impl IntoIterator<Item = &'a str>) -> u64 {
    let mut hasher = blake3::Hasher::new();
    for field in fields {
        hasher.update(field.as_bytes());
        // 0x1f (unit separator) can't appear in any of our plain-text identity fields, so it's
        // safe as a delimiter that keeps ("ab", "c") distinct from ("a", "bc").
        hasher.update(&[0x1f]);
    }
    let digest = hasher.finalize();
    let bytes = digest.as_bytes();
    u64::from_le_bytes(bytes[0..8].try_into().expect("blake3 digest is 32 bytes"))
}

/// Canonical string form of a record hash, used both as a TRAPI `knowledge_graph.edges` key and
/// as the corresponding `edge_bindings` id (§6: `edges: {hash -> KGEdge}`) — keeping both call
/// sites routed through one function is what keeps them in sync.
pub fn hash_key(hash: u64) -> String {
    format!("{hash:016x}")
}
