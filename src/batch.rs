//! The batch edge-query boundary (§6 "Batch edge query executor").
//!
//! The engine never talks to a downstream API directly; it hands each execution edge's bound
//! input curies to whatever implements this trait and gets back oriented [`Record`]s. Modeled
//! on `apollo-federation`'s boundary traits (e.g. `FetchDependencyGraphNode`'s relationship to
//! its executor) — the core owns the *shape* of the call, an external crate owns the *how*.

use async_trait::async_trait;

use crate::error::TrapiError;
use crate::identifiers::Curie;
use crate::metakg::MetaKgOperation;
use crate::record::Record;

/// One execution edge's worth of work to hand to a downstream API. Carries every matching
/// MetaKG operation rather than one at a time — the handler (or whatever dispatches to the
/// concrete per-API clients behind it) is responsible for fanning out across APIs and merging
/// their responses into a single oriented record stream.
#[derive(Debug, Clone)]
pub struct EdgeQuery {
    pub qedge_id: String,
    pub operations: Vec<MetaKgOperation>,
    pub input_curies: Vec<Curie>,
    pub is_set: bool,
}

/// Consumed boundary: executes one edge's queries against live downstream APIs and returns the
/// resulting records, already oriented subject=input/object=output (§4.3's documented
/// convention).
#[async_trait]
pub trait BatchEdgeQueryHandler: Send + Sync {
    async fn execute(&self, query: &EdgeQuery) -> Result<Vec<Record>, TrapiError>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// A handler whose responses are fixed ahead of time, keyed by qedge id — used to drive
    /// the engine end-to-end in tests without a real downstream API.
    #[derive(Default)]
    pub struct MockBatchHandler {
        responses: Mutex<HashMap<String, Vec<Record>>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockBatchHandler {
        pub fn new() -> Self {
            MockBatchHandler::default()
        }

        pub fn respond(&self, qedge_id: impl Into<String>, records: Vec<Record>) {
            self.responses.lock().unwrap().insert(qedge_id.into(), records);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl BatchEdgeQueryHandler for MockBatchHandler {
        async fn execute(&self, query: &EdgeQuery) -> Result<Vec<Record>, TrapiError> {
            self.calls.lock().unwrap().push(query.qedge_id.clone());
            Ok(self
                .responses
                .lock()
                .unwrap()
                .get(&query.qedge_id)
                .cloned()
                .unwrap_or_default())
        }
    }
}
