//! TRAPI wire shapes (§6): the request/response JSON this crate speaks at its boundary.
//!
//! These are intentionally narrower than the full TRAPI schema — only the fields this engine
//! reads or writes. Anything else a caller sends round-trips as opaque JSON where it matters
//! (attributes), and is otherwise ignored.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::identifiers::Curie;

/// A TRAPI query graph, keyed by node and edge id for deterministic iteration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryGraph {
    pub nodes: BTreeMap<String, QNodeSpec>,
    pub edges: BTreeMap<String, QEdgeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QNodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_set: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QEdgeSpec {
    pub subject: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicates: Option<Vec<String>>,
}

/// Top-level TRAPI request/response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub message: RequestMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestMessage {
    pub query_graph: QueryGraph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Always `[{id: "lookup"}]` (§6) — this engine implements no workflow step beyond a single
    /// synchronous lookup.
    pub workflow: Vec<WorkflowStep>,
    pub message: Message,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl Response {
    pub fn new(message: Message, logs: Vec<LogEntry>) -> Self {
        Response {
            workflow: vec![WorkflowStep { id: "lookup".to_string() }],
            message,
            logs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub query_graph: QueryGraph,
    pub knowledge_graph: KnowledgeGraph,
    pub results: Vec<ResultEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    pub nodes: BTreeMap<String, KGNode>,
    pub edges: BTreeMap<String, KGEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KGNode {
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Equivalent curies merged in from every record's normalized identity info that resolved to
    /// this node (§3 "KGNode ... set of equivalent curies").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub equivalent_identifiers: Vec<String>,
    /// Other labels seen for this curie beyond the primary `name` — e.g. when two contributing
    /// records' normalized info disagree on label (§3 "KGNode ... set of alternate names").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_names: Vec<String>,
    /// QNode ids for which this curie was bound as the edge's subject (source) side, across
    /// every executed edge that touched it (§3 "KGNode ... sets of source/target QNode
    /// identifiers").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub source_qnode_ids: Vec<String>,
    /// QNode ids for which this curie was bound as the edge's object (target) side (§3, same
    /// field).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_qnode_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KGEdge {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<RetrievalSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub publications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSource {
    pub resource_id: String,
    pub resource_role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_resource_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub attribute_type_id: String,
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_attribute_name: Option<String>,
}

/// One TRAPI result: a node/edge binding set plus a placeholder score (§4.6, Open Question 2).
/// Flat per §6's documented wire shape (`results: [{node_bindings, edge_bindings, score}]`) —
/// no nested `analyses` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultEntry {
    pub node_bindings: BTreeMap<String, Vec<NodeBinding>>,
    pub edge_bindings: BTreeMap<String, Vec<EdgeBinding>>,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeBinding {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeBinding {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "".to_string())
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        LogEntry {
            level: "INFO".to_string(),
            message: message.into(),
            timestamp: now_rfc3339(),
            data: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        LogEntry {
            level: "WARNING".to_string(),
            message: message.into(),
            timestamp: now_rfc3339(),
            data: None,
        }
    }
}

/// Placeholder score assigned to every result (DESIGN.md Open Question 2: ranking is out of
/// scope, so every result gets the same neutral score).
pub const PLACEHOLDER_SCORE: f64 = 1.0;

/// The infores id this engine's own aggregation step is attributed under (§4.5 / §9).
pub const AGGREGATOR_INFORES: &str = "infores:service-aggregator-v2";

impl ResultEntry {
    /// Builds a TRAPI result from the grouped node/edge curie and hash sets the assembler
    /// produces (§4.6 Step 4). Edge binding ids are the record hash's canonical string form
    /// (`identifiers::hash_key`), the same key the knowledge graph builder uses for its edges, so
    /// every binding here resolves against `knowledge_graph.edges` (§6).
    pub fn new(
        node_bindings: IndexMap<String, IndexSet<Curie>>,
        edge_bindings: IndexMap<String, IndexSet<u64>>,
    ) -> Self {
        let mut nodes = BTreeMap::new();
        for (qnode_id, curies) in node_bindings {
            let mut bindings: Vec<NodeBinding> = curies
                .into_iter()
                .map(|c| NodeBinding { id: c.into_string() })
                .collect();
            bindings.sort_by(|a, b| a.id.cmp(&b.id));
            nodes.insert(qnode_id, bindings);
        }

        let mut edges = BTreeMap::new();
        for (qedge_id, hashes) in edge_bindings {
            let mut bindings: Vec<EdgeBinding> = hashes
                .into_iter()
                .map(|h| EdgeBinding {
                    id: crate::identifiers::hash_key(h),
                })
                .collect();
            bindings.sort_by(|a, b| a.id.cmp(&b.id));
            edges.insert(qedge_id, bindings);
        }

        ResultEntry {
            node_bindings: nodes,
            edge_bindings: edges,
            score: PLACEHOLDER_SCORE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_entry_sorts_bindings_deterministically() {
        let mut nodes = IndexMap::new();
        nodes.insert(
            "n1".to_string(),
            [Curie::new("B:2"), Curie::new("A:1")].into_iter().collect(),
        );
        let mut edges = IndexMap::new();
        edges.insert("e01".to_string(), [7u64, 3u64].into_iter().collect());
        let result = ResultEntry::new(nodes, edges);
        assert_eq!(result.node_bindings["n1"][0].id, "A:1");
        assert_eq!(result.node_bindings["n1"][1].id, "B:2");
        assert_eq!(result.edge_bindings["e01"].len(), 2);
        assert_eq!(result.score, PLACEHOLDER_SCORE);
    }
}
