//! The query-graph model and translator (§3 "QNode"/"QEdge", §4.1).
//!
//! Nodes and edges live in a [`petgraph::graph::DiGraph`] (Design Note 1: "arena-style integer
//! indices into a node table plus edges carrying endpoint indices"), avoiding the cyclic
//! ownership that a `Rc<RefCell<QNode>>` graph would need.

use indexmap::IndexSet;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::TrapiError;
use crate::execution_edge::QXEdge;
use crate::identifiers::Curie;
use crate::trapi;

/// A query-graph node (§3 "QNode"). Categories and fixed curies are set at ingestion and never
/// change; `entity_count` and resolved curies are tracked separately by the edge manager, since
/// those are per-query execution state rather than graph topology.
#[derive(Debug, Clone)]
pub struct QNode {
    pub id: String,
    pub categories: Vec<String>,
    pub ids: Option<Vec<Curie>>,
    pub is_set: bool,
}

impl QNode {
    /// A node is a "fixed input" iff it has at least one curie (§3).
    pub fn is_fixed_input(&self) -> bool {
        self.ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }

    /// The number of curies supplied for a fixed-input node, if any.
    pub fn fixed_curie_count(&self) -> Option<usize> {
        self.ids.as_ref().map(|ids| ids.len())
    }

    /// Upper bound on the node's cardinality before any incident edge executes (§3 "Invariants").
    pub fn initial_entity_count(&self) -> u64 {
        match self.fixed_curie_count() {
            Some(n) => n as u64,
            None => u64::MAX,
        }
    }
}

/// A query-graph edge (§3 "QEdge"). `subject`/`object` are node indices into the owning
/// [`QueryGraph`]'s arena.
#[derive(Debug, Clone)]
pub struct QEdge {
    pub id: String,
    pub subject: NodeIndex,
    pub object: NodeIndex,
    pub predicates: Option<Vec<String>>,
}

/// Categories that, when present without their generalization, gain it — accounting for
/// isoform-level lookups (§4.1). Table-driven so more pairs can be added without touching the
/// normalization logic; the spec names exactly the Protein→Gene case.
const CATEGORY_IMPLICATIONS: &[(&str, &str)] = &[("biolink:Protein", "biolink:Gene")];

fn normalize_categories(categories: Vec<String>) -> Vec<String> {
    let mut categories = categories;
    for (specific, general) in CATEGORY_IMPLICATIONS {
        if categories.iter().any(|c| c == specific) && !categories.iter().any(|c| c == general) {
            categories.push((*general).to_string());
        }
    }
    categories
}

pub struct QueryGraph {
    graph: DiGraph<QNode, QEdge>,
}

impl QueryGraph {
    /// Ingests and validates a TRAPI query graph (§4.1). Fails with
    /// [`TrapiError::InvalidQueryGraph`] on any validation breach:
    /// - an edge references a node id that doesn't exist,
    /// - some node is unreachable from the rest of the graph,
    /// - the graph contains a cycle,
    /// - no node has curies.
    pub fn from_trapi(query_graph: &trapi::QueryGraph) -> Result<Self, TrapiError> {
        let mut graph: DiGraph<QNode, QEdge> = DiGraph::new();
        let mut index_by_id = std::collections::HashMap::new();

        for (id, spec) in &query_graph.nodes {
            let node = QNode {
                id: id.clone(),
                categories: normalize_categories(spec.categories.clone().unwrap_or_default()),
                ids: spec
                    .ids
                    .clone()
                    .map(|ids| ids.into_iter().map(Curie::new).collect()),
                is_set: spec.is_set.unwrap_or(false),
            };
            let idx = graph.add_node(node);
            index_by_id.insert(id.clone(), idx);
        }

        for (id, spec) in &query_graph.edges {
            let subject = *index_by_id.get(&spec.subject).ok_or_else(|| {
                TrapiError::invalid_query_graph(format!(
                    "edge {id} references unknown subject node {}",
                    spec.subject
                ))
            })?;
            let object = *index_by_id.get(&spec.object).ok_or_else(|| {
                TrapiError::invalid_query_graph(format!(
                    "edge {id} references unknown object node {}",
                    spec.object
                ))
            })?;
            graph.add_edge(
                subject,
                object,
                QEdge {
                    id: id.clone(),
                    subject,
                    object,
                    predicates: spec.predicates.clone(),
                },
            );
        }

        let qg = QueryGraph { graph };
        qg.validate()?;
        Ok(qg)
    }

    fn validate(&self) -> Result<(), TrapiError> {
        if self.graph.node_count() == 0 {
            return Err(TrapiError::invalid_query_graph(
                "query graph has no nodes",
            ));
        }

        // Reachability: every node must be reachable from some other node in the undirected
        // sense, i.e. there is exactly one weakly-connected component (unless there's only one
        // node total, which is trivially fully connected).
        if self.graph.node_count() > 1 {
            let components = petgraph::algo::connected_components(&self.graph);
            if components != 1 {
                return Err(TrapiError::invalid_query_graph(
                    "query graph contains unreachable nodes",
                ));
            }
        }

        // Acyclicity: a connected graph is a tree (no cycles) iff edge_count == node_count - 1.
        // `is_cyclic_directed` only detects directed cycles, which misses e.g. two edges between
        // the same pair of nodes in opposite directions — also a cycle for our traversal-as-tree
        // purposes (§4.6 "Cycle handling").
        if self.graph.edge_count() > self.graph.node_count().saturating_sub(1) {
            return Err(TrapiError::invalid_query_graph(
                "query graph contains a cycle, which is unsupported",
            ));
        }

        if !self.graph.node_weights().any(|n| n.is_fixed_input()) {
            return Err(TrapiError::invalid_query_graph(
                "query graph has no node with concrete curies",
            ));
        }

        Ok(())
    }

    pub fn node(&self, idx: NodeIndex) -> &QNode {
        &self.graph[idx]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &QNode)> {
        self.graph.node_indices().map(|idx| (idx, &self.graph[idx]))
    }

    pub fn edges(&self) -> impl Iterator<Item = &QEdge> {
        self.graph.edge_references().map(|e| e.weight())
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Edges incident to `node`, regardless of direction.
    pub fn incident_edges(&self, node: NodeIndex) -> Vec<&QEdge> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .chain(self.graph.edges_directed(node, Direction::Incoming))
            .map(|e| e.weight())
            .collect()
    }

    /// Produces the initial plan: one [`QXEdge`] per [`QEdge`], ordered by edge id for
    /// determinism, each with its initial `reverse` flag set per §4.1's direction rule.
    pub fn plan(&self) -> Vec<QXEdge> {
        let mut edges: Vec<&QEdge> = self.edges().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));

        edges
            .into_iter()
            .map(|edge| {
                let subject = self.node(edge.subject);
                let object = self.node(edge.object);
                let reverse = self.choose_initial_reverse(subject, object);
                QXEdge::new(edge.clone(), reverse)
            })
            .collect()
    }

    /// subject-has-curies wins; if both do, fewer curies wins; ties keep the original direction
    /// (DESIGN.md Open Question 1 extension — the spec's lexicographic tie-break governs the
    /// plan's overall edge order, which is handled in [`Self::plan`]).
    fn choose_initial_reverse(&self, subject: &QNode, object: &QNode) -> bool {
        match (subject.fixed_curie_count(), object.fixed_curie_count()) {
            (Some(_), None) => false,
            (None, Some(_)) => true,
            (None, None) => false,
            (Some(s), Some(o)) => o < s,
        }
    }

    /// All resolved curies a node would start with, given its fixed `ids` (empty set if the node
    /// has no curies).
    pub fn initial_curies(&self, idx: NodeIndex) -> IndexSet<Curie> {
        self.node(idx)
            .ids
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect()
    }
}
