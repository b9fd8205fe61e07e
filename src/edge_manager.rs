//! The edge manager (§4.2): owns the set of execution edges for a single query, chooses which
//! to execute next, propagates bindings between neighbors, and reports surviving records.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use crate::execution_edge::QXEdge;
use crate::identifiers::Curie;
use crate::metakg::MetaKgCatalog;
use crate::query_graph::QueryGraph;
use crate::record::Record;
use crate::record_store;

/// Per-QNode runtime state the spec keeps on QNode itself (§3); kept here instead since it's
/// execution state scoped to one query, not part of the (potentially shared/reused) graph
/// topology.
#[derive(Debug, Clone)]
struct NodeState {
    entity_count: u64,
    resolved_curies: IndexSet<Curie>,
}

/// One fully joined record path across the edges incident to a shared node, used by
/// [`EdgeManager::collect`] to report `connected_to` relationships (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub qedge_id: String,
    pub shared_qnode: String,
}

pub struct EdgeManager<'g> {
    query_graph: &'g QueryGraph,
    edges: Vec<QXEdge>,
    node_state: HashMap<String, NodeState>,
    /// Precomputed once: for each QNode id, the indices (into `edges`) of incident execution
    /// edges. Avoids recanvassing the whole edge set on every `propagate` call.
    incident: HashMap<String, Vec<usize>>,
}

impl<'g> EdgeManager<'g> {
    pub fn new(query_graph: &'g QueryGraph, edges: Vec<QXEdge>) -> Self {
        let mut node_state = HashMap::new();
        for (idx, node) in query_graph.nodes() {
            node_state.insert(
                node.id.clone(),
                NodeState {
                    entity_count: node.initial_entity_count(),
                    resolved_curies: query_graph.initial_curies(idx),
                },
            );
        }

        let mut incident: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            let (subject_id, object_id) = (
                query_graph.node(edge.underlying().subject).id.clone(),
                query_graph.node(edge.underlying().object).id.clone(),
            );
            incident.entry(subject_id).or_default().push(i);
            incident.entry(object_id).or_default().push(i);
        }

        EdgeManager {
            query_graph,
            edges,
            node_state,
            incident,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.edges.iter().any(|e| !e.executed)
    }

    fn endpoint_ids(&self, edge: &QXEdge) -> (String, String) {
        (
            self.query_graph.node(edge.underlying().subject).id.clone(),
            self.query_graph.node(edge.underlying().object).id.clone(),
        )
    }

    /// When a node's entity count is still unknown (no fixed curies, no edge executed yet), use
    /// the number of matching MetaKG operations as a cardinality proxy (§4.2).
    pub fn estimate_unresolved_counts(&mut self, metakg: &dyn MetaKgCatalog) {
        for idx in 0..self.edges.len() {
            let edge = &self.edges[idx];
            if edge.executed {
                continue;
            }
            let (subject_id, object_id) = self.endpoint_ids(edge);
            let subject = self.query_graph.node(self.edges[idx].underlying().subject);
            let object = self.query_graph.node(self.edges[idx].underlying().object);
            let ops = metakg.matching_operations(
                &subject.categories,
                self.edges[idx].predicates(),
                &object.categories,
            );
            let proxy = ops.len() as u64;
            for node_id in [&subject_id, &object_id] {
                let state = self.node_state.get_mut(node_id).unwrap();
                if state.entity_count == u64::MAX && proxy > 0 {
                    state.entity_count = proxy;
                }
            }
        }
    }

    /// Picks the next unexecuted edge: lowest product of endpoint `entity_count`; ties broken
    /// by presence of a bound input (a node already holding resolved curies from a prior edge),
    /// then by edge id. Flips `reverse` so the input side currently has the smaller resolved
    /// curie set, a decision frozen once the edge executes.
    pub fn next(&mut self) -> Option<usize> {
        let mut best: Option<(usize, u128, bool, &str)> = None;
        for (i, edge) in self.edges.iter().enumerate() {
            if edge.executed {
                continue;
            }
            let (subject_id, object_id) = self.endpoint_ids(edge);
            let subject_count = self.node_state[&subject_id].entity_count as u128;
            let object_count = self.node_state[&object_id].entity_count as u128;
            let product = subject_count.saturating_mul(object_count);
            let has_bound_input = !self.node_state[&subject_id].resolved_curies.is_empty()
                || !self.node_state[&object_id].resolved_curies.is_empty();
            // Higher priority key sorts first: lower product, then "has a bound input" (true
            // before false), then lexicographically smaller edge id.
            let candidate = (i, product, !has_bound_input, edge.qedge_id());
            best = Some(match best {
                None => candidate,
                Some(current) => {
                    if (candidate.1, candidate.2, candidate.3) < (current.1, current.2, current.3)
                    {
                        candidate
                    } else {
                        current
                    }
                }
            });
        }

        let (idx, ..) = best?;
        self.freeze_direction(idx);
        self.set_predecessor(idx);
        Some(idx)
    }

    /// Records which already-executed neighbor (if any) seeded this edge's bound input — a
    /// shared QNode on either endpoint that an already-executed edge also touches
    /// (§3 "QExecutionEdge ... predecessor"). Ties among multiple executed neighbors are broken
    /// by qedge id, for determinism.
    fn set_predecessor(&mut self, idx: usize) {
        let (subject_id, object_id) = self.endpoint_ids(&self.edges[idx]);
        let mut candidates: Vec<usize> = Vec::new();
        for node_id in [&subject_id, &object_id] {
            if let Some(neighbors) = self.incident.get(node_id) {
                for &n in neighbors {
                    if n != idx && self.edges[n].executed {
                        candidates.push(n);
                    }
                }
            }
        }
        candidates.sort_by_key(|&n| self.edges[n].qedge_id().to_string());
        self.edges[idx].predecessor = candidates.first().copied();
    }

    /// Flips `reverse` on the chosen edge so its input side has the smaller resolved curie set,
    /// if that's knowable yet (both sides already have some resolved curies).
    fn freeze_direction(&mut self, idx: usize) {
        let (subject_id, object_id) = self.endpoint_ids(&self.edges[idx]);
        let subject_resolved = self.node_state[&subject_id].resolved_curies.len();
        let object_resolved = self.node_state[&object_id].resolved_curies.len();
        let edge = &mut self.edges[idx];
        if subject_resolved > 0 && object_resolved > 0 {
            let currently_input_is_subject = !edge.reverse;
            let input_len = if currently_input_is_subject {
                subject_resolved
            } else {
                object_resolved
            };
            let output_len = if currently_input_is_subject {
                object_resolved
            } else {
                subject_resolved
            };
            if output_len < input_len {
                edge.reverse = !edge.reverse;
            }
        }
    }

    /// Attaches `records` to `edge`, updates the endpoints' resolved-curie sets and
    /// `entity_count` (§4.2 "storeRecords"), then propagates to neighbors (§4.3).
    ///
    /// Returns `true` if the edge yielded zero records — the caller's terminal-empty signal.
    pub fn store_records(&mut self, idx: usize, records: Vec<Record>) -> bool {
        let is_empty = records.is_empty();
        let (subject_id, object_id) = self.endpoint_ids(&self.edges[idx]);
        let (input_id, output_id) = {
            let edge = &self.edges[idx];
            (
                edge.input_qnode(&subject_id, &object_id),
                edge.output_qnode(&subject_id, &object_id),
            )
        };

        {
            let edge = &mut self.edges[idx];
            edge.set_records(records);
            edge.executed = true;
        }

        let input_curies: IndexSet<Curie> = self.edges[idx]
            .records()
            .unwrap_or(&[])
            .iter()
            .map(|r| r.subject.curie().clone())
            .collect();
        let output_curies: IndexSet<Curie> = self.edges[idx]
            .records()
            .unwrap_or(&[])
            .iter()
            .map(|r| r.object.curie().clone())
            .collect();

        self.edges[idx].set_input_curies(input_curies.clone());
        self.edges[idx].set_output_curies(output_curies.clone());

        self.intersect_node_curies(&input_id, &input_curies);
        self.intersect_node_curies(&output_id, &output_curies);

        self.propagate(idx);

        is_empty
    }

    fn intersect_node_curies(&mut self, node_id: &str, contribution: &IndexSet<Curie>) {
        let state = self.node_state.get_mut(node_id).unwrap();
        if state.resolved_curies.is_empty() {
            state.resolved_curies = contribution.clone();
        } else {
            state.resolved_curies = state
                .resolved_curies
                .intersection(contribution)
                .cloned()
                .collect();
        }
        state.entity_count = state.resolved_curies.len() as u64;
    }

    /// For every edge sharing a QNode with `edges[idx]`, intersects that shared node's resolved
    /// set with the propagating edge's contribution, then filters each neighbor's stored
    /// records. Iterates to a fixed point: termination is guaranteed because every iteration
    /// either shrinks at least one curie set or leaves all sets unchanged (§4.3).
    fn propagate(&mut self, idx: usize) {
        let mut queue: Vec<usize> = vec![idx];
        let mut in_queue: IndexSet<usize> = [idx].into_iter().collect();

        while let Some(current) = queue.pop() {
            in_queue.swap_remove(&current);
            let (subject_id, object_id) = self.endpoint_ids(&self.edges[current]);

            for node_id in [subject_id, object_id] {
                let Some(neighbor_indices) = self.incident.get(&node_id).cloned() else {
                    continue;
                };
                let allowed = self.node_state[&node_id].resolved_curies.clone();
                for neighbor_idx in neighbor_indices {
                    if neighbor_idx == current {
                        continue;
                    }
                    if self.edges[neighbor_idx].records().is_none() {
                        continue; // hasn't executed yet, nothing to prune
                    }
                    let (n_subject, n_object) = self.endpoint_ids(&self.edges[neighbor_idx]);
                    let (n_input, n_output) = {
                        let e = &self.edges[neighbor_idx];
                        (e.input_qnode(&n_subject, &n_object), e.output_qnode(&n_subject, &n_object))
                    };
                    let shrank = record_store::retain_consistent_with(
                        &mut self.edges[neighbor_idx],
                        &node_id,
                        &n_input,
                        &n_output,
                        &allowed,
                    );
                    if shrank {
                        let remaining: IndexSet<Curie> = record_store::curies_for_node(
                            &self.edges[neighbor_idx],
                            &node_id,
                            &n_input,
                            &n_output,
                        )
                        .unwrap_or_default();
                        self.intersect_node_curies(&node_id, &remaining);
                        if in_queue.insert(neighbor_idx) {
                            queue.push(neighbor_idx);
                        }
                    }
                }
            }
        }
    }

    /// Surviving records keyed by original QEdge id, with `connected_to` derived from shared
    /// QNodes (§4.2 "collect/organize").
    pub fn collect(&self) -> IndexMap<String, (Vec<Record>, Vec<Connection>)> {
        let mut out = IndexMap::new();
        for edge in &self.edges {
            let records = edge.records().unwrap_or(&[]).to_vec();
            let (subject_id, object_id) = (
                self.query_graph.node(edge.underlying().subject).id.clone(),
                self.query_graph.node(edge.underlying().object).id.clone(),
            );
            let mut connections = Vec::new();
            for node_id in [&subject_id, &object_id] {
                if let Some(neighbors) = self.incident.get(node_id) {
                    for &n in neighbors {
                        let neighbor_qedge = &self.edges[n];
                        if neighbor_qedge.qedge_id() != edge.qedge_id() {
                            connections.push(Connection {
                                qedge_id: neighbor_qedge.qedge_id().to_string(),
                                shared_qnode: node_id.to_string(),
                            });
                        }
                    }
                }
            }
            out.insert(edge.qedge_id().to_string(), (records, connections));
        }
        out
    }

    pub fn edges(&self) -> &[QXEdge] {
        &self.edges
    }

    pub fn node_entity_count(&self, node_id: &str) -> Option<u64> {
        self.node_state.get(node_id).map(|s| s.entity_count)
    }

    pub fn resolved_curies(&self, node_id: &str) -> Option<&IndexSet<Curie>> {
        self.node_state.get(node_id).map(|s| &s.resolved_curies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_graph::QueryGraph;
    use crate::record::test_support::record;
    use crate::trapi;
    use std::collections::BTreeMap;

    fn two_hop_graph() -> trapi::QueryGraph {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "n1".to_string(),
            trapi::QNodeSpec {
                categories: Some(vec!["biolink:Gene".to_string()]),
                ids: Some(vec!["NCBIGene:3778".to_string()]),
                is_set: None,
            },
        );
        nodes.insert(
            "n2".to_string(),
            trapi::QNodeSpec {
                categories: Some(vec!["biolink:Disease".to_string()]),
                ids: None,
                is_set: None,
            },
        );
        nodes.insert(
            "n3".to_string(),
            trapi::QNodeSpec {
                categories: Some(vec!["biolink:Gene".to_string()]),
                ids: Some(vec!["NCBIGene:7289".to_string()]),
                is_set: None,
            },
        );
        let mut edges = BTreeMap::new();
        edges.insert(
            "e01".to_string(),
            trapi::QEdgeSpec {
                subject: "n1".to_string(),
                object: "n2".to_string(),
                predicates: Some(vec!["biolink:related_to".to_string()]),
            },
        );
        edges.insert(
            "e02".to_string(),
            trapi::QEdgeSpec {
                subject: "n3".to_string(),
                object: "n2".to_string(),
                predicates: Some(vec!["biolink:related_to".to_string()]),
            },
        );
        trapi::QueryGraph { nodes, edges }
    }

    #[test]
    fn dead_end_pruning_scenario() {
        let tg = two_hop_graph();
        let qg = QueryGraph::from_trapi(&tg).unwrap();
        let plan = qg.plan();
        let mut mgr = EdgeManager::new(&qg, plan);

        let e01 = mgr.edges().iter().position(|e| e.qedge_id() == "e01").unwrap();
        let e02 = mgr.edges().iter().position(|e| e.qedge_id() == "e02").unwrap();

        mgr.store_records(
            e01,
            vec![
                record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1"),
                record("NCBIGene:3778", "MONDO:9999999", "biolink:related_to", "api1"),
            ],
        );
        mgr.store_records(
            e02,
            vec![record(
                "NCBIGene:7289",
                "MONDO:0011122",
                "biolink:related_to",
                "api2",
            )],
        );

        let collected = mgr.collect();
        let (e01_records, _) = &collected["e01"];
        assert_eq!(e01_records.len(), 1, "D2 should have been pruned by propagation");
        assert_eq!(e01_records[0].object.curie().as_str(), "MONDO:0011122");
    }

    #[test]
    fn next_picks_lowest_cardinality_product() {
        let tg = two_hop_graph();
        let qg = QueryGraph::from_trapi(&tg).unwrap();
        let plan = qg.plan();
        let mut mgr = EdgeManager::new(&qg, plan);
        // Both edges have one fixed-curie side (count 1) and one unresolved side (MAX); product
        // ties, so the tie-break (no bound input yet, then edge id) should pick e01.
        let idx = mgr.next().unwrap();
        assert_eq!(mgr.edges()[idx].qedge_id(), "e01");
    }

    #[test]
    fn predecessor_records_the_edge_that_seeded_the_input() {
        let tg = two_hop_graph();
        let qg = QueryGraph::from_trapi(&tg).unwrap();
        let plan = qg.plan();
        let mut mgr = EdgeManager::new(&qg, plan);

        let first = mgr.next().unwrap();
        assert!(mgr.edges()[first].predecessor.is_none(), "first edge has no predecessor");
        mgr.store_records(
            first,
            vec![record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1")],
        );

        let second = mgr.next().unwrap();
        assert_ne!(first, second);
        assert_eq!(mgr.edges()[second].predecessor, Some(first));
    }

    #[test]
    fn has_pending_reflects_execution_state() {
        let tg = two_hop_graph();
        let qg = QueryGraph::from_trapi(&tg).unwrap();
        let plan = qg.plan();
        let mut mgr = EdgeManager::new(&qg, plan);
        assert!(mgr.has_pending());
        let idx = mgr.next().unwrap();
        mgr.store_records(idx, vec![]);
        assert!(mgr.has_pending());
    }
}
