//! The results assembler (§4.6): turns per-edge surviving records into TRAPI results.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;

use crate::execution_edge::QXEdge;
use crate::identifiers::Curie;
use crate::query_graph::QueryGraph;
use crate::trapi;

/// One step of a preresult: a single edge's contribution to one concrete path through the
/// query graph's records (§4.6 Step 1).
#[derive(Debug, Clone)]
struct PreresultStep {
    input_qnode_id: String,
    output_qnode_id: String,
    input_curie: Curie,
    output_curie: Curie,
    qedge_id: String,
    record_hash: u64,
}

type Preresult = Vec<PreresultStep>;

struct Topology<'a> {
    edges: &'a [QXEdge],
    /// QNode id -> original (subject_id, object_id) per execution edge, keyed by edge index.
    endpoints: Vec<(String, String)>,
    /// QNode id -> indices of edges touching it.
    incident: HashMap<String, Vec<usize>>,
}

impl<'a> Topology<'a> {
    fn build(query_graph: &'a QueryGraph, edges: &'a [QXEdge]) -> Self {
        let endpoints: Vec<(String, String)> = edges
            .iter()
            .map(|e| {
                (
                    query_graph.node(e.underlying().subject).id.clone(),
                    query_graph.node(e.underlying().object).id.clone(),
                )
            })
            .collect();

        let mut incident: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, (subject_id, object_id)) in endpoints.iter().enumerate() {
            incident.entry(subject_id.clone()).or_default().push(i);
            incident.entry(object_id.clone()).or_default().push(i);
        }

        Topology {
            edges,
            endpoints,
            incident,
        }
    }
}

/// Picks the root QEdge: any edge with a fixed-input endpoint, or an endpoint that appears in
/// only one edge (a leaf of the tree). Ties resolve by edge id (DESIGN.md Open Question 1).
fn choose_root(query_graph: &QueryGraph, edges: &[QXEdge], incident: &HashMap<String, Vec<usize>>) -> usize {
    let mut candidates: Vec<usize> = (0..edges.len())
        .filter(|&i| {
            let subject_id = query_graph.node(edges[i].underlying().subject).id.clone();
            let object_id = query_graph.node(edges[i].underlying().object).id.clone();
            let subject_fixed = query_graph.node(edges[i].underlying().subject).is_fixed_input();
            let object_fixed = query_graph.node(edges[i].underlying().object).is_fixed_input();
            let subject_leaf = incident.get(&subject_id).map(|v| v.len() == 1).unwrap_or(true);
            let object_leaf = incident.get(&object_id).map(|v| v.len() == 1).unwrap_or(true);
            subject_fixed || object_fixed || subject_leaf || object_leaf
        })
        .collect();
    candidates.sort_by_key(|&i| edges[i].qedge_id().to_string());
    *candidates.first().unwrap_or(&0)
}

struct Enumerator<'a> {
    topo: &'a Topology<'a>,
}

impl<'a> Enumerator<'a> {
    fn record_curie(&self, edge_idx: usize, node_id: &str, record: &crate::record::Record) -> Option<Curie> {
        let edge = &self.topo.edges[edge_idx];
        let (subject_id, object_id) = &self.topo.endpoints[edge_idx];
        let input_id = edge.input_qnode(subject_id, object_id);
        let output_id = edge.output_qnode(subject_id, object_id);
        if node_id == input_id {
            Some(record.subject.curie().clone())
        } else if node_id == output_id {
            Some(record.object.curie().clone())
        } else {
            None
        }
    }

    fn build_step(&self, edge_idx: usize, record: &crate::record::Record) -> PreresultStep {
        let edge = &self.topo.edges[edge_idx];
        let (subject_id, object_id) = &self.topo.endpoints[edge_idx];
        PreresultStep {
            input_qnode_id: edge.input_qnode(subject_id, object_id),
            output_qnode_id: edge.output_qnode(subject_id, object_id),
            input_curie: record.subject.curie().clone(),
            output_curie: record.object.curie().clone(),
            qedge_id: edge.qedge_id().to_string(),
            record_hash: record.hash,
        }
    }

    /// Explores the subtree rooted at `edge_idx`. `anchor` is `Some((node_id, curie))` for every
    /// non-root edge (the curie the parent already fixed at the shared node); `None` only for
    /// the root, where every record is a valid starting point.
    fn explore(&self, edge_idx: usize, anchor: Option<(String, Curie)>, visited: IndexSet<usize>) -> Vec<Preresult> {
        let (subject_id, object_id) = self.topo.endpoints[edge_idx].clone();
        let far_sides: Vec<String> = match &anchor {
            Some((anchor_id, _)) => {
                if *anchor_id == subject_id {
                    vec![object_id.clone()]
                } else {
                    vec![subject_id.clone()]
                }
            }
            None => vec![subject_id.clone(), object_id.clone()],
        };

        let mut visited = visited;
        visited.insert(edge_idx);

        let records: Vec<&crate::record::Record> = match &self.topo.edges[edge_idx].records() {
            Some(records) => records
                .iter()
                .filter(|r| match &anchor {
                    Some((anchor_id, anchor_curie)) => {
                        self.record_curie(edge_idx, anchor_id, r).as_ref() == Some(anchor_curie)
                    }
                    None => true,
                })
                .collect(),
            None => Vec::new(),
        };

        let mut results = Vec::new();
        for record in records {
            let step = self.build_step(edge_idx, record);

            let mut branch_alternatives: Vec<Vec<Preresult>> = Vec::new();
            for far_node in &far_sides {
                let far_curie = self
                    .record_curie(edge_idx, far_node, record)
                    .expect("far node must be one of this edge's two endpoints");
                let neighbors = self.topo.incident.get(far_node).cloned().unwrap_or_default();
                for neighbor in neighbors {
                    if visited.contains(&neighbor) {
                        continue;
                    }
                    branch_alternatives.push(self.explore(
                        neighbor,
                        Some((far_node.clone(), far_curie.clone())),
                        visited.clone(),
                    ));
                }
            }

            if branch_alternatives.is_empty() {
                results.push(vec![step.clone()]);
                continue;
            }
            for combo in branch_alternatives.into_iter().multi_cartesian_product() {
                let mut combined = vec![step.clone()];
                combined.extend(combo.into_iter().flatten());
                results.push(combined);
            }
        }
        results
    }
}

/// Per-node token for the consolidation key (§4.6 Step 2): the bare QNode id if it's marked
/// `is_set`, else `QNodeID-curie`.
fn consolidation_key(query_graph: &QueryGraph, preresult: &Preresult) -> String {
    let mut assignment: IndexMap<String, Curie> = IndexMap::new();
    for step in preresult {
        assignment
            .entry(step.input_qnode_id.clone())
            .or_insert_with(|| step.input_curie.clone());
        assignment
            .entry(step.output_qnode_id.clone())
            .or_insert_with(|| step.output_curie.clone());
    }

    let is_set = |node_id: &str| -> bool {
        query_graph
            .nodes()
            .find(|(_, n)| n.id == node_id)
            .map(|(_, n)| n.is_set)
            .unwrap_or(false)
    };

    let mut tokens: Vec<String> = assignment
        .into_iter()
        .map(|(node_id, curie)| {
            if is_set(&node_id) {
                node_id
            } else {
                format!("{node_id}-{curie}")
            }
        })
        .collect();
    tokens.sort();
    tokens.join("\u{1f}")
}

/// Converts executed execution edges into TRAPI results (§4.6 Steps 1-4).
pub fn assemble(query_graph: &QueryGraph, edges: &[QXEdge]) -> Vec<trapi::ResultEntry> {
    if edges.is_empty() {
        return Vec::new();
    }
    let topo = Topology::build(query_graph, edges);
    let root = choose_root(query_graph, edges, &topo.incident);

    let enumerator = Enumerator { topo: &topo };
    let preresults: Vec<Preresult> = enumerator
        .explore(root, None, IndexSet::new())
        .into_iter()
        .filter(|p| p.len() == edges.len())
        .collect();

    // Step 3: group by consolidation key, then merge positionally-by-qedge-id.
    let mut groups: IndexMap<String, Vec<Preresult>> = IndexMap::new();
    for preresult in preresults {
        let key = consolidation_key(query_graph, &preresult);
        groups.entry(key).or_default().push(preresult);
    }

    let mut out = Vec::new();
    for (_key, members) in groups {
        let mut node_bindings: IndexMap<String, IndexSet<Curie>> = IndexMap::new();
        let mut edge_bindings: IndexMap<String, IndexSet<u64>> = IndexMap::new();

        for preresult in &members {
            for step in preresult {
                node_bindings
                    .entry(step.input_qnode_id.clone())
                    .or_default()
                    .insert(step.input_curie.clone());
                node_bindings
                    .entry(step.output_qnode_id.clone())
                    .or_default()
                    .insert(step.output_curie.clone());
                edge_bindings
                    .entry(step.qedge_id.clone())
                    .or_default()
                    .insert(step.record_hash);
            }
        }

        out.push(trapi::ResultEntry::new(node_bindings, edge_bindings));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::record;
    use crate::trapi;
    use std::collections::BTreeMap;

    fn build(is_set_n2: bool) -> (QueryGraph, Vec<QXEdge>) {
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
                is_set: Some(is_set_n2),
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
        let mut edges_spec = BTreeMap::new();
        edges_spec.insert(
            "e01".to_string(),
            trapi::QEdgeSpec {
                subject: "n1".to_string(),
                object: "n2".to_string(),
                predicates: Some(vec!["biolink:related_to".to_string()]),
            },
        );
        edges_spec.insert(
            "e02".to_string(),
            trapi::QEdgeSpec {
                subject: "n3".to_string(),
                object: "n2".to_string(),
                predicates: Some(vec!["biolink:related_to".to_string()]),
            },
        );
        let tg = trapi::QueryGraph {
            nodes,
            edges: edges_spec,
        };
        let qg = QueryGraph::from_trapi(&tg).unwrap();
        let mut plan = qg.plan();

        for e in plan.iter_mut() {
            if e.qedge_id() == "e01" {
                e.set_records(vec![
                    record("NCBIGene:3778", "MONDO:D1", "biolink:related_to", "api1"),
                    record("NCBIGene:3778", "MONDO:D2", "biolink:related_to", "api1"),
                    record("NCBIGene:3778", "MONDO:D3", "biolink:related_to", "api1"),
                ]);
                e.executed = true;
            } else {
                e.set_records(vec![
                    record("NCBIGene:7289", "MONDO:D1", "biolink:related_to", "api2"),
                    record("NCBIGene:7289", "MONDO:D2", "biolink:related_to", "api2"),
                    record("NCBIGene:7289", "MONDO:D3", "biolink:related_to", "api2"),
                ]);
                e.executed = true;
            }
        }
        (qg, plan)
    }

    #[test]
    fn is_set_collapses_to_one_result() {
        let (qg, edges) = build(true);
        let results = assemble(&qg, &edges);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].node_bindings["n2"].len(), 3);
    }

    #[test]
    fn without_is_set_three_results() {
        let (qg, edges) = build(false);
        let results = assemble(&qg, &edges);
        assert_eq!(results.len(), 3);
        for r in &results {
            assert_eq!(r.node_bindings["n2"].len(), 1);
        }
    }

    #[test]
    fn two_hop_single_result_two_edge_bindings() {
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
        let mut edges_spec = BTreeMap::new();
        edges_spec.insert(
            "e01".to_string(),
            trapi::QEdgeSpec {
                subject: "n1".to_string(),
                object: "n2".to_string(),
                predicates: Some(vec!["biolink:related_to".to_string()]),
            },
        );
        edges_spec.insert(
            "e02".to_string(),
            trapi::QEdgeSpec {
                subject: "n3".to_string(),
                object: "n2".to_string(),
                predicates: Some(vec!["biolink:related_to".to_string()]),
            },
        );
        let tg = trapi::QueryGraph {
            nodes,
            edges: edges_spec,
        };
        let qg = QueryGraph::from_trapi(&tg).unwrap();
        let mut plan = qg.plan();
        for e in plan.iter_mut() {
            if e.qedge_id() == "e01" {
                e.set_records(vec![record(
                    "NCBIGene:3778",
                    "MONDO:0011122",
                    "biolink:related_to",
                    "api1",
                )]);
            } else {
                e.set_records(vec![record(
                    "NCBIGene:7289",
                    "MONDO:0011122",
                    "biolink:related_to",
                    "api2",
                )]);
            }
            e.executed = true;
        }
        let results = assemble(&qg, &plan);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].edge_bindings.len(), 2);
        assert_eq!(results[0].node_bindings["n1"].len(), 1);
        assert_eq!(results[0].node_bindings["n2"].len(), 1);
        assert_eq!(results[0].node_bindings["n3"].len(), 1);
    }
}
