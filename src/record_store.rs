//! Record storage helpers and the two-way semi-join constraint-propagation pass (§4.3).
//!
//! Records are held per-edge, directly on the [`QXEdge`] (§4.3: "Records are held per-edge").
//! This module supplies the pure functions the edge manager's `propagate` composes into the
//! fixed-point loop; by convention established for this crate (no counterpart in the
//! distillation, since the original left the subject/object-vs-input/output mapping implicit),
//! a stored [`Record`]'s `subject` side always corresponds to the owning [`QXEdge`]'s *input*
//! (anchor) role and its `object` side to the *output* role — the batch handler is expected to
//! hand back records already oriented this way, so this module never has to consult the
//! original QEdge's subject/object beyond knowing which QNode id is currently "input".

use indexmap::IndexSet;

use crate::execution_edge::QXEdge;
use crate::identifiers::Curie;

/// Distinct curies a stored record set has at `node_id`, given which QNode id is currently
/// playing the input role for this edge. Returns `None` if `node_id` isn't one of this edge's
/// two endpoints.
pub fn curies_for_node(
    edge: &QXEdge,
    node_id: &str,
    input_qnode: &str,
    output_qnode: &str,
) -> Option<IndexSet<Curie>> {
    let Some(records) = edge.records() else {
        return Some(IndexSet::new());
    };
    if node_id == input_qnode {
        Some(records.iter().map(|r| r.subject.curie().clone()).collect())
    } else if node_id == output_qnode {
        Some(records.iter().map(|r| r.object.curie().clone()).collect())
    } else {
        None
    }
}

/// Removes every stored record on `edge` whose curie at `node_id` falls outside `allowed`.
/// Returns `true` if the edge's record set actually shrank (used by the edge manager to decide
/// whether to keep iterating the fixed point).
pub fn retain_consistent_with(
    edge: &mut QXEdge,
    node_id: &str,
    input_qnode: &str,
    output_qnode: &str,
    allowed: &IndexSet<Curie>,
) -> bool {
    let Some(records) = edge.records() else {
        return false;
    };
    let before = records.len();
    let is_input = node_id == input_qnode;
    let is_output = node_id == output_qnode;
    if !is_input && !is_output {
        return false;
    }
    let filtered: Vec<_> = edge
        .take_records()
        .into_iter()
        .filter(|r| {
            let curie = if is_input {
                r.subject.curie()
            } else {
                r.object.curie()
            };
            allowed.contains(curie)
        })
        .collect();
    let after = filtered.len();
    edge.set_records(filtered);
    after < before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_graph::QEdge;
    use crate::record::test_support::record;
    use petgraph::graph::NodeIndex;

    fn edge_with(records: Vec<crate::record::Record>) -> QXEdge {
        let mut e = QXEdge::new(
            QEdge {
                id: "e01".to_string(),
                subject: NodeIndex::new(0),
                object: NodeIndex::new(1),
                predicates: None,
            },
            false,
        );
        e.set_records(records);
        e
    }

    #[test]
    fn curies_for_node_splits_by_role() {
        let edge = edge_with(vec![record("A", "D1", "p", "api"), record("A", "D2", "p", "api")]);
        let input = curies_for_node(&edge, "n1", "n1", "n2").unwrap();
        let output = curies_for_node(&edge, "n2", "n1", "n2").unwrap();
        assert_eq!(input.len(), 1);
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn retain_prunes_and_reports_shrink() {
        let mut edge =
            edge_with(vec![record("A", "D1", "p", "api"), record("A", "D2", "p", "api")]);
        let allowed: IndexSet<Curie> = [Curie::new("D1")].into_iter().collect();
        let shrank = retain_consistent_with(&mut edge, "n2", "n1", "n2", &allowed);
        assert!(shrank);
        assert_eq!(edge.records().unwrap().len(), 1);
    }

    #[test]
    fn retain_on_unrelated_node_is_noop() {
        let mut edge = edge_with(vec![record("A", "D1", "p", "api")]);
        let allowed: IndexSet<Curie> = IndexSet::new();
        let shrank = retain_consistent_with(&mut edge, "n9", "n1", "n2", &allowed);
        assert!(!shrank);
        assert_eq!(edge.records().unwrap().len(), 1);
    }
}
