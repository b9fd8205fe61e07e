//! [`QXEdge`]: a query edge bound to a direction with runtime state (§3 "QExecutionEdge").

use indexmap::IndexSet;

use crate::identifiers::Curie;
use crate::query_graph::QEdge;
use crate::record::Record;

/// A `QEdge` annotated with a chosen direction and the runtime state accumulated as the edge
/// manager executes it.
#[derive(Debug, Clone)]
pub struct QXEdge {
    edge: QEdge,
    /// Swaps subject/object roles. Frozen the moment [`Self::executed`] becomes true (§3).
    pub reverse: bool,
    /// Index, in the plan's `Vec<QXEdge>`, of the execution edge whose output seeded this
    /// edge's input curie set. `None` for the first edge executed.
    pub predecessor: Option<usize>,
    pub executed: bool,
    input_curies: IndexSet<Curie>,
    output_curies: IndexSet<Curie>,
    records: Option<Vec<Record>>,
}

impl QXEdge {
    pub fn new(edge: QEdge, reverse: bool) -> Self {
        QXEdge {
            edge,
            reverse,
            predecessor: None,
            executed: false,
            input_curies: IndexSet::new(),
            output_curies: IndexSet::new(),
            records: None,
        }
    }

    pub fn qedge_id(&self) -> &str {
        &self.edge.id
    }

    pub fn underlying(&self) -> &QEdge {
        &self.edge
    }

    pub fn predicates(&self) -> Option<&[String]> {
        self.edge.predicates.as_deref()
    }

    /// The QNode id currently playing the "input" (anchor) role, given `reverse`.
    pub fn input_qnode(&self, subject_id: &str, object_id: &str) -> String {
        if self.reverse {
            object_id.to_string()
        } else {
            subject_id.to_string()
        }
    }

    /// The QNode id currently playing the "output" (discovered) role, given `reverse`.
    pub fn output_qnode(&self, subject_id: &str, object_id: &str) -> String {
        if self.reverse {
            subject_id.to_string()
        } else {
            object_id.to_string()
        }
    }

    pub fn input_curies(&self) -> &IndexSet<Curie> {
        &self.input_curies
    }

    pub fn output_curies(&self) -> &IndexSet<Curie> {
        &self.output_curies
    }

    pub fn set_input_curies(&mut self, curies: IndexSet<Curie>) {
        self.input_curies = curies;
    }

    pub fn set_output_curies(&mut self, curies: IndexSet<Curie>) {
        self.output_curies = curies;
    }

    pub fn records(&self) -> Option<&[Record]> {
        self.records.as_deref()
    }

    pub fn take_records(&mut self) -> Vec<Record> {
        self.records.take().unwrap_or_default()
    }

    pub fn set_records(&mut self, records: Vec<Record>) {
        self.records = Some(records);
    }

    /// Whether this edge shares `node_id` with another edge — used to derive
    /// `connected_to` (§4.2 "collect/organize") and for propagation adjacency.
    pub fn touches_node(&self, node_id: &str, subject_id: &str, object_id: &str) -> bool {
        (subject_id == node_id) || (object_id == node_id)
    }
}
