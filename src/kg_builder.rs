//! The knowledge-graph builder (§4.7): an observer that turns stored records into the TRAPI
//! knowledge graph, independent of which records survive into a result.
//!
//! Modeled as an observer (`RecordStoreObserver`) rather than something the edge manager calls
//! directly, so a deployment can register more than one observer (e.g. one building the KG, one
//! just counting records per API for telemetry) without the edge manager knowing about either.

use std::collections::BTreeSet;

use crate::record::Record;
use crate::trapi::{Attribute, KGEdge, KGNode, KnowledgeGraph, RetrievalSource};

/// Identifies the QNodes and categories an executed edge's input/output sides are currently
/// bound to, so an observer can attribute a record's endpoints back to query-graph identifiers
/// (§3 "KGNode ... sets of source/target QNode identifiers") without re-deriving them itself.
#[derive(Debug, Clone, Copy)]
pub struct EdgeContext<'a> {
    pub qedge_id: &'a str,
    pub subject_qnode_id: &'a str,
    pub subject_categories: &'a [String],
    pub object_qnode_id: &'a str,
    pub object_categories: &'a [String],
}

/// Receives every record the instant it's stored on an execution edge (§4.7: "invoked
/// synchronously on storeRecords", i.e. before constraint propagation can prune it back out —
/// the knowledge graph is a record of everything *seen*, not everything that survives).
pub trait RecordStoreObserver: Send + Sync {
    fn on_records_stored(&mut self, ctx: &EdgeContext<'_>, records: &[Record]);
}

/// Accumulates [`KnowledgeGraph`] nodes and edges as records arrive.
#[derive(Default)]
pub struct KgBuilder {
    graph: KnowledgeGraph,
    /// Curated source identifiers promoted to `primary_knowledge_source` rather than folded into
    /// the generic aggregator/primary pair (§4.7 "Attribute shaping").
    curated_sources: BTreeSet<String>,
    /// Source identifiers whose upstream API is itself TRAPI-native — their attributes pass
    /// through unchanged rather than being rewrapped under this engine's own conventions
    /// (§4.7 "Attribute shaping").
    trapi_native_sources: BTreeSet<String>,
}

impl KgBuilder {
    pub fn new(curated_sources: Vec<String>, trapi_native_sources: Vec<String>) -> Self {
        KgBuilder {
            graph: KnowledgeGraph::default(),
            curated_sources: curated_sources.into_iter().collect(),
            trapi_native_sources: trapi_native_sources.into_iter().collect(),
        }
    }

    /// `role` is the QNode id this curie is currently bound to, and `is_source` is whether that
    /// binding is the edge's subject (source) side or its object (target) side — tracked as
    /// separate sets on the node per §3.
    #[allow(clippy::too_many_arguments)]
    fn upsert_node(
        &mut self,
        curie: &str,
        categories: &[String],
        label: Option<&str>,
        equivalents: &[crate::identifiers::Curie],
        qnode_id: &str,
        is_source: bool,
    ) {
        let entry = self.graph.nodes.entry(curie.to_string()).or_insert_with(|| KGNode {
            categories: categories.to_vec(),
            name: label.map(str::to_string),
            equivalent_identifiers: Vec::new(),
            alternate_names: Vec::new(),
            source_qnode_ids: Vec::new(),
            target_qnode_ids: Vec::new(),
            attributes: Vec::new(),
        });
        for category in categories {
            if !entry.categories.contains(category) {
                entry.categories.push(category.clone());
            }
        }
        match (&entry.name, label) {
            (None, Some(label)) => entry.name = Some(label.to_string()),
            (Some(existing), Some(label)) if existing != label && !entry.alternate_names.iter().any(|n| n == label) => {
                entry.alternate_names.push(label.to_string());
            }
            _ => {}
        }
        for equivalent in equivalents {
            let equivalent = equivalent.to_string();
            if equivalent != curie && !entry.equivalent_identifiers.contains(&equivalent) {
                entry.equivalent_identifiers.push(equivalent);
            }
        }
        let qnode_ids = if is_source {
            &mut entry.source_qnode_ids
        } else {
            &mut entry.target_qnode_ids
        };
        if !qnode_ids.iter().any(|id| id == qnode_id) {
            qnode_ids.push(qnode_id.to_string());
        }
    }

    /// Builds the `RetrievalSource` entries for one record, following the three-way split (§4.7):
    /// a TRAPI-native or curated source is itself the `primary_knowledge_source` directly
    /// (this engine's own aggregation step is uninvolved); anything else is reported as
    /// `supporting_data_source` behind this engine's own aggregator attribution.
    fn sources_for(&self, record: &Record) -> Vec<RetrievalSource> {
        if self.trapi_native_sources.contains(&record.source) || self.curated_sources.contains(&record.source) {
            vec![RetrievalSource {
                resource_id: record.source.clone(),
                resource_role: "primary_knowledge_source".to_string(),
                upstream_resource_ids: None,
            }]
        } else {
            vec![
                RetrievalSource {
                    resource_id: crate::trapi::AGGREGATOR_INFORES.to_string(),
                    resource_role: "primary_knowledge_source".to_string(),
                    upstream_resource_ids: Some(vec![record.source.clone()]),
                },
                RetrievalSource {
                    resource_id: record.source.clone(),
                    resource_role: "supporting_data_source".to_string(),
                    upstream_resource_ids: None,
                },
            ]
        }
    }

    /// Shapes a record's attributes, following the same three-way split as [`Self::sources_for`]
    /// (§4.7): a TRAPI-native source's attribute keys are already valid `attribute_type_id`
    /// strings, so they pass through unchanged; a curated or generic source's attribute keys are
    /// this engine's own internal field names, so they're wrapped under a generic attribute type
    /// with the original name preserved for traceability.
    fn attributes_for(&self, record: &Record) -> Vec<Attribute> {
        let mut attrs: Vec<Attribute> = if self.trapi_native_sources.contains(&record.source) {
            record
                .attributes
                .iter()
                .map(|(name, value)| Attribute {
                    attribute_type_id: name.clone(),
                    value: value.clone(),
                    original_attribute_name: None,
                })
                .collect()
        } else {
            record
                .attributes
                .iter()
                .map(|(name, value)| Attribute {
                    attribute_type_id: "biolink:has_attribute".to_string(),
                    value: value.clone(),
                    original_attribute_name: Some(name.clone()),
                })
                .collect()
        };
        if !record.publications.is_empty() {
            attrs.push(Attribute {
                attribute_type_id: "biolink:publications".to_string(),
                value: serde_json::json!(record.publications),
                original_attribute_name: None,
            });
        }
        attrs
    }

    fn upsert_edge(&mut self, record: &Record) {
        let sources = self.sources_for(record);
        let attributes = self.attributes_for(record);
        let key = crate::identifiers::hash_key(record.hash);
        self.graph.edges.entry(key).or_insert_with(|| KGEdge {
            subject: record.subject.curie().to_string(),
            predicate: record.predicate.clone(),
            object: record.object.curie().to_string(),
            sources,
            publications: record.publications.clone(),
            attributes,
        });
    }

    pub fn into_knowledge_graph(self) -> KnowledgeGraph {
        self.graph
    }

    /// Drops any node or edge not referenced by a surviving result (§4.7 "prune pass") — run
    /// once, after assembly, against the final curie/hash sets the assembler produced.
    pub fn prune(
        graph: &mut KnowledgeGraph,
        referenced_curies: &BTreeSet<String>,
        referenced_edge_keys: &BTreeSet<String>,
    ) {
        graph.nodes.retain(|curie, _| referenced_curies.contains(curie));
        graph.edges.retain(|key, _| referenced_edge_keys.contains(key));
    }
}

impl RecordStoreObserver for KgBuilder {
    fn on_records_stored(&mut self, ctx: &EdgeContext<'_>, records: &[Record]) {
        for record in records {
            self.upsert_node(
                record.subject.curie().as_str(),
                ctx.subject_categories,
                record.subject.normalized.label.as_deref(),
                &record.subject.normalized.equivalent_curies,
                ctx.subject_qnode_id,
                true,
            );
            self.upsert_node(
                record.object.curie().as_str(),
                ctx.object_categories,
                record.object.normalized.label.as_deref(),
                &record.object.normalized.equivalent_curies,
                ctx.object_qnode_id,
                false,
            );
            self.upsert_edge(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::record;

    fn ctx<'a>(subject_categories: &'a [String], object_categories: &'a [String]) -> EdgeContext<'a> {
        EdgeContext {
            qedge_id: "e01",
            subject_qnode_id: "n1",
            subject_categories,
            object_qnode_id: "n2",
            object_categories,
        }
    }

    #[test]
    fn stores_node_and_edge_for_each_record() {
        let mut builder = KgBuilder::new(vec![], vec![]);
        let r = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        builder.on_records_stored(&ctx(&[], &[]), std::slice::from_ref(&r));
        let kg = builder.into_knowledge_graph();
        assert_eq!(kg.nodes.len(), 2);
        assert_eq!(kg.edges.len(), 1);
    }

    #[test]
    fn node_categories_come_from_the_edge_endpoints() {
        let mut builder = KgBuilder::new(vec![], vec![]);
        let r = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        let subject_categories = vec!["biolink:Gene".to_string()];
        let object_categories = vec!["biolink:Disease".to_string()];
        builder.on_records_stored(
            &ctx(&subject_categories, &object_categories),
            std::slice::from_ref(&r),
        );
        let kg = builder.into_knowledge_graph();
        assert_eq!(
            kg.nodes["NCBIGene:3778"].categories,
            vec!["biolink:Gene".to_string()]
        );
        assert_eq!(
            kg.nodes["MONDO:0011122"].categories,
            vec!["biolink:Disease".to_string()]
        );
    }

    #[test]
    fn node_source_and_target_qnode_ids_are_recorded() {
        let mut builder = KgBuilder::new(vec![], vec![]);
        let r = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        builder.on_records_stored(&ctx(&[], &[]), std::slice::from_ref(&r));
        let kg = builder.into_knowledge_graph();
        assert_eq!(kg.nodes["NCBIGene:3778"].source_qnode_ids, vec!["n1".to_string()]);
        assert!(kg.nodes["NCBIGene:3778"].target_qnode_ids.is_empty());
        assert_eq!(kg.nodes["MONDO:0011122"].target_qnode_ids, vec!["n2".to_string()]);
        assert!(kg.nodes["MONDO:0011122"].source_qnode_ids.is_empty());
    }

    #[test]
    fn disagreeing_labels_become_alternate_names() {
        let mut builder = KgBuilder::new(vec![], vec![]);
        let mut first = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        first.subject.normalized.label = Some("BRCA1".to_string());
        let mut second = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api2");
        second.subject.normalized.label = Some("breast cancer 1 gene".to_string());
        builder.on_records_stored(&ctx(&[], &[]), &[first, second]);
        let kg = builder.into_knowledge_graph();
        let node = &kg.nodes["NCBIGene:3778"];
        assert_eq!(node.name.as_deref(), Some("BRCA1"));
        assert_eq!(node.alternate_names, vec!["breast cancer 1 gene".to_string()]);
    }

    #[test]
    fn curated_source_becomes_primary_knowledge_source() {
        let mut builder = KgBuilder::new(vec!["api1".to_string()], vec![]);
        let r = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        builder.on_records_stored(&ctx(&[], &[]), std::slice::from_ref(&r));
        let kg = builder.into_knowledge_graph();
        let edge = kg.edges.values().next().unwrap();
        assert_eq!(edge.sources.len(), 1);
        assert_eq!(edge.sources[0].resource_role, "primary_knowledge_source");
        assert_eq!(edge.sources[0].resource_id, "api1");
    }

    #[test]
    fn trapi_native_source_passes_attributes_through() {
        let mut builder = KgBuilder::new(vec![], vec!["api1".to_string()]);
        let mut r = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        r.attributes.insert(
            "biolink:aggregator_knowledge_source".to_string(),
            serde_json::json!("infores:upstream"),
        );
        builder.on_records_stored(&ctx(&[], &[]), std::slice::from_ref(&r));
        let kg = builder.into_knowledge_graph();
        let edge = kg.edges.values().next().unwrap();

        assert_eq!(edge.sources.len(), 1);
        assert_eq!(edge.sources[0].resource_role, "primary_knowledge_source");
        assert_eq!(edge.sources[0].resource_id, "api1");

        let attr = edge
            .attributes
            .iter()
            .find(|a| a.attribute_type_id == "biolink:aggregator_knowledge_source")
            .expect("native attribute key passed through unchanged");
        assert!(attr.original_attribute_name.is_none());
    }

    #[test]
    fn non_curated_source_gets_aggregator_pair() {
        let mut builder = KgBuilder::new(vec![], vec![]);
        let r = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        builder.on_records_stored(&ctx(&[], &[]), std::slice::from_ref(&r));
        let kg = builder.into_knowledge_graph();
        let edge = kg.edges.values().next().unwrap();
        assert_eq!(edge.sources.len(), 2);
        assert!(edge
            .sources
            .iter()
            .any(|s| s.resource_role == "supporting_data_source" && s.resource_id == "api1"));
    }

    #[test]
    fn prune_drops_unreferenced_nodes_and_edges() {
        let mut builder = KgBuilder::new(vec![], vec![]);
        builder.on_records_stored(
            &ctx(&[], &[]),
            &[
                record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1"),
                record("NCBIGene:3778", "MONDO:9999999", "biolink:related_to", "api1"),
            ],
        );
        let mut kg = builder.into_knowledge_graph();
        let keep_curies: BTreeSet<String> =
            ["NCBIGene:3778".to_string(), "MONDO:0011122".to_string()].into_iter().collect();
        let keep_edges: BTreeSet<String> = kg
            .edges
            .iter()
            .filter(|(_, e)| e.object == "MONDO:0011122")
            .map(|(k, _)| k.clone())
            .collect();
        KgBuilder::prune(&mut kg, &keep_curies, &keep_edges);
        assert_eq!(kg.nodes.len(), 2);
        assert_eq!(kg.edges.len(), 1);
    }
}
