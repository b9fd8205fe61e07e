//! Top-level orchestration (§4's "how the pieces fit together", §9 "Design Notes" loop summary).
//!
//! `Engine::execute` is the one async entry point a TRAPI HTTP handler calls: it drives the
//! cooperative edge-selection loop to completion, then hands the survivors to the results
//! assembler and the knowledge-graph builder. Only [`TrapiError::InvalidQueryGraph`] escapes;
//! every other failure mode degrades to a partial or empty response with an accompanying log
//! entry (§7).

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::batch::{BatchEdgeQueryHandler, EdgeQuery};
use crate::cache::{CacheHandler, CacheKeyInput};
use crate::config::EngineConfig;
use crate::edge_manager::EdgeManager;
use crate::error::TrapiError;
use crate::kg_builder::{KgBuilder, RecordStoreObserver};
use crate::metakg::MetaKgCatalog;
use crate::query_graph::QueryGraph;
use crate::results;
use crate::telemetry::{self, ExecutionTally};
use crate::trapi;

pub struct Engine<'a> {
    pub metakg: &'a dyn MetaKgCatalog,
    pub batch: &'a dyn BatchEdgeQueryHandler,
    pub cache: &'a CacheHandler,
    pub config: &'a EngineConfig,
}

impl<'a> Engine<'a> {
    pub async fn execute(&self, request_query_graph: trapi::QueryGraph) -> Result<trapi::Response, TrapiError> {
        let qg = QueryGraph::from_trapi(&request_query_graph)?;
        let plan = qg.plan();
        let edge_count = plan.len();
        let mut manager = EdgeManager::new(&qg, plan);
        manager.estimate_unresolved_counts(self.metakg);

        let mut kg_builder = KgBuilder::new(
            self.config.curated_sources.clone(),
            self.config.trapi_native_sources.clone(),
        );
        let mut tallies: HashMap<String, ExecutionTally> = HashMap::new();
        let mut logs: Vec<trapi::LogEntry> = Vec::new();

        while let Some(idx) = manager.next() {
            let edge = &manager.edges()[idx];
            let qedge_id = edge.qedge_id().to_string();
            let underlying = edge.underlying().clone();
            let (subject_id, object_id) = (
                qg.node(underlying.subject).id.clone(),
                qg.node(underlying.object).id.clone(),
            );
            let (input_node, output_node) = if edge.reverse {
                (qg.node(underlying.object), qg.node(underlying.subject))
            } else {
                (qg.node(underlying.subject), qg.node(underlying.object))
            };
            let input_qnode_id = edge.input_qnode(&subject_id, &object_id);
            let is_set = output_node.is_set;

            let operations = self
                .metakg
                .matching_operations(&input_node.categories, edge.predicates(), &output_node.categories);
            if operations.is_empty() {
                telemetry::log_zero_operations(&qedge_id);
                logs.push(trapi::LogEntry::warning(format!(
                    "no MetaKG operations matched edge {qedge_id}; remaining edges were not executed"
                )));
                manager.store_records(idx, Vec::new());
                break;
            }

            let input_curies: Vec<_> = manager
                .resolved_curies(&input_qnode_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .collect();
            // §4.5 "Key": the MetaKG-size and API-identifier components are the whole catalog's,
            // not just this edge's matching subset — the key is meant to invalidate whenever the
            // universe of downstream APIs changes, regardless of which edge is being looked up.
            let api_identifiers = self.metakg.all_api_identifiers();

            let cache_key = self.config.caching_active().then(|| {
                key_for(
                    &input_node.categories,
                    edge.predicates(),
                    &output_node.categories,
                    &input_curies,
                    self.metakg.operation_count(),
                    &api_identifiers,
                )
            });

            let cached = match &cache_key {
                Some(key) => self.cache.lookup(key, &qedge_id).await.unwrap_or(None),
                None => None,
            };

            let mut records = match cached {
                Some(records) => records,
                None => {
                    let lock = match &cache_key {
                        Some(key) => self.cache.lock(key, Duration::from_secs(30)).await.unwrap_or(None),
                        None => None,
                    };

                    let query = EdgeQuery {
                        qedge_id: qedge_id.clone(),
                        operations: operations.clone(),
                        input_curies: input_curies.clone(),
                        is_set,
                    };
                    let records = match self.batch.execute(&query).await {
                        Ok(records) => records,
                        Err(TrapiError::DownstreamApiError { api, message }) => {
                            telemetry::log_downstream_error(&api, &message);
                            logs.push(trapi::LogEntry::warning(format!(
                                "downstream API {api} failed: {message}"
                            )));
                            Vec::new()
                        }
                        Err(other) => {
                            logs.push(trapi::LogEntry::warning(format!(
                                "edge {qedge_id} failed: {other}"
                            )));
                            Vec::new()
                        }
                    };

                    if let (Some(key), true) = (&cache_key, self.cache.is_active()) {
                        let _ = self.cache.store(key, &records).await;
                    }
                    if let Some(guard) = lock {
                        let _ = self.cache.unlock(guard).await;
                    }
                    records
                }
            };

            // Re-derive identity hashes under this deployment's configured field list (§4.5
            // "Key") rather than trusting whatever hash a record arrived with, since a cached
            // entry may predate a configuration change and a live record's hash was never
            // computed against this deployment's list at all.
            for record in &mut records {
                record.hash = record.compute_hash(&self.config.identity_fields);
            }

            if let Some(path) = &self.config.dump_records_path {
                if let Err(e) = crate::dump::dump_records(
                    path,
                    &qedge_id,
                    edge.reverse,
                    self.config.dump_records_reverse,
                    &records,
                ) {
                    logs.push(trapi::LogEntry::warning(format!(
                        "failed to dump records for edge {qedge_id}: {e}"
                    )));
                }
            }

            for op in &operations {
                tallies.entry(op.api_name.clone()).or_insert_with(|| ExecutionTally {
                    api_name: op.api_name.clone(),
                    records_returned: 0,
                    calls_made: 0,
                });
                tallies.get_mut(&op.api_name).unwrap().calls_made += 1;
            }
            for record in &records {
                if let Some(tally) = tallies.get_mut(&record.api_name) {
                    tally.records_returned += 1;
                }
            }

            kg_builder.on_records_stored(
                &crate::kg_builder::EdgeContext {
                    qedge_id: &qedge_id,
                    subject_qnode_id: &subject_id,
                    subject_categories: &qg.node(underlying.subject).categories,
                    object_qnode_id: &object_id,
                    object_categories: &qg.node(underlying.object).categories,
                },
                &records,
            );
            let zero = manager.store_records(idx, records);
            if zero {
                telemetry::log_zero_records(&qedge_id);
                logs.push(trapi::LogEntry::warning(format!(
                    "edge {qedge_id} returned zero records; remaining edges were not executed"
                )));
                break;
            }
        }

        let results = results::assemble(&qg, manager.edges());

        let mut referenced_curies = BTreeSet::new();
        let mut referenced_edge_keys = BTreeSet::new();
        for edge in manager.edges() {
            if let Some(records) = edge.records() {
                for record in records {
                    referenced_curies.insert(record.subject.curie().to_string());
                    referenced_curies.insert(record.object.curie().to_string());
                    referenced_edge_keys.insert(crate::identifiers::hash_key(record.hash));
                }
            }
        }
        let mut knowledge_graph = kg_builder.into_knowledge_graph();
        KgBuilder::prune(&mut knowledge_graph, &referenced_curies, &referenced_edge_keys);

        let tallies: Vec<ExecutionTally> = tallies.into_values().collect();
        telemetry::log_execution_summary(qg.nodes().count(), edge_count, results.len(), &tallies);

        Ok(trapi::Response::new(
            trapi::Message {
                query_graph: request_query_graph,
                knowledge_graph,
                results,
            },
            logs,
        ))
    }
}

#[allow(clippy::too_many_arguments)]
fn key_for(
    subject_categories: &[String],
    predicates: Option<&[String]>,
    object_categories: &[String],
    input_curies: &[crate::identifiers::Curie],
    operation_count: usize,
    api_identifiers: &[String],
) -> String {
    crate::cache::key::compute(&CacheKeyInput {
        subject_categories,
        predicates,
        object_categories,
        input_curies,
        metakg_operation_count: operation_count,
        api_identifiers,
    })
}
