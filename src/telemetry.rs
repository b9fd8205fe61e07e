//! Thin `tracing` helpers for the execution summary line (§7 "Logging policy").
//!
//! One structured event per query, carrying the counts a deployment operator needs without
//! scraping per-edge debug output — the same "one summary span, fields carry the numbers"
//! shape `apollo-router` uses for its request-level logging.

use tracing::info;

/// Per-API tallies recorded across one query's execution, surfaced in the summary event.
#[derive(Debug, Default, Clone)]
pub struct ExecutionTally {
    pub api_name: String,
    pub records_returned: usize,
    pub calls_made: usize,
}

pub fn log_execution_summary(
    node_count: usize,
    edge_count: usize,
    result_count: usize,
    tallies: &[ExecutionTally],
) {
    info!(
        node_count,
        edge_count,
        result_count,
        api_tally_count = tallies.len(),
        "query execution finished"
    );
    for tally in tallies {
        info!(
            api = %tally.api_name,
            records_returned = tally.records_returned,
            calls_made = tally.calls_made,
            "per-API tally"
        );
    }
}

pub fn log_zero_operations(qedge_id: &str) {
    tracing::warn!(qedge_id, "no MetaKG operations matched this edge; skipping remaining edges");
}

pub fn log_zero_records(qedge_id: &str) {
    tracing::warn!(qedge_id, "edge returned zero records; skipping remaining edges");
}

pub fn log_downstream_error(api: &str, message: &str) {
    tracing::error!(api, message, "downstream API call failed");
}
