//! Offline record dumping (§9 "Design Notes" misc. knobs): appends every record an edge ever
//! stores to a newline-delimited JSON file, for inspecting a deployment's raw downstream traffic
//! without standing up the cache backend.

use std::fs::OpenOptions;
use std::io::Write;

use crate::error::TrapiError;
use crate::record::Record;

/// Appends `records` to `path` as newline-delimited JSON, one line per record, each tagged with
/// the qedge id it was fetched for.
///
/// `reverse` is whether the execution edge ran in the reversed (object-to-subject) direction;
/// when `undo_reverse` is set, a reversed edge's records are swapped back to the query's original
/// subject/object orientation before being written, so the dump always reads in query-graph
/// order regardless of which direction the engine actually executed in.
pub fn dump_records(
    path: &str,
    qedge_id: &str,
    reverse: bool,
    undo_reverse: bool,
    records: &[Record],
) -> Result<(), TrapiError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| crate::internal_error!("failed to open dump-records file {path}: {e}"))?;

    for record in records {
        let record = if reverse && undo_reverse {
            record.clone().swapped()
        } else {
            record.clone()
        };
        let line = serde_json::json!({
            "qedge_id": qedge_id,
            "record": record,
        });
        writeln!(file, "{line}")
            .map_err(|e| crate::internal_error!("failed to write to dump-records file {path}: {e}"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::record;
    use std::io::Read;

    fn read_lines(path: &str) -> Vec<String> {
        let mut contents = String::new();
        std::fs::File::open(path).unwrap().read_to_string(&mut contents).unwrap();
        contents.lines().map(str::to_string).collect()
    }

    #[test]
    fn appends_one_line_per_record() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("trapi-dump-test-{}.ndjson", std::process::id()));
        let path = path.to_str().unwrap();
        let _ = std::fs::remove_file(path);

        let records = vec![
            record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1"),
            record("NCBIGene:3778", "MONDO:9999999", "biolink:related_to", "api1"),
        ];
        dump_records(path, "e01", false, false, &records).unwrap();
        let lines = read_lines(path);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"qedge_id\":\"e01\""));

        dump_records(path, "e02", false, false, &records).unwrap();
        assert_eq!(read_lines(path).len(), 4, "a second call should append, not overwrite");

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn undoes_reverse_direction_when_configured() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("trapi-dump-test-reverse-{}.ndjson", std::process::id()));
        let path = path.to_str().unwrap();
        let _ = std::fs::remove_file(path);

        let records = vec![record(
            "NCBIGene:3778",
            "MONDO:0011122",
            "biolink:related_to",
            "api1",
        )];
        dump_records(path, "e01", true, true, &records).unwrap();
        let lines = read_lines(path);
        let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed["record"]["subject"]["original_curie"], "MONDO:0011122");
        assert_eq!(parsed["record"]["object"]["original_curie"], "NCBIGene:3778");

        std::fs::remove_file(path).unwrap();
    }
}
