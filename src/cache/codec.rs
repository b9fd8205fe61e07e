//! Wire format for cached record payloads (§4.5 "Storage format", §5 "Failure isolation"):
//! each record is serialized independently (JSON -> LZ4, via `lz4_flex` -> base64url) into its
//! own token, tokens are joined with a delimiter, and delimited tokens are packed into chunks
//! bounded at [`CHUNK_SIZE_BYTES`] without ever splitting a token across a chunk boundary. Per-
//! record framing is what lets [`decode`] drop a single malformed record with a warning instead
//! of failing the whole cached entry (§5).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::TrapiError;
use crate::record::Record;

/// Chunks are kept comfortably under typical Redis/proxy payload limits (§4.5).
const CHUNK_SIZE_BYTES: usize = 100 * 1024;

/// Separates individual record tokens within a chunk string. `|` can't appear in base64url
/// output, so splitting on it never mis-frames a token.
const TOKEN_DELIMITER: char = '|';

fn encode_record(record: &Record) -> Result<String, TrapiError> {
    let json = serde_json::to_vec(&record.clone().without_trapi_qedge_id())
        .map_err(|e| crate::internal_error!("failed to serialize record for caching: {e}"))?;
    let compressed = lz4_flex::compress_prepend_size(&json);
    Ok(URL_SAFE_NO_PAD.encode(compressed))
}

/// Encodes records into an ordered list of chunk strings, each holding one or more
/// delimiter-separated per-record tokens.
pub fn encode(records: &[Record]) -> Result<Vec<String>, TrapiError> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for record in records {
        let token = encode_record(record)?;
        let additional = if current.is_empty() { token.len() } else { token.len() + 1 };
        if !current.is_empty() && current.len() + additional > CHUNK_SIZE_BYTES {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(TOKEN_DELIMITER);
        }
        current.push_str(&token);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Ok(chunks)
}

/// Reassembles chunks produced by [`encode`] back into records, restoring each record's
/// `trapi_qedge_id` back-reference to `qedge_id` (§8 "Cache round-trip"). A token that fails to
/// decode (bad base64, bad LZ4 frame, bad JSON) is logged and skipped rather than failing the
/// whole call (§5 "Failure isolation") — the caller always gets back whatever records were
/// recoverable, never an error.
pub fn decode(chunks: &[String], qedge_id: &str) -> Vec<Record> {
    let mut records = Vec::new();
    for chunk in chunks {
        for token in chunk.split(TOKEN_DELIMITER) {
            if token.is_empty() {
                continue;
            }
            match decode_token(token) {
                Ok(mut record) => {
                    record.trapi_qedge_id = Some(qedge_id.to_string());
                    records.push(record);
                }
                Err(e) => {
                    tracing::warn!(qedge_id, error = %e, "dropping malformed cached record");
                }
            }
        }
    }
    records
}

fn decode_token(token: &str) -> Result<Record, TrapiError> {
    let compressed = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| crate::internal_error!("invalid base64 in cache token: {e}"))?;
    let json = lz4_flex::decompress_size_prepended(&compressed)
        .map_err(|e| crate::internal_error!("failed to decompress cached record: {e}"))?;
    serde_json::from_slice(&json)
        .map_err(|e| crate::internal_error!("failed to deserialize cached record: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_support::record;

    #[test]
    fn round_trips_small_payload() {
        let records = vec![
            record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1"),
            record("NCBIGene:3778", "MONDO:9999999", "biolink:related_to", "api1"),
        ];
        let chunks = encode(&records).unwrap();
        let decoded = decode(&chunks, "e01");
        assert_eq!(decoded.len(), records.len());
        for (r, expected) in decoded.iter().zip(&records) {
            assert_eq!(r.subject, expected.subject);
            assert_eq!(r.object, expected.object);
            assert_eq!(r.hash, expected.hash);
            assert_eq!(r.trapi_qedge_id.as_deref(), Some("e01"));
        }
    }

    #[test]
    fn round_trips_across_multiple_chunks() {
        let records: Vec<Record> = (0..5000)
            .map(|i| {
                record(
                    "NCBIGene:3778",
                    &format!("MONDO:{i:07}"),
                    "biolink:related_to",
                    "api1",
                )
            })
            .collect();
        let chunks = encode(&records).unwrap();
        assert!(chunks.len() > 1, "payload should have spilled into multiple chunks");
        let decoded = decode(&chunks, "e01");
        assert_eq!(decoded.len(), records.len());
    }

    #[test]
    fn drops_malformed_token_and_keeps_the_rest() {
        let records = vec![
            record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1"),
            record("NCBIGene:3778", "MONDO:9999999", "biolink:related_to", "api1"),
        ];
        let mut chunks = encode(&records).unwrap();
        assert_eq!(chunks.len(), 1);
        chunks[0] = format!("not-valid-base64!!!{TOKEN_DELIMITER}{}", chunks[0]);

        let decoded = decode(&chunks, "e01");
        assert_eq!(decoded.len(), records.len(), "only the malformed token should be dropped");
    }

    #[test]
    fn strips_qedge_id_before_serializing() {
        let mut r = record("NCBIGene:3778", "MONDO:0011122", "biolink:related_to", "api1");
        r.trapi_qedge_id = Some("e99".to_string());
        let chunks = encode(std::slice::from_ref(&r)).unwrap();
        let decoded = decode(&chunks, "e01");
        assert_eq!(decoded[0].trapi_qedge_id.as_deref(), Some("e01"));
    }
}
