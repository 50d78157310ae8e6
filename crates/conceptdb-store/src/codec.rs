//! Column codec: JSON list columns and f32 vector BLOBs, placeholder-aware.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use conceptdb_core::placeholder::{encode_list, strip_placeholder};
use conceptdb_core::{Error, Placeholder, Result};

use crate::types::MalformedColumn;

/// Encode a list column. Empty lists are written as `[placeholder]`.
pub fn encode_json_list<T: Serialize + Placeholder + Clone>(items: &[T]) -> Result<String> {
    Ok(serde_json::to_string(&encode_list(items))?)
}

/// Decode a list column, surfacing malformed input as `MalformedRecord`.
pub fn try_decode_json_list<T: DeserializeOwned + Placeholder>(
    raw: Option<&str>,
    table: &str,
    id: i64,
) -> Result<Vec<T>> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Vec::new()),
        Some(r) => r,
    };
    let items: Vec<T> = serde_json::from_str(raw).map_err(|e| Error::MalformedRecord {
        table: table.to_string(),
        id,
        reason: e.to_string(),
    })?;
    Ok(strip_placeholder(items))
}

/// Decode a list column, treating malformed input as empty and logging it.
pub fn decode_json_list<T: DeserializeOwned + Placeholder>(
    raw: Option<&str>,
    table: &str,
    id: i64,
) -> Vec<T> {
    match try_decode_json_list(raw, table, id) {
        Ok(items) => items,
        Err(e) => {
            warn!("{}; treating as empty", e);
            Vec::new()
        }
    }
}

/// Decode a source-table list column, recording malformed text on the row.
pub fn decode_source_list<T: DeserializeOwned + Placeholder>(
    raw: Option<&str>,
    table: &str,
    id: i64,
    column: &str,
    malformed: &mut Vec<MalformedColumn>,
) -> Vec<T> {
    match try_decode_json_list(raw, table, id) {
        Ok(items) => items,
        Err(e) => {
            warn!("{} column {}; treating as empty", e, column);
            malformed.push(MalformedColumn {
                column: column.to_string(),
                raw: raw.unwrap_or_default().to_string(),
                reason: e.to_string(),
            });
            Vec::new()
        }
    }
}

/// Encode a source-table list column. A column that was malformed on read
/// and is still logically empty gets its original text back.
pub fn encode_source_list<T: Serialize + Placeholder + Clone>(
    items: &[T],
    column: &str,
    malformed: &[MalformedColumn],
) -> Result<String> {
    if items.is_empty() {
        if let Some(m) = malformed.iter().find(|m| m.column == column) {
            return Ok(m.raw.clone());
        }
    }
    encode_json_list(items)
}

/// Little-endian f32 BLOB. An empty vector is stored as a single `0.0`.
pub fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    encode_list(vector)
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

/// Inverse of [`vector_to_blob`]. Trailing partial floats are ignored.
pub fn blob_to_vector(blob: Option<&[u8]>) -> Vec<f32> {
    let Some(bytes) = blob else {
        return Vec::new();
    };
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    strip_placeholder(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_written_as_placeholder() {
        let ids: Vec<i64> = Vec::new();
        assert_eq!(encode_json_list(&ids).unwrap(), "[0]");
        let names: Vec<String> = Vec::new();
        assert_eq!(encode_json_list(&names).unwrap(), "[\"\"]");
    }

    #[test]
    fn test_placeholder_read_back_as_empty() {
        let ids: Vec<i64> = decode_json_list(Some("[0]"), "concepts", 1);
        assert!(ids.is_empty());
        let names: Vec<String> = decode_json_list(Some("[\"\"]"), "concepts", 1);
        assert!(names.is_empty());
    }

    #[test]
    fn test_malformed_is_empty_but_strict_errors() {
        let ids: Vec<i64> = decode_json_list(Some("not json"), "catalog", 7);
        assert!(ids.is_empty());

        let err = try_decode_json_list::<i64>(Some("{\"a\":1}"), "catalog", 7).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { id: 7, .. }));
    }

    #[test]
    fn test_source_list_keeps_malformed_text() {
        let mut malformed = Vec::new();
        let names: Vec<String> =
            decode_source_list(Some("rust, tokio"), "catalog", 3, "concept_names", &mut malformed);
        assert!(names.is_empty());
        assert_eq!(malformed.len(), 1);
        assert_eq!(malformed[0].column, "concept_names");

        let empty: Vec<String> = Vec::new();
        assert_eq!(
            encode_source_list(&empty, "concept_names", &malformed).unwrap(),
            "rust, tokio"
        );
        assert_eq!(
            encode_source_list(&empty, "category_names", &malformed).unwrap(),
            "[\"\"]"
        );
        let rewritten = vec!["rust".to_string()];
        assert_eq!(
            encode_source_list(&rewritten, "concept_names", &malformed).unwrap(),
            "[\"rust\"]"
        );
    }

    #[test]
    fn test_missing_column_is_empty() {
        let ids: Vec<i64> = decode_json_list(None, "catalog", 1);
        assert!(ids.is_empty());
    }

    #[test]
    fn test_vector_blob() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(blob_to_vector(Some(&vector_to_blob(&v))), v);

        let empty = vector_to_blob(&[]);
        assert_eq!(empty.len(), 4);
        assert!(blob_to_vector(Some(&empty)).is_empty());
        assert!(blob_to_vector(None).is_empty());
    }
}
