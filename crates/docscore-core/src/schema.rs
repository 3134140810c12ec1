//! JSON Schema validation for the document envelope.
//!
//! Only the envelope (query, block list, citation table) is checked here.
//! Blocks are validated one at a time by [`crate::block::validate`].

use std::sync::OnceLock;
use thiserror::Error;

/// Embedded document schema (loaded at compile time).
const DOCUMENT_SCHEMA_JSON: &str = include_str!("../schema/document.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

#[derive(Error, Debug, Clone)]
pub enum SchemaError {
    #[error("failed to load document schema: {0}")]
    LoadError(String),
}

fn get_validator() -> Result<&'static jsonschema::Validator, SchemaError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = match serde_json::from_str(DOCUMENT_SCHEMA_JSON) {
            Ok(v) => v,
            Err(e) => return Err(format!("invalid schema JSON: {}", e)),
        };

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("failed to compile schema: {}", e))
    });

    result.as_ref().map_err(|e| SchemaError::LoadError(e.clone()))
}

/// Validate a document envelope.
///
/// Returns every violation as `"<message> at <instance path>"`.
pub fn validate_document_schema(document: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

pub fn is_valid_document(document: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(document))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_document_passes() {
        let value = json!({"query": "What is string theory?", "blocks": []});
        assert!(validate_document_schema(&value).is_ok());
    }

    #[test]
    fn test_malformed_blocks_do_not_fail_envelope() {
        let value = json!({
            "query": "q",
            "blocks": [42, {"type": "table", "rows": [["a"], ["b", "c"]]}]
        });
        assert!(is_valid_document(&value));
    }

    #[test]
    fn test_missing_query_fails() {
        let errors = validate_document_schema(&json!({"blocks": []})).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_blocks_must_be_array() {
        assert!(!is_valid_document(&json!({"query": "q", "blocks": {"0": {}}})));
    }

    #[test]
    fn test_empty_query_fails() {
        assert!(!is_valid_document(&json!({"query": "", "blocks": []})));
    }

    #[test]
    fn test_citation_table_entries() {
        let ok = json!({
            "query": "q",
            "blocks": [],
            "citations": {"1": "snippet", "2": {"snippet": "s", "confidence": 0.4}}
        });
        assert!(is_valid_document(&ok));

        let bad = json!({
            "query": "q",
            "blocks": [],
            "citations": {"1": {"snippet": "s", "confidence": 4}}
        });
        assert!(!is_valid_document(&bad));
    }
}
