//! Citation extraction for accuracy-eligible blocks.
//!
//! Evidence reaches a block in one of two ways: as an embedded list on the
//! block record (`"citations": [...]`), or as references into the
//! document-level citation table (`"citations": {"1": "snippet", ...}`).
//!
//! The extractor keeps two states apart that downstream scoring treats
//! differently:
//!
//! - **Available, empty**: the generator exposed citation data and it was empty.
//! - **Unavailable**: no citation data was exposed, or none of it resolved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::Block;

/// Where a citation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Carried inline on the block record.
    Embedded,
    /// Resolved from the document-level citation table.
    DocumentTable,
    /// Supplied by an external citation source at evaluation time.
    External,
}

/// A piece of source evidence backing a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub reference: String,
    pub snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub confidence: f64,
    pub provenance: Provenance,
}

impl Citation {
    pub fn new(reference: impl Into<String>, snippet: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            reference: reference.into(),
            snippet: snippet.into(),
            source: None,
            confidence: 1.0,
            provenance,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    /// Parse an inline citation object. Requires a non-blank `snippet` or `text`.
    fn from_object(reference: String, obj: &serde_json::Map<String, Value>, provenance: Provenance) -> Option<Self> {
        let snippet = obj
            .get("snippet")
            .or_else(|| obj.get("text"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())?;

        let mut citation = Citation::new(reference, snippet, provenance);
        if let Some(source) = obj.get("source").or_else(|| obj.get("url")).and_then(Value::as_str) {
            citation = citation.with_source(source);
        }
        if let Some(confidence) = obj.get("confidence").and_then(Value::as_f64) {
            citation = citation.with_confidence(confidence);
        }
        Some(citation)
    }
}

/// Citation evidence for one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CitationSet {
    Available { citations: Vec<Citation> },
    Unavailable { reason: String },
}

impl CitationSet {
    pub fn empty() -> Self {
        CitationSet::Available { citations: Vec::new() }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        CitationSet::Unavailable { reason: reason.into() }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, CitationSet::Available { .. })
    }

    /// Available and non-empty.
    pub fn has_evidence(&self) -> bool {
        !self.citations().is_empty()
    }

    pub fn citations(&self) -> &[Citation] {
        match self {
            CitationSet::Available { citations } => citations,
            CitationSet::Unavailable { .. } => &[],
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            CitationSet::Unavailable { reason } => Some(reason),
            CitationSet::Available { .. } => None,
        }
    }
}

/// Document-level citation table, keyed by reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitationTable {
    entries: BTreeMap<String, Citation>,
}

impl CitationTable {
    /// Build from the document's `citations` object. Malformed entries are skipped.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut entries = BTreeMap::new();
        let Some(Value::Object(map)) = value else {
            return Self { entries };
        };

        for (reference, entry) in map {
            let citation = match entry {
                Value::String(snippet) if !snippet.trim().is_empty() => {
                    Some(Citation::new(reference.clone(), snippet.clone(), Provenance::DocumentTable))
                }
                Value::Object(obj) => Citation::from_object(reference.clone(), obj, Provenance::DocumentTable),
                _ => None,
            };
            match citation {
                Some(citation) => {
                    entries.insert(reference.clone(), citation);
                }
                None => tracing::debug!(reference = %reference, "skipping malformed citation table entry"),
            }
        }

        Self { entries }
    }

    pub fn resolve(&self, reference: &str) -> Option<&Citation> {
        self.entries.get(reference.trim())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extracts citation evidence for blocks of one document.
#[derive(Debug, Clone, Default)]
pub struct CitationExtractor {
    table: CitationTable,
}

impl CitationExtractor {
    pub fn new(table: CitationTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CitationTable {
        &self.table
    }

    /// Extract citations for `block` from its raw `citations` field.
    ///
    /// Blocks outside the accuracy-eligible kinds always yield an empty set.
    pub fn extract(&self, block: &Block, embedded: Option<&Value>) -> CitationSet {
        if !block.is_accuracy_eligible() {
            return CitationSet::empty();
        }

        let entries = match embedded {
            None | Some(Value::Null) => {
                return CitationSet::unavailable("generator exposed no citation data for this block");
            }
            Some(Value::Array(entries)) => entries,
            Some(_) => return CitationSet::unavailable("citation data is not a list"),
        };

        if entries.is_empty() {
            return CitationSet::empty();
        }

        let mut citations = Vec::with_capacity(entries.len());
        let mut unresolved = 0usize;

        for (index, entry) in entries.iter().enumerate() {
            match self.resolve_entry(index, entry) {
                Some(citation) => citations.push(citation),
                None => unresolved += 1,
            }
        }

        if citations.is_empty() {
            return CitationSet::unavailable(format!(
                "none of {} citation references could be resolved",
                entries.len()
            ));
        }

        if unresolved > 0 {
            tracing::debug!(
                resolved = citations.len(),
                unresolved,
                "some citation references did not resolve"
            );
        }

        CitationSet::Available { citations }
    }

    fn resolve_entry(&self, index: usize, entry: &Value) -> Option<Citation> {
        match entry {
            Value::String(reference) => self.table.resolve(reference).cloned(),
            Value::Number(n) => self.table.resolve(&n.to_string()).cloned(),
            Value::Object(obj) => {
                let reference = obj
                    .get("ref")
                    .or_else(|| obj.get("id"))
                    .map(|r| match r {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .unwrap_or_else(|| (index + 1).to_string());

                Citation::from_object(reference.clone(), obj, Provenance::Embedded)
                    .or_else(|| self.table.resolve(&reference).cloned())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metric() -> Block {
        Block::Metric {
            number: "10 or 11 dimensions".to_string(),
            description: "Dimensions required by string theory".to_string(),
        }
    }

    fn table_extractor() -> CitationExtractor {
        CitationExtractor::new(CitationTable::from_value(Some(&json!({
            "1": "Superstring theory requires ten spacetime dimensions.",
            "2": {"snippet": "M-theory adds an eleventh dimension.", "source": "https://physics.example.org/m", "confidence": 0.9},
            "3": 42
        }))))
    }

    #[test]
    fn test_non_eligible_block_is_empty() {
        let extractor = table_extractor();
        let block = Block::Paragraph {
            text: "hello".to_string(),
        };
        assert_eq!(extractor.extract(&block, Some(&json!([1, 2]))), CitationSet::empty());
        assert_eq!(extractor.extract(&block, None), CitationSet::empty());
    }

    #[test]
    fn test_absent_citations_unavailable() {
        let set = CitationExtractor::default().extract(&metric(), None);
        assert!(!set.is_available());
        assert!(set.unavailable_reason().is_some());
    }

    #[test]
    fn test_empty_list_is_distinct_from_unavailable() {
        let set = CitationExtractor::default().extract(&metric(), Some(&json!([])));
        assert!(set.is_available());
        assert!(!set.has_evidence());
        assert_ne!(set, CitationExtractor::default().extract(&metric(), None));
    }

    #[test]
    fn test_references_resolve_against_table() {
        let set = table_extractor().extract(&metric(), Some(&json!([1, "2"])));
        let citations = set.citations();
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].provenance, Provenance::DocumentTable);
        assert_eq!(citations[1].source.as_deref(), Some("https://physics.example.org/m"));
        assert!((citations[1].confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_table_entry_skipped() {
        let extractor = table_extractor();
        assert_eq!(extractor.table().len(), 2);
        assert!(extractor.table().resolve("3").is_none());
    }

    #[test]
    fn test_all_unresolved_is_unavailable() {
        let set = table_extractor().extract(&metric(), Some(&json!([7, 8])));
        assert!(!set.is_available());
    }

    #[test]
    fn test_partial_resolution_keeps_resolved() {
        let set = table_extractor().extract(&metric(), Some(&json!([1, 99])));
        assert!(set.has_evidence());
        assert_eq!(set.citations().len(), 1);
    }

    #[test]
    fn test_inline_objects() {
        let set = CitationExtractor::default().extract(
            &metric(),
            Some(&json!([{"text": "Bosonic string theory needs 26 dimensions", "url": "https://a.example.com"}])),
        );
        let citations = set.citations();
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].reference, "1");
        assert_eq!(citations[0].provenance, Provenance::Embedded);
    }

    #[test]
    fn test_non_list_is_unavailable() {
        let set = CitationExtractor::default().extract(&metric(), Some(&json!("see sources")));
        assert_eq!(set, CitationSet::unavailable("citation data is not a list"));
    }

    #[test]
    fn test_confidence_clamped() {
        let c = Citation::new("1", "s", Provenance::External).with_confidence(3.0);
        assert_eq!(c.confidence, 1.0);
        let c = Citation::new("1", "s", Provenance::External).with_confidence(f64::NAN);
        assert_eq!(c.confidence, 0.0);
    }
}
