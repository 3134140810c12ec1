//! Citation source boundary.
//!
//! Citations a document carries itself always win. A [`CitationSource`] is
//! consulted only for blocks whose own citation data is unavailable.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use docscore_core::{BlockId, Citation, CitationSet, Provenance};

use crate::config::ConfigError;

#[async_trait]
pub trait CitationSource: Send + Sync {
    /// Citations for `block`, or the unavailable marker.
    async fn citations(&self, block: &BlockId) -> CitationSet;

    fn name(&self) -> &str;
}

/// No external evidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCitationSource;

#[async_trait]
impl CitationSource for NoCitationSource {
    async fn citations(&self, _block: &BlockId) -> CitationSet {
        CitationSet::unavailable("no citation source configured")
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Citations keyed by block id, loaded up front.
///
/// ```json
/// {"dims": ["Superstring theory needs ten dimensions.", {"snippet": "...", "source": "https://arxiv.org"}]}
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCitationSource {
    citations: BTreeMap<BlockId, Vec<Citation>>,
}

impl StaticCitationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_citations(mut self, block: BlockId, citations: Vec<Citation>) -> Self {
        self.citations.insert(block, citations);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        let obj = value
            .as_object()
            .ok_or_else(|| ConfigError::Invalid("citation file must be an object keyed by block id".into()))?;

        let mut source = Self::new();
        for (id, entries) in obj {
            let entries = entries
                .as_array()
                .ok_or_else(|| ConfigError::Invalid(format!("citations for '{}' must be a list", id)))?;
            let citations = entries
                .iter()
                .enumerate()
                .filter_map(|(i, entry)| parse_entry(i, entry))
                .collect();
            source.citations.insert(BlockId::new(id.clone()), citations);
        }
        Ok(source)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

fn parse_entry(index: usize, entry: &Value) -> Option<Citation> {
    let reference = format!("external-{}", index + 1);
    match entry {
        Value::String(snippet) if !snippet.trim().is_empty() => {
            Some(Citation::new(reference, snippet.trim(), Provenance::External))
        }
        Value::Object(obj) => {
            let snippet = obj
                .get("snippet")
                .or_else(|| obj.get("text"))
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())?;
            let mut citation = Citation::new(reference, snippet.trim(), Provenance::External);
            if let Some(source) = obj.get("source").or_else(|| obj.get("url")).and_then(Value::as_str) {
                citation = citation.with_source(source);
            }
            if let Some(confidence) = obj.get("confidence").and_then(Value::as_f64) {
                citation = citation.with_confidence(confidence);
            }
            Some(citation)
        }
        _ => None,
    }
}

#[async_trait]
impl CitationSource for StaticCitationSource {
    async fn citations(&self, block: &BlockId) -> CitationSet {
        match self.citations.get(block) {
            Some(citations) => CitationSet::Available {
                citations: citations.clone(),
            },
            None => CitationSet::unavailable(format!("no citations recorded for block '{}'", block)),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// The document's own citations, or the source's when those are unavailable.
pub async fn resolve(source: &dyn CitationSource, block: &BlockId, own: &CitationSet) -> CitationSet {
    if own.is_available() {
        return own.clone();
    }
    match source.citations(block).await {
        external @ CitationSet::Available { .. } => {
            tracing::debug!(block = %block, source = source.name(), "using external citations");
            external
        }
        CitationSet::Unavailable { .. } => own.clone(),
    }
}
