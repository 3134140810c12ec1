//! Document ingestion.
//!
//! A document is accepted as long as its envelope is well formed. Blocks that
//! fail validation are set aside as [`RejectedBlock`]s and the rest of the
//! document proceeds to evaluation.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::block::{self, Block, BlockId, BlockKind, ValidationError};
use crate::citation::{CitationExtractor, CitationSet, CitationTable};
use crate::schema;

/// Top-level input problems that stop a document before any evaluation.
#[derive(Error, Debug)]
pub enum PipelineAbort {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document envelope is malformed: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("document query is blank")]
    BlankQuery,

    #[error("duplicate block id '{0}'")]
    DuplicateBlockId(BlockId),
}

/// A block that passed validation, with its extracted evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentBlock {
    pub id: BlockId,
    pub position: usize,
    pub block: Block,
    pub citations: CitationSet,
}

/// A block that failed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedBlock {
    pub id: BlockId,
    pub position: usize,
    /// Kind named by the raw record, when it named a known one.
    pub kind: Option<BlockKind>,
    pub error: ValidationError,
}

impl RejectedBlock {
    /// Rejected metric and table blocks still belong in the accuracy report.
    pub fn is_accuracy_eligible(&self) -> bool {
        self.kind.map(|k| k.is_accuracy_eligible()).unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub query: String,
    pub blocks: Vec<DocumentBlock>,
    pub rejected: Vec<RejectedBlock>,
    pub citation_table: CitationTable,
}

impl Document {
    pub fn from_json(json: &str) -> Result<Self, PipelineAbort> {
        let value: Value = serde_json::from_str(json)?;
        Self::ingest(&value)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PipelineAbort> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Validate the envelope, then every block independently.
    pub fn ingest(value: &Value) -> Result<Self, PipelineAbort> {
        schema::validate_document_schema(value).map_err(PipelineAbort::Schema)?;

        let query = value
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if query.is_empty() {
            return Err(PipelineAbort::BlankQuery);
        }

        let raw_blocks = value
            .get("blocks")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let citation_table = CitationTable::from_value(value.get("citations"));
        let extractor = CitationExtractor::new(citation_table.clone());

        let mut seen = BTreeSet::new();
        let mut blocks = Vec::new();
        let mut rejected = Vec::new();

        for (position, raw) in raw_blocks.iter().enumerate() {
            let id = block_id(raw, position);
            if !seen.insert(id.clone()) {
                return Err(PipelineAbort::DuplicateBlockId(id));
            }

            match block::validate(raw) {
                Ok(block) => {
                    let citations = extractor.extract(&block, raw.get("citations"));
                    blocks.push(DocumentBlock {
                        id,
                        position,
                        block,
                        citations,
                    });
                }
                Err(error) => {
                    tracing::debug!(block = %id, error = %error, "block failed validation");
                    rejected.push(RejectedBlock {
                        id,
                        position,
                        kind: raw
                            .get("type")
                            .and_then(Value::as_str)
                            .and_then(BlockKind::from_tag),
                        error,
                    });
                }
            }
        }

        Ok(Self {
            query: query.to_string(),
            blocks,
            rejected,
            citation_table,
        })
    }

    /// Valid metric and table blocks, in document order.
    pub fn accuracy_eligible(&self) -> impl Iterator<Item = &DocumentBlock> {
        self.blocks.iter().filter(|b| b.block.is_accuracy_eligible())
    }

    /// Concatenated prose of paragraph (and optionally header) blocks.
    pub fn prose(&self, include_headers: bool) -> String {
        self.blocks
            .iter()
            .filter_map(|b| b.block.prose(include_headers))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Every valid block rendered as text, in document order.
    pub fn rendered(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.block.render_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Explicit `id` (string or number) or a positional fallback.
fn block_id(raw: &Value, position: usize) -> BlockId {
    match raw.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => BlockId::new(id.trim()),
        Some(Value::Number(n)) => BlockId::new(n.to_string()),
        _ => BlockId::positional(position),
    }
}
