//! Block model and structural validation.
//!
//! A generated document is a sequence of typed blocks. Raw block records arrive
//! as JSON objects tagged with a `type` field; [`validate`] turns one record into
//! a [`Block`] or a [`ValidationError`] explaining why it cannot be scored.
//!
//! | Type | Required fields |
//! |------|-----------------|
//! | `paragraph` | `text` |
//! | `header` | `text` |
//! | `ai_image` | `prompt`, `url` |
//! | `web_image` | `query`, `url` |
//! | `ai_chart` | `spec`, `data` |
//! | `web_chart` | `query`, `url` |
//! | `quote` | `text`, `source` |
//! | `metric` | `number`, `description` |
//! | `table` | `rows` |
//! | `tweet` | `url`, `text` |

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

lazy_static! {
    /// Absolute http(s) URL with a dotted host.
    static ref URL_PATTERN: Regex = Regex::new(
        r"(?i)^https?://[^\s/?#@]+\.[^\s/?#@]+(?::\d{1,5})?(?:[/?#]\S*)?$"
    ).unwrap();

    /// A quantity is a digit or a spelled-out number word.
    static ref QUANTITY_PATTERN: Regex = Regex::new(
        r"(?i)\d|\b(zero|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|twenty|thirty|forty|fifty|sixty|seventy|eighty|ninety|hundred|thousand|million|billion|trillion|dozen|half|quarter|percent)\b"
    ).unwrap();
}

/// Stable identifier of a block within its document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier assigned to blocks that carry no explicit `id`.
    pub fn positional(position: usize) -> Self {
        Self(format!("block-{}", position))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discriminant of a [`Block`], usable without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Header,
    AiImage,
    WebImage,
    AiChart,
    WebChart,
    Quote,
    Metric,
    Table,
    Tweet,
}

impl BlockKind {
    pub const ALL: [BlockKind; 10] = [
        BlockKind::Paragraph,
        BlockKind::Header,
        BlockKind::AiImage,
        BlockKind::WebImage,
        BlockKind::AiChart,
        BlockKind::WebChart,
        BlockKind::Quote,
        BlockKind::Metric,
        BlockKind::Table,
        BlockKind::Tweet,
    ];

    /// The `type` tag used in raw block records.
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Paragraph => "paragraph",
            BlockKind::Header => "header",
            BlockKind::AiImage => "ai_image",
            BlockKind::WebImage => "web_image",
            BlockKind::AiChart => "ai_chart",
            BlockKind::WebChart => "web_chart",
            BlockKind::Quote => "quote",
            BlockKind::Metric => "metric",
            BlockKind::Table => "table",
            BlockKind::Tweet => "tweet",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == tag)
    }

    /// Metric and table blocks are the only ones scored for accuracy.
    pub fn is_accuracy_eligible(&self) -> bool {
        matches!(self, BlockKind::Metric | BlockKind::Table)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Paragraph { text: String },
    Header { text: String },
    AiImage { prompt: String, url: String },
    WebImage { query: String, url: String },
    AiChart { spec: String, data: Value },
    WebChart { query: String, url: String },
    Quote { text: String, source: String },
    Metric { number: String, description: String },
    Table { rows: Vec<Vec<String>> },
    Tweet { url: String, text: String },
}

impl Block {
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Paragraph { .. } => BlockKind::Paragraph,
            Block::Header { .. } => BlockKind::Header,
            Block::AiImage { .. } => BlockKind::AiImage,
            Block::WebImage { .. } => BlockKind::WebImage,
            Block::AiChart { .. } => BlockKind::AiChart,
            Block::WebChart { .. } => BlockKind::WebChart,
            Block::Quote { .. } => BlockKind::Quote,
            Block::Metric { .. } => BlockKind::Metric,
            Block::Table { .. } => BlockKind::Table,
            Block::Tweet { .. } => BlockKind::Tweet,
        }
    }

    pub fn is_accuracy_eligible(&self) -> bool {
        self.kind().is_accuracy_eligible()
    }

    /// Prose carried by the block, if it is a textual block.
    ///
    /// Headers are returned only when `include_headers` is set.
    pub fn prose(&self, include_headers: bool) -> Option<&str> {
        match self {
            Block::Paragraph { text } => Some(text),
            Block::Header { text } if include_headers => Some(text),
            _ => None,
        }
    }

    /// Plain-text rendering used when a block is shown to the scoring service.
    pub fn render_text(&self) -> String {
        match self {
            Block::Paragraph { text } => text.clone(),
            Block::Header { text } => format!("## {}", text),
            Block::AiImage { prompt, url } => format!("[AI-generated image: {}] ({})", prompt, url),
            Block::WebImage { query, url } => format!("[Web image for \"{}\"] ({})", query, url),
            Block::AiChart { spec, data } => format!("[AI chart: {}] data: {}", spec, data),
            Block::WebChart { query, url } => format!("[Web chart for \"{}\"] ({})", query, url),
            Block::Quote { text, source } => format!("\"{}\" ({})", text, source),
            Block::Metric {
                number,
                description,
            } => format!("Metric: {} ({})", number, description),
            Block::Table { rows } => rows
                .iter()
                .map(|row| format!("| {} |", row.join(" | ")))
                .collect::<Vec<_>>()
                .join("\n"),
            Block::Tweet { url, text } => format!("Tweet: {} ({})", text, url),
        }
    }
}

/// Why a raw block record was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("block record is not a JSON object")]
    NotAnObject,

    #[error("block record has no 'type' tag")]
    MissingType,

    #[error("unknown block type '{0}'")]
    UnknownKind(String),

    #[error("{kind} block is missing required field '{field}'")]
    MissingField { kind: BlockKind, field: &'static str },

    #[error("{kind} field '{field}' must be {expected}")]
    WrongType {
        kind: BlockKind,
        field: &'static str,
        expected: &'static str,
    },

    #[error("{kind} field '{field}' is not a well-formed URL: '{value}'")]
    MalformedUrl {
        kind: BlockKind,
        field: &'static str,
        value: String,
    },

    #[error("metric number '{0}' does not carry a quantity")]
    NotAQuantity(String),

    #[error("table has no header row")]
    EmptyTable,

    #[error("table row {row} has {found} cells but the header has {expected}")]
    RaggedTable {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("table cell [{row}][{column}] is not a scalar value")]
    InvalidCell { row: usize, column: usize },
}

/// Validate one raw block record.
pub fn validate(raw: &Value) -> Result<Block, ValidationError> {
    let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;

    let tag = match obj.get("type") {
        Some(Value::String(tag)) => tag.as_str(),
        _ => return Err(ValidationError::MissingType),
    };
    let kind = BlockKind::from_tag(tag).ok_or_else(|| ValidationError::UnknownKind(tag.to_string()))?;

    let fields = Fields { obj, kind };

    let block = match kind {
        BlockKind::Paragraph => Block::Paragraph {
            text: fields.text("text")?,
        },
        BlockKind::Header => Block::Header {
            text: fields.text("text")?,
        },
        BlockKind::AiImage => Block::AiImage {
            prompt: fields.text("prompt")?,
            url: fields.url("url")?,
        },
        BlockKind::WebImage => Block::WebImage {
            query: fields.text("query")?,
            url: fields.url("url")?,
        },
        BlockKind::AiChart => Block::AiChart {
            spec: fields.text("spec")?,
            data: fields.value("data")?,
        },
        BlockKind::WebChart => Block::WebChart {
            query: fields.text("query")?,
            url: fields.url("url")?,
        },
        BlockKind::Quote => Block::Quote {
            text: fields.text("text")?,
            source: fields.text("source")?,
        },
        BlockKind::Metric => {
            let number = fields.scalar("number")?;
            if !QUANTITY_PATTERN.is_match(&number) {
                return Err(ValidationError::NotAQuantity(number));
            }
            Block::Metric {
                number,
                description: fields.text("description")?,
            }
        }
        BlockKind::Table => Block::Table {
            rows: fields.rows("rows")?,
        },
        BlockKind::Tweet => Block::Tweet {
            url: fields.url("url")?,
            text: fields.text("text")?,
        },
    };

    Ok(block)
}

/// Re-validate an already-typed block, e.g. a replacement proposed by a correction.
pub fn revalidate(block: &Block) -> Result<Block, ValidationError> {
    let value = serde_json::to_value(block).map_err(|_| ValidationError::NotAnObject)?;
    validate(&value)
}

/// Check that every row has as many cells as the header row.
pub fn check_rectangular(rows: &[Vec<String>]) -> Result<(), ValidationError> {
    let header = rows.first().ok_or(ValidationError::EmptyTable)?;
    if header.is_empty() {
        return Err(ValidationError::EmptyTable);
    }

    let expected = header.len();
    for (row, cells) in rows.iter().enumerate().skip(1) {
        if cells.len() != expected {
            return Err(ValidationError::RaggedTable {
                row,
                expected,
                found: cells.len(),
            });
        }
    }
    Ok(())
}

/// Field accessors bound to one raw record.
struct Fields<'a> {
    obj: &'a Map<String, Value>,
    kind: BlockKind,
}

impl<'a> Fields<'a> {
    fn get(&self, field: &'static str) -> Result<&'a Value, ValidationError> {
        match self.obj.get(field) {
            None | Some(Value::Null) => Err(ValidationError::MissingField {
                kind: self.kind,
                field,
            }),
            Some(value) => Ok(value),
        }
    }

    /// Non-blank string field.
    fn text(&self, field: &'static str) -> Result<String, ValidationError> {
        match self.get(field)? {
            Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
            Value::String(_) => Err(ValidationError::MissingField {
                kind: self.kind,
                field,
            }),
            _ => Err(ValidationError::WrongType {
                kind: self.kind,
                field,
                expected: "a string",
            }),
        }
    }

    /// String or number, kept as text.
    fn scalar(&self, field: &'static str) -> Result<String, ValidationError> {
        match self.get(field)? {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(_) => self.text(field),
            _ => Err(ValidationError::WrongType {
                kind: self.kind,
                field,
                expected: "a string or number",
            }),
        }
    }

    fn url(&self, field: &'static str) -> Result<String, ValidationError> {
        let url = self.text(field)?;
        if URL_PATTERN.is_match(url.trim()) {
            Ok(url.trim().to_string())
        } else {
            Err(ValidationError::MalformedUrl {
                kind: self.kind,
                field,
                value: url,
            })
        }
    }

    fn value(&self, field: &'static str) -> Result<Value, ValidationError> {
        self.get(field).cloned()
    }

    fn rows(&self, field: &'static str) -> Result<Vec<Vec<String>>, ValidationError> {
        let raw_rows = self.get(field)?.as_array().ok_or(ValidationError::WrongType {
            kind: self.kind,
            field,
            expected: "an array of rows",
        })?;

        let mut rows = Vec::with_capacity(raw_rows.len());
        for (r, raw_row) in raw_rows.iter().enumerate() {
            let cells = raw_row.as_array().ok_or(ValidationError::WrongType {
                kind: self.kind,
                field,
                expected: "an array of rows",
            })?;

            let mut row = Vec::with_capacity(cells.len());
            for (c, cell) in cells.iter().enumerate() {
                let text = match cell {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err(ValidationError::InvalidCell { row: r, column: c }),
                };
                row.push(text);
            }
            rows.push(row);
        }

        check_rectangular(&rows)?;
        Ok(rows)
    }
}
