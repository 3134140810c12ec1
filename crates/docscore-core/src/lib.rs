//! # docscore-core
//!
//! Deterministic half of the docscore evaluation pipeline.
//!
//! This crate owns everything that does not need the scoring service:
//! - the block model and per-block structural validation
//! - citation extraction for metric and table blocks
//! - score, severity and feedback types
//! - rule-based gender bias analysis
//! - the accuracy intervention state machine
//! - aggregation of evaluator outputs into a [`Report`]
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the same inputs always aggregate to the same report
//! 2. **No network calls**: scoring-service judgments are supplied by `docscore-runtime`
//! 3. **Partial acceptance**: one malformed block never rejects its document
//! 4. **Bounded interventions**: every correction loop terminates
//!
//! ## Example
//!
//! ```rust,ignore
//! use docscore_core::{Aggregator, Document, ScoreSet};
//!
//! let document = Document::from_json_file("response.json")?;
//! let mut scores = ScoreSet::new(&document, relevance, coherence, bias);
//! for (id, outcome) in accuracy_outcomes {
//!     scores.record(id, outcome);
//! }
//! let report = Aggregator::new().aggregate(scores);
//! println!("{}", report.to_json_pretty()?);
//! ```

pub mod aggregator;
pub mod bias;
pub mod block;
pub mod citation;
pub mod correction;
pub mod document;
pub mod feedback;
pub mod report;
pub mod schema;
pub mod score;

pub use aggregator::{Aggregator, BlockOutcome, ScoreSet};
pub use bias::BiasAnalysis;
pub use block::{validate, Block, BlockId, BlockKind, ValidationError};
pub use citation::{Citation, CitationExtractor, CitationSet, CitationTable, Provenance};
pub use correction::{
    Correction, CorrectionAudit, CorrectionOutcome, ExhaustionReason, InterventionMachine,
    InterventionPolicy, InterventionState, Resolution,
};
pub use document::{Document, DocumentBlock, PipelineAbort, RejectedBlock};
pub use feedback::Feedback;
pub use report::{AxisReport, BlockReport, BlockStatus, FeedbackBundle, Report, SeveritySummary};
pub use score::{
    Axis, EvaluatorKind, Polarity, Score, ScoreValue, Severity, LOW_PRIORITY_THRESHOLD,
    MEDIUM_PRIORITY_THRESHOLD,
};
