//! Evaluators, one per scoring axis family.
//!
//! Every evaluator is total: a missing or malformed judgment yields the
//! unavailable sentinel score, never an error. Evaluators hold no mutable
//! state of their own; everything shared lives in the [`ScoringClient`].
//!
//! [`ScoringClient`]: crate::client::ScoringClient

use async_trait::async_trait;

use docscore_core::EvaluatorKind;

mod accuracy;
mod bias;
mod relevance;

pub use accuracy::{AccuracyEvaluator, AccuracyInput, NO_EVIDENCE_CONFIDENCE_CEILING};
pub use bias::BiasEvaluator;
pub use relevance::{RelevanceCoherence, RelevanceCoherenceEvaluator};

/// Confidence assumed when a judgment does not report its own.
pub const DEFAULT_JUDGMENT_CONFIDENCE: f64 = 0.8;

/// Confidence discount applied when a degraded path produced the score.
pub const FALLBACK_CONFIDENCE_FACTOR: f64 = 0.8;

#[async_trait]
pub trait Evaluator: Send + Sync {
    type Input: Sync;
    type Output: Send;

    fn kind(&self) -> EvaluatorKind;

    /// Identical input yields an identical output, given a deterministic or
    /// cached judgment.
    async fn evaluate(&self, input: &Self::Input) -> Self::Output;
}
