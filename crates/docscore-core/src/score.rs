//! Scores, severity tiers and evaluator identities.
//!
//! Every evaluator produces a [`Score`]: a value in `[0, 1]` (or the explicit
//! unavailable sentinel), a severity tier, a confidence, and feedback lists.
//!
//! Severity is always derived from the *quality* of a score, which for bias
//! is `1 - value` because a higher bias value is worse.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feedback::{self, Feedback};

/// Quality at or above this is low priority.
pub const LOW_PRIORITY_THRESHOLD: f64 = 0.8;

/// Quality at or above this (and below [`LOW_PRIORITY_THRESHOLD`]) is medium priority.
pub const MEDIUM_PRIORITY_THRESHOLD: f64 = 0.5;

/// Weight of relevance in the overall response score.
pub const RELEVANCE_WEIGHT: f64 = 0.6;

/// Weight of coherence in the overall response score.
pub const COHERENCE_WEIGHT: f64 = 0.4;

/// What a score measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Relevance,
    Coherence,
    Bias,
    Accuracy,
}

impl Axis {
    pub fn polarity(&self) -> Polarity {
        match self {
            Axis::Bias => Polarity::LowerIsBetter,
            _ => Polarity::HigherIsBetter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Relevance => "relevance",
            Axis::Coherence => "coherence",
            Axis::Bias => "bias",
            Axis::Accuracy => "accuracy",
        }
    }

    /// The evaluator responsible for this axis.
    pub fn evaluator(&self) -> EvaluatorKind {
        match self {
            Axis::Relevance | Axis::Coherence => EvaluatorKind::RelevanceCoherence,
            Axis::Bias => EvaluatorKind::Bias,
            Axis::Accuracy => EvaluatorKind::Accuracy,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independent scoring component. Resilience state is kept per evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    Bias,
    Accuracy,
    RelevanceCoherence,
}

impl EvaluatorKind {
    pub const ALL: [EvaluatorKind; 3] = [
        EvaluatorKind::Bias,
        EvaluatorKind::Accuracy,
        EvaluatorKind::RelevanceCoherence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorKind::Bias => "bias",
            EvaluatorKind::Accuracy => "accuracy",
            EvaluatorKind::RelevanceCoherence => "relevance_coherence",
        }
    }
}

impl fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
}

impl Polarity {
    /// Map a raw value to quality, where higher is always better.
    pub fn quality(&self, value: f64) -> f64 {
        match self {
            Polarity::HigherIsBetter => value,
            Polarity::LowerIsBetter => 1.0 - value,
        }
    }
}

/// Priority tier. Ordered so that `max` picks the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn from_quality(quality: f64) -> Self {
        if quality >= LOW_PRIORITY_THRESHOLD {
            Severity::Low
        } else if quality >= MEDIUM_PRIORITY_THRESHOLD {
            Severity::Medium
        } else {
            Severity::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A score value, or the explicit marker that no judgment could be obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScoreValue {
    Scored { value: f64 },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub axis: Axis,
    pub value: ScoreValue,
    pub severity: Severity,
    pub confidence: f64,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub statistics: BTreeMap<String, Value>,
}

impl Score {
    /// Build a scored result. The value is clamped to `[0, 1]`.
    ///
    /// The feedback is topped up so that a low-priority score always carries a
    /// strength and a medium or high priority score always carries a
    /// recommendation.
    pub fn scored(axis: Axis, value: f64, confidence: f64, feedback: Feedback) -> Self {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        let severity = Severity::from_quality(axis.polarity().quality(value));
        let feedback = feedback::ensure_tier_coverage(axis, severity, feedback);

        Self {
            axis,
            value: ScoreValue::Scored { value },
            severity,
            confidence: clamp_unit(confidence),
            strengths: feedback.strengths,
            areas_for_improvement: feedback.areas_for_improvement,
            recommendations: feedback.recommendations,
            statistics: BTreeMap::new(),
        }
    }

    /// The unavailable sentinel: high severity, zero confidence.
    pub fn unavailable(axis: Axis, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let feedback = feedback::unavailable(axis, &reason);
        let mut statistics = BTreeMap::new();
        statistics.insert("evaluation_unavailable".to_string(), Value::Bool(true));

        Self {
            axis,
            value: ScoreValue::Unavailable { reason },
            severity: Severity::High,
            confidence: 0.0,
            strengths: feedback.strengths,
            areas_for_improvement: feedback.areas_for_improvement,
            recommendations: feedback.recommendations,
            statistics,
        }
    }

    pub fn with_statistic(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.statistics.insert(key.into(), value.into());
        self
    }

    /// Cap confidence, recording the ceiling that applied.
    pub fn with_confidence_ceiling(mut self, ceiling: f64) -> Self {
        let ceiling = clamp_unit(ceiling);
        if self.confidence > ceiling {
            self.confidence = ceiling;
        }
        self.statistics
            .insert("confidence_ceiling".to_string(), Value::from(ceiling));
        self
    }

    /// Scale confidence, e.g. for a degraded fallback path.
    pub fn discounted(mut self, factor: f64) -> Self {
        self.confidence = clamp_unit(self.confidence * factor);
        self
    }

    pub fn value(&self) -> Option<f64> {
        match self.value {
            ScoreValue::Scored { value } => Some(value),
            ScoreValue::Unavailable { .. } => None,
        }
    }

    /// Value mapped so that higher is better.
    pub fn quality(&self) -> Option<f64> {
        self.value().map(|v| self.axis.polarity().quality(v))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.value, ScoreValue::Unavailable { .. })
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.value {
            ScoreValue::Unavailable { reason } => Some(reason),
            ScoreValue::Scored { .. } => None,
        }
    }
}

/// Weighted response score, available only when both inputs are scored.
pub fn overall_score(relevance: &Score, coherence: &Score) -> Option<f64> {
    Some(RELEVANCE_WEIGHT * relevance.value()? + COHERENCE_WEIGHT * coherence.value()?)
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
