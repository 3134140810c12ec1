//! Evaluation report types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockId, BlockKind};
use crate::correction::CorrectionAudit;
use crate::feedback::Feedback;
use crate::score::{Score, Severity};

/// Feedback as presented for one score.
///
/// Strengths appear only for low-priority scores; recommendations only for
/// medium and high priority ones. The full lists stay on the [`Score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackBundle {
    pub priority: Severity,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub recommendations: Vec<String>,
}

impl FeedbackBundle {
    pub fn from_score(score: &Score) -> Self {
        let low = score.severity == Severity::Low && !score.is_unavailable();
        Self {
            priority: score.severity,
            strengths: if low { score.strengths.clone() } else { Vec::new() },
            areas_for_improvement: score.areas_for_improvement.clone(),
            recommendations: if low {
                Vec::new()
            } else {
                score.recommendations.clone()
            },
        }
    }

    pub(crate) fn high_priority(feedback: Feedback) -> Self {
        Self {
            priority: Severity::High,
            strengths: Vec::new(),
            areas_for_improvement: feedback.areas_for_improvement,
            recommendations: feedback.recommendations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisReport {
    pub score: Score,
    pub feedback: FeedbackBundle,
}

impl AxisReport {
    pub fn new(score: Score) -> Self {
        let feedback = FeedbackBundle::from_score(&score);
        Self { score, feedback }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BlockStatus {
    Scored,
    /// An accepted correction replaced the original content.
    Corrected,
    UnresolvedAccuracyConcern { reason: String },
    /// The scoring service could not produce a judgment.
    Unavailable { reason: String },
    /// No terminal score was recorded for an eligible block.
    EvaluationFailed { reason: String },
    /// The block failed structural validation.
    Unscorable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReport {
    pub position: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BlockKind>,
    pub status: BlockStatus,
    /// Content as reported: the accepted replacement, or the original.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Block>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    pub feedback: FeedbackBundle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<CorrectionAudit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeveritySummary {
    /// Most severe tier across every score and block entry.
    pub overall: Option<Severity>,
    /// `0.6 * relevance + 0.4 * coherence` when both are scored.
    pub overall_score: Option<f64>,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unavailable_scores: usize,
    pub corrected_blocks: usize,
    pub unresolved_accuracy_concerns: usize,
    pub failed_evaluations: usize,
    pub unscorable_blocks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub query: String,
    pub relevance: AxisReport,
    pub coherence: AxisReport,
    pub bias: AxisReport,
    pub blocks: BTreeMap<BlockId, BlockReport>,
    pub summary: SeveritySummary,
}

impl Report {
    /// Every eligible block has a terminal score or an explicit failure marker.
    pub fn is_complete(&self) -> bool {
        self.blocks.values().all(|b| {
            b.score.is_some()
                || matches!(
                    b.status,
                    BlockStatus::EvaluationFailed { .. } | BlockStatus::Unscorable { .. }
                )
        })
    }

    pub fn unresolved_blocks(&self) -> impl Iterator<Item = (&BlockId, &BlockReport)> {
        self.blocks
            .iter()
            .filter(|(_, b)| matches!(b.status, BlockStatus::UnresolvedAccuracyConcern { .. }))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
