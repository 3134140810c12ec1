//! Aggregator: folds evaluator outputs into a [`Report`].
//!
//! Aggregation is deterministic. The same [`ScoreSet`] always yields the same
//! report, whatever order block outcomes were recorded in. The aggregator
//! never calls out and never invents scores: an eligible block without a
//! recorded outcome is reported as `evaluation_failed`.

use std::collections::BTreeMap;

use crate::block::{Block, BlockId, BlockKind};
use crate::correction::{CorrectionAudit, CorrectionOutcome, Resolution};
use crate::document::{Document, RejectedBlock};
use crate::feedback;
use crate::score::{overall_score, Score, Severity, MEDIUM_PRIORITY_THRESHOLD};
use crate::report::{AxisReport, BlockReport, BlockStatus, FeedbackBundle, Report, SeveritySummary};

/// Final outcome for one accuracy-eligible block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutcome {
    pub score: Score,
    pub content: Block,
    pub correction: Option<CorrectionAudit>,
}

impl BlockOutcome {
    pub fn scored(content: Block, score: Score) -> Self {
        Self {
            score,
            content,
            correction: None,
        }
    }

    /// Outcome after an intervention. An accepted correction replaces both
    /// content and score; otherwise the originals stand.
    pub fn resolved(original: Block, original_score: Score, resolution: Resolution) -> Self {
        match resolution.accepted {
            Some((content, score)) => Self {
                score,
                content,
                correction: Some(resolution.audit),
            },
            None => Self {
                score: original_score,
                content: original,
                correction: Some(resolution.audit),
            },
        }
    }
}

#[derive(Debug, Clone)]
struct EligibleBlock {
    position: usize,
    kind: BlockKind,
}

/// Everything the aggregator needs for one document.
#[derive(Debug, Clone)]
pub struct ScoreSet {
    query: String,
    relevance: Score,
    coherence: Score,
    bias: Score,
    eligible: BTreeMap<BlockId, EligibleBlock>,
    rejected: Vec<RejectedBlock>,
    outcomes: BTreeMap<BlockId, BlockOutcome>,
}

impl ScoreSet {
    pub fn new(document: &Document, relevance: Score, coherence: Score, bias: Score) -> Self {
        let eligible = document
            .accuracy_eligible()
            .map(|b| {
                (
                    b.id.clone(),
                    EligibleBlock {
                        position: b.position,
                        kind: b.block.kind(),
                    },
                )
            })
            .collect();

        Self {
            query: document.query.clone(),
            relevance,
            coherence,
            bias,
            eligible,
            rejected: document.rejected.clone(),
            outcomes: BTreeMap::new(),
        }
    }

    /// Record the terminal outcome for an eligible block.
    ///
    /// Outcomes for unknown ids are dropped.
    pub fn record(&mut self, id: BlockId, outcome: BlockOutcome) {
        if !self.eligible.contains_key(&id) {
            tracing::warn!(block = %id, "ignoring outcome for a block that is not accuracy-eligible");
            return;
        }
        self.outcomes.insert(id, outcome);
    }

    pub fn pending(&self) -> impl Iterator<Item = &BlockId> {
        self.eligible.keys().filter(|id| !self.outcomes.contains_key(*id))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn aggregate(&self, set: ScoreSet) -> Report {
        let ScoreSet {
            query,
            relevance,
            coherence,
            bias,
            eligible,
            rejected,
            mut outcomes,
        } = set;

        let mut blocks = BTreeMap::new();

        for (id, info) in eligible {
            let report = match outcomes.remove(&id) {
                Some(outcome) => self.block_report(info, outcome),
                None => {
                    let reason = "no terminal accuracy score was recorded".to_string();
                    BlockReport {
                        position: info.position,
                        kind: Some(info.kind),
                        status: BlockStatus::EvaluationFailed { reason: reason.clone() },
                        content: None,
                        score: None,
                        feedback: FeedbackBundle::high_priority(
                            feedback::Feedback::default()
                                .area(format!("Accuracy evaluation failed: {}", reason))
                                .recommendation("Re-run the accuracy evaluation for this block"),
                        ),
                        correction: None,
                    }
                }
            };
            blocks.insert(id, report);
        }

        for rejected in rejected {
            let reason = rejected.error.to_string();
            blocks.insert(
                rejected.id.clone(),
                BlockReport {
                    position: rejected.position,
                    kind: rejected.kind,
                    status: BlockStatus::Unscorable { reason },
                    content: None,
                    score: None,
                    feedback: FeedbackBundle::high_priority(feedback::unscorable(rejected.kind, &rejected.error)),
                    correction: None,
                },
            );
        }

        let summary = self.summarize(&relevance, &coherence, &bias, &blocks);

        Report {
            query,
            relevance: AxisReport::new(relevance),
            coherence: AxisReport::new(coherence),
            bias: AxisReport::new(bias),
            blocks,
            summary,
        }
    }

    fn block_report(&self, info: EligibleBlock, outcome: BlockOutcome) -> BlockReport {
        let status = match (&outcome.correction, outcome.score.unavailable_reason()) {
            (Some(audit), _) if audit.outcome == CorrectionOutcome::Accepted => BlockStatus::Corrected,
            (Some(audit), _) => BlockStatus::UnresolvedAccuracyConcern {
                reason: audit
                    .reason
                    .clone()
                    .unwrap_or_else(|| "correction was not accepted".to_string()),
            },
            (None, Some(reason)) => BlockStatus::Unavailable {
                reason: reason.to_string(),
            },
            (None, None) if outcome.score.value().map(|v| v < MEDIUM_PRIORITY_THRESHOLD).unwrap_or(false) => {
                BlockStatus::UnresolvedAccuracyConcern {
                    reason: "no correction was attempted".to_string(),
                }
            }
            (None, None) => BlockStatus::Scored,
        };

        BlockReport {
            position: info.position,
            kind: Some(info.kind),
            status,
            feedback: FeedbackBundle::from_score(&outcome.score),
            content: Some(outcome.content),
            score: Some(outcome.score),
            correction: outcome.correction,
        }
    }

    fn summarize(
        &self,
        relevance: &Score,
        coherence: &Score,
        bias: &Score,
        blocks: &BTreeMap<BlockId, BlockReport>,
    ) -> SeveritySummary {
        let mut summary = SeveritySummary {
            overall_score: overall_score(relevance, coherence),
            ..SeveritySummary::default()
        };

        let scores = [relevance, coherence, bias]
            .into_iter()
            .chain(blocks.values().filter_map(|b| b.score.as_ref()));

        for score in scores {
            count_severity(&mut summary, score.severity);
            if score.is_unavailable() {
                summary.unavailable_scores += 1;
            }
        }

        for block in blocks.values() {
            match block.status {
                BlockStatus::Corrected => summary.corrected_blocks += 1,
                BlockStatus::UnresolvedAccuracyConcern { .. } => summary.unresolved_accuracy_concerns += 1,
                BlockStatus::EvaluationFailed { .. } => {
                    summary.failed_evaluations += 1;
                    count_severity(&mut summary, Severity::High);
                }
                BlockStatus::Unscorable { .. } => {
                    summary.unscorable_blocks += 1;
                    count_severity(&mut summary, Severity::High);
                }
                BlockStatus::Scored | BlockStatus::Unavailable { .. } => {}
            }
        }

        summary
    }
}

fn count_severity(summary: &mut SeveritySummary, severity: Severity) {
    match severity {
        Severity::Low => summary.low += 1,
        Severity::Medium => summary.medium += 1,
        Severity::High => summary.high += 1,
    }
    summary.overall = summary.overall.max(Some(severity));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::{Citation, CitationSet, Provenance};
    use crate::correction::{InterventionMachine, InterventionPolicy};
    use crate::feedback::Feedback;
    use crate::score::Axis;
    use proptest::prelude::*;
    use serde_json::json;

    fn document() -> Document {
        Document::ingest(&json!({
            "query": "Explain string theory",
            "blocks": [
                {"type": "paragraph", "text": "Strings vibrate in many dimensions."},
                {"id": "m1", "type": "metric", "number": "10 or 11 dimensions", "description": "Dimensions"},
                {"id": "t1", "type": "table", "citations": [{"snippet": "M-theory: 11"}],
                 "rows": [["Theory", "Dimensions"], ["M-theory", "26"]]},
                {"id": "bad", "type": "table", "rows": [["a", "b"], ["c"]]}
            ]
        }))
        .unwrap()
    }

    fn score(axis: Axis, value: f64) -> Score {
        let fb = match axis {
            Axis::Relevance => feedback::relevance(value),
            Axis::Coherence => feedback::coherence(value),
            Axis::Bias => feedback::bias(value, None),
            Axis::Accuracy => Feedback::default(),
        };
        Score::scored(axis, value, 0.9, fb)
    }

    fn base() -> ScoreSet {
        ScoreSet::new(
            &document(),
            score(Axis::Relevance, 0.9),
            score(Axis::Coherence, 0.6),
            score(Axis::Bias, 0.0),
        )
    }

    fn block(doc: &Document, id: &str) -> Block {
        doc.blocks
            .iter()
            .find(|b| b.id.as_str() == id)
            .map(|b| b.block.clone())
            .unwrap()
    }

    #[test]
    fn test_missing_outcome_is_evaluation_failed() {
        let doc = document();
        let mut set = base();
        set.record(BlockId::new("m1"), BlockOutcome::scored(block(&doc, "m1"), score(Axis::Accuracy, 0.9)));
        assert_eq!(set.pending().count(), 1);

        let report = Aggregator::new().aggregate(set);
        assert!(report.is_complete());
        assert!(matches!(
            report.blocks[&BlockId::new("t1")].status,
            BlockStatus::EvaluationFailed { .. }
        ));
        assert_eq!(report.summary.failed_evaluations, 1);
        assert_eq!(report.summary.overall, Some(Severity::High));
    }

    #[test]
    fn test_rejected_blocks_are_unscorable() {
        let report = Aggregator::new().aggregate(base());
        let bad = &report.blocks[&BlockId::new("bad")];
        assert!(matches!(bad.status, BlockStatus::Unscorable { .. }));
        assert!(!bad.feedback.recommendations.is_empty());
        assert_eq!(report.summary.unscorable_blocks, 1);
    }

    #[test]
    fn test_paragraphs_are_not_reported_as_blocks() {
        let report = Aggregator::new().aggregate(base());
        assert!(!report.blocks.contains_key(&BlockId::positional(0)));
        assert_eq!(report.blocks.len(), 3);
    }

    #[test]
    fn test_feedback_bundle_follows_tier() {
        let report = Aggregator::new().aggregate(base());
        assert!(!report.relevance.feedback.strengths.is_empty());
        assert!(report.relevance.feedback.recommendations.is_empty());
        assert!(report.coherence.feedback.strengths.is_empty());
        assert!(!report.coherence.feedback.recommendations.is_empty());
        assert!(!report.bias.feedback.strengths.is_empty());
    }

    #[test]
    fn test_overall_score() {
        let report = Aggregator::new().aggregate(base());
        let overall = report.summary.overall_score.unwrap();
        assert!((overall - 0.78).abs() < 1e-9);
    }

    #[test]
    fn test_corrected_block_reports_replacement() {
        let doc = document();
        let original = block(&doc, "t1");
        let original_score = score(Axis::Accuracy, 0.35);
        let citations = CitationSet::Available {
            citations: vec![Citation::new("1", "M-theory: 11", Provenance::Embedded)],
        };

        let mut machine =
            InterventionMachine::detect(InterventionPolicy::default(), &original, &original_score, &citations).unwrap();
        machine.request();
        let corrected = Block::Table {
            rows: vec![vec!["Theory".into(), "Dimensions".into()], vec!["M-theory".into(), "11".into()]],
        };
        machine.record_rescore(corrected.clone(), score(Axis::Accuracy, 0.85));

        let mut set = base();
        set.record(
            BlockId::new("t1"),
            BlockOutcome::resolved(original.clone(), original_score, machine.finish()),
        );
        let report = Aggregator::new().aggregate(set);

        let entry = &report.blocks[&BlockId::new("t1")];
        assert_eq!(entry.status, BlockStatus::Corrected);
        assert_eq!(entry.content.as_ref(), Some(&corrected));
        assert_eq!(entry.correction.as_ref().unwrap().original_content, original);
        assert_eq!(report.summary.corrected_blocks, 1);
    }

    #[test]
    fn test_unavailable_block_score() {
        let doc = document();
        let mut set = base();
        set.record(
            BlockId::new("m1"),
            BlockOutcome::scored(block(&doc, "m1"), Score::unavailable(Axis::Accuracy, "timed out")),
        );
        let report = Aggregator::new().aggregate(set);
        let entry = &report.blocks[&BlockId::new("m1")];
        assert_eq!(entry.status, BlockStatus::Unavailable { reason: "timed out".into() });
        assert_eq!(entry.feedback.priority, Severity::High);
        assert_eq!(report.summary.unavailable_scores, 1);
    }

    #[test]
    fn test_unknown_outcome_ignored() {
        let doc = document();
        let mut set = base();
        set.record(BlockId::positional(0), BlockOutcome::scored(block(&doc, "m1"), score(Axis::Accuracy, 0.9)));
        let report = Aggregator::new().aggregate(set);
        assert!(!report.blocks.contains_key(&BlockId::positional(0)));
    }

    proptest! {
        #[test]
        fn prop_aggregation_is_order_independent(
            m in 0.0f64..=1.0,
            t in 0.0f64..=1.0,
            reverse in proptest::bool::ANY,
        ) {
            let doc = document();
            let outcomes = vec![
                (BlockId::new("m1"), BlockOutcome::scored(block(&doc, "m1"), score(Axis::Accuracy, m))),
                (BlockId::new("t1"), BlockOutcome::scored(block(&doc, "t1"), score(Axis::Accuracy, t))),
            ];

            let mut forward = base();
            for (id, outcome) in outcomes.clone() {
                forward.record(id, outcome);
            }
            let mut other = base();
            let ordered: Vec<_> = if reverse { outcomes.into_iter().rev().collect() } else { outcomes };
            for (id, outcome) in ordered {
                other.record(id, outcome);
            }

            let a = Aggregator::new().aggregate(forward);
            let b = Aggregator::new().aggregate(other);
            prop_assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
            prop_assert!(a.is_complete());
        }
    }
}
