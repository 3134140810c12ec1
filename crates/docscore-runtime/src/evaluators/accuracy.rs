//! Accuracy of one metric or table block against its citations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use docscore_core::{feedback, Axis, Block, CitationSet, Correction, EvaluatorKind, Score};

use super::{Evaluator, DEFAULT_JUDGMENT_CONFIDENCE};
use crate::client::{EvaluationUnavailable, ScoringClient};
use crate::{judgment, prompts};

/// Confidence ceiling when no citation evidence backs the block.
pub const NO_EVIDENCE_CONFIDENCE_CEILING: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyInput {
    pub query: String,
    pub block: Block,
    pub citations: CitationSet,
}

impl AccuracyInput {
    /// Same query and evidence, different content.
    pub fn with_block(&self, block: Block) -> Self {
        Self {
            query: self.query.clone(),
            block,
            citations: self.citations.clone(),
        }
    }
}

pub struct AccuracyEvaluator {
    client: Arc<ScoringClient>,
    timeout: Duration,
    correction_timeout: Duration,
}

impl AccuracyEvaluator {
    pub fn new(client: Arc<ScoringClient>, timeout: Duration, correction_timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            correction_timeout,
        }
    }

    /// Ask for replacement content. The proposal is validated as a block of
    /// the same kind before it is returned.
    pub async fn request_correction(
        &self,
        input: &AccuracyInput,
        original_score: f64,
        previous: Option<&Correction>,
    ) -> Result<Block, EvaluationUnavailable> {
        let kind = input.block.kind();
        let messages =
            prompts::correction_messages(&input.query, &input.block, &input.citations, original_score, previous);
        self.client
            .judge(EvaluatorKind::Accuracy, messages, self.correction_timeout, |text| {
                judgment::parse_correction(text, kind)
            })
            .await
    }

    fn evidence_statistics(score: Score, citations: &CitationSet) -> Score {
        let score = score
            .with_statistic("citations_unavailable", !citations.is_available())
            .with_statistic("citation_count", citations.citations().len());

        if citations.has_evidence() {
            score
        } else {
            score
                .with_statistic("evidence_missing", true)
                .with_confidence_ceiling(NO_EVIDENCE_CONFIDENCE_CEILING)
        }
    }
}

#[async_trait]
impl Evaluator for AccuracyEvaluator {
    type Input = AccuracyInput;
    type Output = Score;

    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Accuracy
    }

    async fn evaluate(&self, input: &AccuracyInput) -> Score {
        let kind = input.block.kind();
        if !kind.is_accuracy_eligible() {
            return Score::unavailable(Axis::Accuracy, format!("{} blocks are not scored for accuracy", kind));
        }

        let messages = prompts::accuracy_messages(&input.query, &input.block, &input.citations);
        let score = match self
            .client
            .judge(self.kind(), messages, self.timeout, judgment::parse_score)
            .await
        {
            Ok(j) => {
                let confidence = j.confidence.unwrap_or(DEFAULT_JUDGMENT_CONFIDENCE);
                let score = Score::scored(
                    Axis::Accuracy,
                    j.score,
                    confidence,
                    feedback::accuracy(kind, j.score, &input.citations),
                )
                .with_statistic("block_type", kind.as_str());
                match j.rationale {
                    Some(rationale) => score.with_statistic("rationale", rationale),
                    None => score,
                }
            }
            Err(e) => Score::unavailable(Axis::Accuracy, e.to_string()).with_statistic("timed_out", e.is_timeout()),
        };

        Self::evidence_statistics(score, &input.citations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::providers::FixtureProvider;
    use docscore_core::{BlockKind, Citation, Provenance};
    use serde_json::json;

    fn evaluator(provider: FixtureProvider) -> AccuracyEvaluator {
        let mut config = RuntimeConfig::default();
        config.retry.max_retries = 0;
        let client = Arc::new(ScoringClient::new(Arc::new(provider), &config));
        AccuracyEvaluator::new(client, Duration::from_secs(5), Duration::from_secs(5))
    }

    fn metric_input(citations: CitationSet) -> AccuracyInput {
        AccuracyInput {
            query: "How many dimensions does string theory need?".into(),
            block: Block::Metric {
                number: "10 or 11 dimensions".into(),
                description: "Dimensions required by string theory".into(),
            },
            citations,
        }
    }

    fn evidence() -> CitationSet {
        CitationSet::Available {
            citations: vec![Citation::new("1", "Superstring theory needs ten dimensions.", Provenance::DocumentTable)],
        }
    }

    #[tokio::test]
    async fn test_missing_citations_cap_confidence() {
        let provider = FixtureProvider::new().with_default(json!({"score": 0.7, "confidence": 0.95}));
        let eval = evaluator(provider);

        let without = eval.evaluate(&metric_input(CitationSet::unavailable("not exposed"))).await;
        assert_eq!(without.value(), Some(0.7));
        assert_eq!(without.confidence, NO_EVIDENCE_CONFIDENCE_CEILING);
        assert_eq!(without.statistics["citations_unavailable"], json!(true));
        assert!(without.areas_for_improvement.iter().any(|a| a == "Missing citations"));

        let with = eval.evaluate(&metric_input(evidence())).await;
        assert_eq!(with.confidence, 0.95);
        assert!(without.confidence < with.confidence);
        assert_eq!(with.statistics["citations_unavailable"], json!(false));
    }

    #[tokio::test]
    async fn test_empty_citations_distinct_from_unavailable() {
        let provider = FixtureProvider::new().with_default("0.6");
        let score = evaluator(provider).evaluate(&metric_input(CitationSet::empty())).await;

        assert_eq!(score.statistics["citations_unavailable"], json!(false));
        assert_eq!(score.statistics["evidence_missing"], json!(true));
        assert!(score.confidence <= NO_EVIDENCE_CONFIDENCE_CEILING);
    }

    #[tokio::test]
    async fn test_malformed_judgment_is_unavailable() {
        let provider = FixtureProvider::new().with_default("It looks mostly right to me.");
        let score = evaluator(provider).evaluate(&metric_input(evidence())).await;

        assert!(score.is_unavailable());
        assert_eq!(score.confidence, 0.0);
        assert_eq!(score.statistics["timed_out"], json!(false));
    }

    #[tokio::test]
    async fn test_correction_is_validated() {
        let provider = FixtureProvider::new()
            .with_rule("Correct the following metric", json!({"number": "10 dimensions", "description": "Superstring theory"}))
            .with_default("0.9");
        let eval = evaluator(provider);

        let proposed = eval.request_correction(&metric_input(evidence()), 0.3, None).await.unwrap();
        assert_eq!(proposed.kind(), BlockKind::Metric);

        let bad = FixtureProvider::new().with_rule("Correct the following metric", json!({"description": "no number"}));
        let result = evaluator(bad).request_correction(&metric_input(evidence()), 0.3, None).await;
        assert!(matches!(result, Err(EvaluationUnavailable::Judgment(_))));
    }
}
