//! Relevance and coherence from a single judgment over the whole document.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use docscore_core::{feedback, Axis, Document, EvaluatorKind, Score};

use super::{Evaluator, DEFAULT_JUDGMENT_CONFIDENCE};
use crate::client::ScoringClient;
use crate::{judgment, prompts};

/// Two independent scores produced by one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceCoherence {
    pub relevance: Score,
    pub coherence: Score,
}

impl RelevanceCoherence {
    fn unavailable(reason: &str) -> Self {
        Self {
            relevance: Score::unavailable(Axis::Relevance, reason),
            coherence: Score::unavailable(Axis::Coherence, reason),
        }
    }
}

pub struct RelevanceCoherenceEvaluator {
    client: Arc<ScoringClient>,
    timeout: Duration,
}

impl RelevanceCoherenceEvaluator {
    pub fn new(client: Arc<ScoringClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Evaluator for RelevanceCoherenceEvaluator {
    type Input = Document;
    type Output = RelevanceCoherence;

    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::RelevanceCoherence
    }

    async fn evaluate(&self, document: &Document) -> RelevanceCoherence {
        if document.blocks.is_empty() {
            return RelevanceCoherence::unavailable("document has no valid blocks to score");
        }

        let messages = prompts::relevance_coherence_messages(&document.query, &document.rendered());
        match self
            .client
            .judge(self.kind(), messages, self.timeout, judgment::parse_relevance_coherence)
            .await
        {
            Ok(j) => {
                let confidence = j.confidence.unwrap_or(DEFAULT_JUDGMENT_CONFIDENCE);
                RelevanceCoherence {
                    relevance: Score::scored(Axis::Relevance, j.relevance, confidence, feedback::relevance(j.relevance)),
                    coherence: Score::scored(Axis::Coherence, j.coherence, confidence, feedback::coherence(j.coherence))
                        .with_statistic("blocks_considered", document.blocks.len()),
                }
            }
            Err(e) => RelevanceCoherence::unavailable(&e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::providers::FixtureProvider;
    use docscore_core::Severity;
    use serde_json::json;

    fn evaluator(provider: FixtureProvider) -> RelevanceCoherenceEvaluator {
        let mut config = RuntimeConfig::default();
        config.retry.max_retries = 0;
        let client = Arc::new(ScoringClient::new(Arc::new(provider), &config));
        RelevanceCoherenceEvaluator::new(client, Duration::from_secs(5))
    }

    fn document() -> Document {
        Document::ingest(&json!({
            "query": "Explain string theory",
            "blocks": [
                {"type": "header", "text": "String theory"},
                {"type": "paragraph", "text": "Strings vibrate in many dimensions."}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_two_scores_from_one_judgment() {
        let provider = FixtureProvider::new().with_default(json!({"relevance": 0.9, "coherence": 0.6, "confidence": 0.7}));
        let scores = evaluator(provider).evaluate(&document()).await;

        assert_eq!(scores.relevance.value(), Some(0.9));
        assert_eq!(scores.relevance.severity, Severity::Low);
        assert_eq!(scores.coherence.value(), Some(0.6));
        assert_eq!(scores.coherence.severity, Severity::Medium);
        assert_eq!(scores.coherence.confidence, 0.7);
        assert!(!scores.coherence.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_free_text_judgment_is_unavailable() {
        let provider = FixtureProvider::new().with_default("The response is pretty relevant.");
        let scores = evaluator(provider).evaluate(&document()).await;

        assert!(scores.relevance.is_unavailable());
        assert!(scores.coherence.is_unavailable());
        assert_eq!(scores.relevance.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_empty_document_is_unavailable() {
        let provider = FixtureProvider::new().with_default(json!({"relevance": 1.0, "coherence": 1.0}));
        let empty = Document::ingest(&json!({"query": "q", "blocks": []})).unwrap();
        let scores = evaluator(provider).evaluate(&empty).await;
        assert!(scores.relevance.is_unavailable());
    }
}
