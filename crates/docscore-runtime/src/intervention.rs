//! Intervention engine: drives the accuracy correction state machine.
//!
//! The [`InterventionMachine`] decides every transition; this module only
//! performs the external calls it asks for (correction request, then
//! re-evaluation) and reports the results back. The whole loop runs under a
//! latency budget; when it elapses the machine is expired and the original
//! content stands.

use std::sync::Arc;
use std::time::Duration;

use docscore_core::{BlockOutcome, CorrectionOutcome, InterventionMachine, InterventionPolicy, Score};

use crate::evaluators::{AccuracyEvaluator, AccuracyInput, Evaluator};

pub struct InterventionEngine {
    evaluator: Arc<AccuracyEvaluator>,
    policy: InterventionPolicy,
    latency_budget: Duration,
}

impl InterventionEngine {
    pub fn new(evaluator: Arc<AccuracyEvaluator>, policy: InterventionPolicy, latency_budget: Duration) -> Self {
        Self {
            evaluator,
            policy,
            latency_budget,
        }
    }

    pub fn policy(&self) -> &InterventionPolicy {
        &self.policy
    }

    /// Final outcome for a block given its first accuracy score.
    pub async fn resolve(&self, input: &AccuracyInput, score: Score) -> BlockOutcome {
        let Some(mut machine) = InterventionMachine::detect(self.policy, &input.block, &score, &input.citations)
        else {
            return BlockOutcome::scored(input.block.clone(), score);
        };

        tracing::debug!(
            kind = %input.block.kind(),
            score = machine.original_score(),
            state = ?machine.state(),
            "accuracy intervention detected"
        );

        if !machine.is_terminal()
            && tokio::time::timeout(self.latency_budget, self.drive(&mut machine, input))
                .await
                .is_err()
        {
            tracing::warn!(budget = ?self.latency_budget, "intervention latency budget elapsed");
            machine.expire();
        }

        let resolution = machine.finish();
        tracing::info!(
            kind = %input.block.kind(),
            outcome = ?resolution.audit.outcome,
            attempts = resolution.audit.attempts,
            "accuracy intervention finished"
        );
        BlockOutcome::resolved(input.block.clone(), score, resolution)
    }

    async fn drive(&self, machine: &mut InterventionMachine, input: &AccuracyInput) {
        while let Some(attempt) = machine.request() {
            let previous = machine.history().last().cloned();
            let proposal = self
                .evaluator
                .request_correction(input, machine.original_score(), previous.as_ref())
                .await;

            let proposed = match proposal {
                Ok(proposed) => proposed,
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "correction request failed");
                    machine.record_failure(None, format!("correction request failed: {}", e));
                    continue;
                }
            };

            let rescore = self.evaluator.evaluate(&input.with_block(proposed.clone())).await;
            let outcome = machine.record_rescore(proposed, rescore);
            tracing::debug!(attempt, outcome = ?outcome, state = ?machine.state(), "correction re-evaluated");

            if outcome == CorrectionOutcome::Accepted {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScoringClient;
    use crate::config::RuntimeConfig;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, FixtureProvider, LlmProvider, ProviderError, TokenUsage,
    };
    use docscore_core::{
        feedback, Axis, Block, Citation, CitationSet, CorrectionOutcome, ExhaustionReason, InterventionState,
        Provenance,
    };
    use serde_json::json;

    fn engine(provider: FixtureProvider, budget: Duration) -> InterventionEngine {
        let mut config = RuntimeConfig::default();
        config.retry.max_retries = 0;
        let client = Arc::new(ScoringClient::new(Arc::new(provider), &config));
        let evaluator = Arc::new(AccuracyEvaluator::new(client, Duration::from_secs(5), Duration::from_secs(5)));
        InterventionEngine::new(evaluator, InterventionPolicy::default(), budget)
    }

    fn table_input(citations: CitationSet) -> AccuracyInput {
        AccuracyInput {
            query: "Compare string theories".into(),
            block: Block::Table {
                rows: vec![
                    vec!["Theory".into(), "Dimensions".into()],
                    vec!["Superstring".into(), "12".into()],
                ],
            },
            citations,
        }
    }

    fn evidence() -> CitationSet {
        CitationSet::Available {
            citations: vec![Citation::new("1", "Superstring theory needs ten dimensions.", Provenance::DocumentTable)],
        }
    }

    fn score(value: f64, citations: &CitationSet) -> Score {
        Score::scored(Axis::Accuracy, value, 0.8, feedback::accuracy(docscore_core::BlockKind::Table, value, citations))
    }

    #[tokio::test]
    async fn test_good_score_needs_no_intervention() {
        let engine = engine(FixtureProvider::new(), Duration::from_secs(30));
        let input = table_input(evidence());
        let outcome = engine.resolve(&input, score(0.9, &input.citations)).await;
        assert!(outcome.correction.is_none());
        assert_eq!(outcome.content, input.block);
    }

    #[tokio::test]
    async fn test_accepted_correction_replaces_content() {
        let provider = FixtureProvider::new()
            .with_rule(
                "Correct the following table",
                json!({"rows": [["Theory", "Dimensions"], ["Superstring", "10"]]}),
            )
            .with_rule("\"10\"", json!({"score": 0.85}));
        let engine = engine(provider, Duration::from_secs(30));
        let input = table_input(evidence());

        let outcome = engine.resolve(&input, score(0.35, &input.citations)).await;
        let audit = outcome.correction.unwrap();
        assert_eq!(audit.outcome, CorrectionOutcome::Accepted);
        assert_eq!(audit.attempts, 1);
        assert_eq!(outcome.score.value(), Some(0.85));
        assert_eq!(
            outcome.content,
            Block::Table {
                rows: vec![
                    vec!["Theory".into(), "Dimensions".into()],
                    vec!["Superstring".into(), "10".into()],
                ],
            }
        );
    }

    #[tokio::test]
    async fn test_non_improving_correction_exhausts() {
        let provider = FixtureProvider::new()
            .with_rule(
                "Correct the following table",
                json!({"rows": [["Theory", "Dimensions"], ["Superstring", "11"]]}),
            )
            .with_default(json!({"score": 0.35}));
        let engine = engine(provider, Duration::from_secs(30));
        let input = table_input(evidence());

        let outcome = engine.resolve(&input, score(0.35, &input.citations)).await;
        let audit = outcome.correction.unwrap();
        assert_eq!(audit.outcome, CorrectionOutcome::Exhausted);
        assert_eq!(audit.attempts, InterventionPolicy::default().max_attempts);
        assert_eq!(audit.history.len(), 2);
        assert_eq!(outcome.content, input.block);
        assert_eq!(outcome.score.value(), Some(0.35));
    }

    #[tokio::test]
    async fn test_no_evidence_skips_correction() {
        let engine = engine(FixtureProvider::new(), Duration::from_secs(30));
        let input = table_input(CitationSet::unavailable("not exposed"));

        let outcome = engine.resolve(&input, score(0.2, &input.citations)).await;
        let audit = outcome.correction.unwrap();
        assert_eq!(audit.outcome, CorrectionOutcome::Exhausted);
        assert_eq!(audit.attempts, 0);
        assert_eq!(audit.reason.as_deref(), Some(ExhaustionReason::NoEvidence.to_string().as_str()));
    }

    #[tokio::test]
    async fn test_failed_requests_consume_attempts() {
        // no rule matches the correction prompt
        let engine = engine(FixtureProvider::new(), Duration::from_secs(30));
        let input = table_input(evidence());

        let outcome = engine.resolve(&input, score(0.3, &input.citations)).await;
        let audit = outcome.correction.unwrap();
        assert_eq!(audit.outcome, CorrectionOutcome::Exhausted);
        assert_eq!(audit.attempts, 2);
        assert!(audit.history.iter().all(|c| c.proposed.is_none()));
    }

    struct SlowProvider;

    #[async_trait::async_trait]
    impl LlmProvider for SlowProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Ok(CompletionResponse {
                content: "0.9".to_string(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_budget_expires() {
        let client = Arc::new(ScoringClient::new(Arc::new(SlowProvider), &RuntimeConfig::default()));
        let evaluator = Arc::new(AccuracyEvaluator::new(client, Duration::from_secs(5), Duration::from_secs(5)));
        let engine = InterventionEngine::new(evaluator, InterventionPolicy::default(), Duration::from_secs(1));
        let input = table_input(evidence());

        let outcome = engine.resolve(&input, score(0.3, &input.citations)).await;
        let audit = outcome.correction.unwrap();
        assert_eq!(audit.outcome, CorrectionOutcome::Exhausted);
        assert_eq!(
            audit.reason.as_deref(),
            Some(ExhaustionReason::LatencyBudget.to_string().as_str())
        );
        assert_eq!(outcome.content, input.block);
    }

    /// Proposes corrections at once but never finishes a re-evaluation.
    struct StalledRescoreProvider;

    #[async_trait::async_trait]
    impl LlmProvider for StalledRescoreProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            let asks_for_correction = messages.iter().any(|m| m.content.contains("Correct the following table"));
            if !asks_for_correction {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(CompletionResponse {
                content: json!({"rows": [["Theory", "Dimensions"], ["Superstring", "10"]]}).to_string(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "stalled-rescore"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_rescore_rejects_each_attempt() {
        let mut config = RuntimeConfig::default();
        config.retry.max_retries = 0;
        let client = Arc::new(ScoringClient::new(Arc::new(StalledRescoreProvider), &config));
        let evaluator = Arc::new(AccuracyEvaluator::new(client, Duration::from_secs(5), Duration::from_secs(5)));
        let engine = InterventionEngine::new(evaluator, InterventionPolicy::default(), Duration::from_secs(60));
        let input = table_input(evidence());

        let outcome = engine.resolve(&input, score(0.3, &input.citations)).await;
        let audit = outcome.correction.unwrap();
        assert_eq!(audit.outcome, CorrectionOutcome::Exhausted);
        assert_eq!(audit.attempts, 2);
        assert_eq!(audit.reason.as_deref(), Some(ExhaustionReason::MaxAttempts.to_string().as_str()));
        assert_eq!(audit.history.len(), 2);
        for correction in &audit.history {
            assert_eq!(correction.outcome, CorrectionOutcome::Rejected);
            assert!(correction.proposed.is_some());
            assert!(correction.reevaluation.is_none());
        }
        assert_eq!(outcome.content, input.block);
        assert_eq!(outcome.score.value(), Some(0.3));
    }

    #[test]
    fn test_expired_state_is_terminal() {
        let state = InterventionState::Exhausted {
            attempts: 0,
            reason: ExhaustionReason::LatencyBudget,
        };
        assert!(state.is_terminal());
    }
}
