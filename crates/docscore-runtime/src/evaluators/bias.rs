//! Gender bias over the document's prose.
//!
//! The rule-based analysis always runs: it supplies the reference statistics
//! and decides the trivial case. A text with no gendered language at all
//! scores 0.0 without a service call. Otherwise the configured strategy
//! decides whether the holistic judgment, the heuristics, or both are used.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use docscore_core::{feedback, Axis, BiasAnalysis, Document, EvaluatorKind, Score};

use super::{Evaluator, DEFAULT_JUDGMENT_CONFIDENCE, FALLBACK_CONFIDENCE_FACTOR};
use crate::client::ScoringClient;
use crate::config::{BiasConfig, BiasStrategy};
use crate::judgment::BiasJudgment;
use crate::{judgment, prompts};

/// Confidence of a score from the heuristics alone.
const RULE_BASED_CONFIDENCE: f64 = 0.6;

pub struct BiasEvaluator {
    client: Arc<ScoringClient>,
    config: BiasConfig,
    timeout: Duration,
}

impl BiasEvaluator {
    pub fn new(client: Arc<ScoringClient>, config: BiasConfig, timeout: Duration) -> Self {
        Self { client, config, timeout }
    }

    fn rule_based(&self, analysis: &BiasAnalysis) -> Score {
        let value = analysis.score();
        with_statistics(
            Score::scored(Axis::Bias, value, RULE_BASED_CONFIDENCE, feedback::bias(value, Some(analysis))),
            analysis.statistics(),
        )
        .with_statistic("strategy", "rule_based")
    }

    fn holistic(&self, analysis: &BiasAnalysis, judgment: BiasJudgment) -> Score {
        let value = judgment.bias_score;
        let feedback = feedback::bias(value, Some(analysis)).merge(judgment.feedback);
        let mut stats = analysis.statistics();

        if let Some(n) = judgment.male_references {
            stats.insert("male_references".into(), Value::from(n));
        }
        if let Some(n) = judgment.female_references {
            stats.insert("female_references".into(), Value::from(n));
        }
        if let (Some(male), Some(female)) = (judgment.male_associations, judgment.female_associations) {
            stats.insert(
                "professional_associations".into(),
                serde_json::json!({"male": male, "female": female}),
            );
        }
        if let Some(findings) = judgment.findings {
            stats.insert("key_findings".into(), serde_json::json!(findings.key_findings));
            stats.insert("notable_examples".into(), serde_json::json!(findings.notable_examples));
            stats.insert("bias_patterns".into(), serde_json::json!(findings.bias_patterns));
        }

        let confidence = judgment.confidence.unwrap_or(DEFAULT_JUDGMENT_CONFIDENCE);
        with_statistics(Score::scored(Axis::Bias, value, confidence, feedback), stats)
            .with_statistic("strategy", "holistic")
            .with_statistic("rule_based_score", analysis.score())
    }
}

fn with_statistics(mut score: Score, stats: std::collections::BTreeMap<String, Value>) -> Score {
    score.statistics.extend(stats);
    score
}

#[async_trait]
impl Evaluator for BiasEvaluator {
    type Input = Document;
    type Output = Score;

    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Bias
    }

    async fn evaluate(&self, document: &Document) -> Score {
        let text = document.prose(self.config.include_headers);
        let analysis = BiasAnalysis::analyze(&text);

        if analysis.total_references() == 0 && analysis.gendered_generic_terms == 0 {
            tracing::debug!("no gendered language, bias scored without a judgment");
            return self.rule_based(&analysis);
        }

        if self.config.strategy == BiasStrategy::RuleBased {
            return self.rule_based(&analysis);
        }

        let messages = prompts::bias_messages(&document.query, &text);
        match self
            .client
            .judge(self.kind(), messages, self.timeout, judgment::parse_bias)
            .await
        {
            Ok(judgment) => self.holistic(&analysis, judgment),
            Err(e) if self.config.strategy == BiasStrategy::Hybrid => {
                tracing::warn!(error = %e, "holistic bias judgment unavailable, using rule-based analysis");
                self.rule_based(&analysis)
                    .discounted(FALLBACK_CONFIDENCE_FACTOR)
                    .with_statistic("fallback_reason", e.to_string())
            }
            Err(e) => Score::unavailable(Axis::Bias, e.to_string()),
        }
    }
}
