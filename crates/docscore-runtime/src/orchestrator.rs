//! Orchestrator: fans a document out to every evaluator and folds the
//! results into a [`Report`].
//!
//! - Bias, relevance/coherence and per-block accuracy run concurrently
//! - Each accuracy-eligible block resolves its citations, is scored, then
//!   handed to the intervention engine
//! - Aggregation stays deterministic and never calls out
//! - Batches evaluate documents concurrently; one aborted document never
//!   affects another

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::Value;

use docscore_core::{Aggregator, BlockId, BlockOutcome, Document, DocumentBlock, PipelineAbort, Report, ScoreSet};

use crate::citations::{self, CitationSource, NoCitationSource};
use crate::client::ScoringClient;
use crate::config::RuntimeConfig;
use crate::evaluators::{
    AccuracyEvaluator, AccuracyInput, BiasEvaluator, Evaluator, RelevanceCoherenceEvaluator,
};
use crate::intervention::InterventionEngine;
use crate::providers::{LlmProvider, ProviderRegistry};
use crate::resilience::ServiceUsage;
use crate::RuntimeError;

/// One evaluated document: the deterministic report plus run metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRun {
    pub report: Report,
    pub evaluated_at: DateTime<Utc>,
    /// Cumulative service usage of this orchestrator at the end of the run.
    pub usage: ServiceUsage,
    pub provider: String,
}

pub struct Orchestrator {
    client: Arc<ScoringClient>,
    config: RuntimeConfig,
    bias: BiasEvaluator,
    accuracy: Arc<AccuracyEvaluator>,
    relevance: RelevanceCoherenceEvaluator,
    intervention: InterventionEngine,
    citation_source: Arc<dyn CitationSource>,
    aggregator: Aggregator,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: RuntimeConfig) -> Self {
        Self::with_citation_source(provider, config, Arc::new(NoCitationSource))
    }

    pub fn with_citation_source(
        provider: Arc<dyn LlmProvider>,
        config: RuntimeConfig,
        citation_source: Arc<dyn CitationSource>,
    ) -> Self {
        use docscore_core::EvaluatorKind;

        let client = Arc::new(ScoringClient::new(provider, &config));
        let accuracy = Arc::new(AccuracyEvaluator::new(
            client.clone(),
            config.timeout_for(EvaluatorKind::Accuracy),
            config.correction_timeout(),
        ));

        Self {
            bias: BiasEvaluator::new(client.clone(), config.bias.clone(), config.timeout_for(EvaluatorKind::Bias)),
            relevance: RelevanceCoherenceEvaluator::new(
                client.clone(),
                config.timeout_for(EvaluatorKind::RelevanceCoherence),
            ),
            intervention: InterventionEngine::new(
                accuracy.clone(),
                config.intervention.policy(),
                config.intervention.latency_budget,
            ),
            accuracy,
            client,
            config,
            citation_source,
            aggregator: Aggregator::new(),
        }
    }

    /// Ingest a raw document and evaluate it.
    pub async fn evaluate_document(&self, value: &Value) -> Result<EvaluationRun, PipelineAbort> {
        match Document::ingest(value) {
            Ok(document) => Ok(self.evaluate(&document).await),
            Err(e) => {
                tracing::warn!(error = %e, "document aborted before evaluation");
                Err(e)
            }
        }
    }

    /// Evaluate an already ingested document.
    pub async fn evaluate(&self, document: &Document) -> EvaluationRun {
        for rejected in &document.rejected {
            tracing::info!(block = %rejected.id, error = %rejected.error, "block rejected by validation");
        }

        let blocks = futures::future::join_all(document.accuracy_eligible().map(|b| self.evaluate_block(document, b)));

        let (bias, rc, outcomes) = tokio::join!(self.bias.evaluate(document), self.relevance.evaluate(document), blocks);

        let mut scores = ScoreSet::new(document, rc.relevance, rc.coherence, bias);
        for (id, outcome) in outcomes {
            scores.record(id, outcome);
        }
        let report = self.aggregator.aggregate(scores);

        tracing::info!(
            blocks = report.blocks.len(),
            severity = ?report.summary.overall,
            corrected = report.summary.corrected_blocks,
            unresolved = report.summary.unresolved_accuracy_concerns,
            "document evaluated"
        );

        EvaluationRun {
            report,
            evaluated_at: Utc::now(),
            usage: self.client.usage(),
            provider: self.client.provider_name().to_string(),
        }
    }

    /// Evaluate several documents, at most `concurrency.max_documents` at a
    /// time. Results keep input order.
    pub async fn evaluate_batch(&self, documents: Vec<Value>) -> Vec<Result<EvaluationRun, PipelineAbort>> {
        let limit = self.config.concurrency.max_documents.max(1);

        let mut results: Vec<(usize, Result<EvaluationRun, PipelineAbort>)> = stream::iter(documents.into_iter().enumerate())
            .map(|(index, value)| async move { (index, self.evaluate_document(&value).await) })
            .buffer_unordered(limit)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    async fn evaluate_block(&self, document: &Document, block: &DocumentBlock) -> (BlockId, BlockOutcome) {
        let citations = citations::resolve(self.citation_source.as_ref(), &block.id, &block.citations).await;
        let input = AccuracyInput {
            query: document.query.clone(),
            block: block.block.clone(),
            citations,
        };

        let score = self.accuracy.evaluate(&input).await;
        if score.is_unavailable() {
            tracing::warn!(block = %block.id, "accuracy judgment unavailable");
        }

        let outcome = if self.config.intervention.enabled {
            self.intervention.resolve(&input, score).await
        } else {
            BlockOutcome::scored(input.block, score)
        };
        (block.id.clone(), outcome)
    }

    pub fn usage(&self) -> ServiceUsage {
        self.client.usage()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

/// Builder for [`Orchestrator`].
#[derive(Default)]
pub struct OrchestratorBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    config: RuntimeConfig,
    citation_source: Option<Arc<dyn CitationSource>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this provider instead of creating one from `config.provider`.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn citation_source(mut self, source: Arc<dyn CitationSource>) -> Self {
        self.citation_source = Some(source);
        self
    }

    pub fn build(self) -> Result<Orchestrator, RuntimeError> {
        self.config.validate()?;

        let provider = match self.provider {
            Some(provider) => provider,
            None => ProviderRegistry::with_defaults()
                .create(&self.config.provider.name, &self.config.provider.settings)
                .map_err(|e| RuntimeError::ProviderNotConfigured(e.to_string()))?,
        };
        let source = self.citation_source.unwrap_or_else(|| Arc::new(NoCitationSource));

        tracing::debug!(provider = provider.name(), citations = source.name(), "orchestrator built");
        Ok(Orchestrator::with_citation_source(provider, self.config, source))
    }
}
