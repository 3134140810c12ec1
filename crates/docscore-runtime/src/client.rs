//! The single gateway to the scoring service.
//!
//! Every judgment request passes through [`ScoringClient::judge`], which
//! applies, in order:
//! 1. the evaluator's circuit breaker
//! 2. the judgment cache
//! 3. the token budget
//! 4. the process-wide in-flight ceiling (one shared semaphore)
//! 5. a per-call timeout
//! 6. bounded exponential backoff for transient failures
//!
//! Failures come back as [`EvaluationUnavailable`], which evaluators turn into
//! the unavailable sentinel score.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use thiserror::Error;
use tokio::sync::Semaphore;

use docscore_core::EvaluatorKind;

use crate::cache::{CacheKey, JudgmentCache};
use crate::config::{RetryConfig, RuntimeConfig};
use crate::judgment::JudgmentError;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::resilience::{BudgetTracker, CircuitBreaker, ServiceUsage};

/// Why a judgment could not be obtained.
#[derive(Error, Debug, Clone)]
pub enum EvaluationUnavailable {
    #[error("{0} circuit is open")]
    CircuitOpen(EvaluatorKind),

    #[error("{0} token budget exhausted")]
    BudgetExhausted(EvaluatorKind),

    #[error("scoring service timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring service error: {0}")]
    Provider(ProviderError),

    #[error("unusable judgment: {0}")]
    Judgment(JudgmentError),
}

impl EvaluationUnavailable {
    pub fn is_timeout(&self) -> bool {
        matches!(self, EvaluationUnavailable::Timeout(_))
    }
}

/// One failed attempt. Malformed judgments are retried like transport errors;
/// content rejections are final.
#[derive(Debug)]
enum AttemptError {
    Provider(ProviderError),
    Judgment(JudgmentError),
}

impl AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            AttemptError::Provider(e) => e.is_transient(),
            AttemptError::Judgment(e) => !e.is_content_rejection(),
        }
    }

    /// Whether the failure says anything about the health of the service.
    fn is_service_failure(&self) -> bool {
        match self {
            AttemptError::Provider(_) => true,
            AttemptError::Judgment(e) => !e.is_content_rejection(),
        }
    }
}

impl From<AttemptError> for EvaluationUnavailable {
    fn from(e: AttemptError) -> Self {
        match e {
            AttemptError::Provider(ProviderError::Timeout(after)) => EvaluationUnavailable::Timeout(after),
            AttemptError::Provider(e) => EvaluationUnavailable::Provider(e),
            AttemptError::Judgment(e) => EvaluationUnavailable::Judgment(e),
        }
    }
}

pub struct ScoringClient {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    permits: Arc<Semaphore>,
    breaker: CircuitBreaker,
    budget: BudgetTracker,
    cache: Option<JudgmentCache>,
    retry: RetryConfig,
}

impl ScoringClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        let budget = BudgetTracker::new(
            config.budgets.global_max_tokens,
            config.budgets.per_evaluator.iter().map(|(k, v)| (*k, *v)).collect(),
        );
        let cache = config
            .cache
            .enabled
            .then(|| JudgmentCache::new(config.cache.max_entries, config.cache.ttl));

        Self {
            provider,
            completion: config.completion.clone(),
            permits: Arc::new(Semaphore::new(config.concurrency.max_in_flight)),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            budget,
            cache,
            retry: config.retry.clone(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn usage(&self) -> ServiceUsage {
        self.budget.usage()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Request a judgment and parse it with `parse`.
    pub async fn judge<T, F>(
        &self,
        evaluator: EvaluatorKind,
        messages: Vec<ChatMessage>,
        timeout: Duration,
        parse: F,
    ) -> Result<T, EvaluationUnavailable>
    where
        F: Fn(&str) -> Result<T, JudgmentError>,
    {
        if self.breaker.is_open(evaluator) {
            tracing::warn!(evaluator = %evaluator, "circuit open, skipping scoring service");
            return Err(EvaluationUnavailable::CircuitOpen(evaluator));
        }

        let key = CacheKey::new(&self.completion.model, &messages);
        if let Some(cache) = &self.cache {
            if let Some(raw) = cache.get(&key).await {
                if let Ok(parsed) = parse(&raw) {
                    tracing::debug!(evaluator = %evaluator, "judgment served from cache");
                    self.budget.record_cache_hit();
                    return Ok(parsed);
                }
            }
        }

        let estimated = messages
            .iter()
            .map(|m| self.provider.estimate_tokens(&m.content))
            .sum::<u32>()
            + self.completion.max_tokens;
        if !self.budget.can_afford(evaluator, estimated) {
            tracing::warn!(evaluator = %evaluator, estimated, "token budget exhausted");
            return Err(EvaluationUnavailable::BudgetExhausted(evaluator));
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.min_delay)
            .with_max_delay(self.retry.max_delay)
            .with_max_times(self.retry.max_retries);

        let result = (|| self.attempt(evaluator, &messages, timeout, &parse))
            .retry(backoff)
            .when(AttemptError::is_transient)
            .notify(|e, delay| {
                tracing::debug!(evaluator = %evaluator, error = ?e, delay = ?delay, "retrying scoring request");
            })
            .await;

        match result {
            Ok((parsed, raw)) => {
                self.breaker.record_success(evaluator);
                if let Some(cache) = &self.cache {
                    cache.insert(key, raw).await;
                }
                Ok(parsed)
            }
            Err(e) => {
                if e.is_service_failure() {
                    self.breaker.record_failure(evaluator);
                } else {
                    self.breaker.record_success(evaluator);
                }
                let unavailable = EvaluationUnavailable::from(e);
                tracing::warn!(evaluator = %evaluator, error = %unavailable, "judgment unavailable");
                Err(unavailable)
            }
        }
    }

    async fn attempt<T, F>(
        &self,
        evaluator: EvaluatorKind,
        messages: &[ChatMessage],
        timeout: Duration,
        parse: &F,
    ) -> Result<(T, String), AttemptError>
    where
        F: Fn(&str) -> Result<T, JudgmentError>,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AttemptError::Provider(ProviderError::NotConfigured("scoring client closed".into())))?;

        let response = match tokio::time::timeout(timeout, self.provider.complete(messages.to_vec(), &self.completion)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(AttemptError::Provider(e)),
            Err(_) => {
                tracing::warn!(evaluator = %evaluator, timeout = ?timeout, "scoring request timed out");
                return Err(AttemptError::Provider(ProviderError::Timeout(timeout)));
            }
        };

        self.budget.record_usage(evaluator, &response.usage, &response.model);

        let parsed = parse(&response.content).map_err(|e| {
            tracing::debug!(evaluator = %evaluator, error = %e, "judgment failed to parse");
            AttemptError::Judgment(e)
        })?;
        Ok((parsed, response.content))
    }
}
