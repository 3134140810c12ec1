//! Runtime configuration.
//!
//! Loaded from YAML or JSON. Every section has defaults, so an empty file is a
//! valid configuration. Durations are human-readable (`"15s"`, `"250ms"`).
//!
//! ```yaml
//! completion:
//!   model: gpt-4o
//! concurrency:
//!   max_in_flight: 8
//! timeouts:
//!   default: 15s
//!   accuracy: 20s
//! intervention:
//!   max_attempts: 2
//!   latency_budget: 60s
//! bias:
//!   strategy: hybrid
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use docscore_core::{EvaluatorKind, InterventionPolicy};

use crate::providers::CompletionConfig;
use crate::resilience::CircuitBreakerConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub provider: ProviderConfig,
    pub completion: CompletionConfig,
    pub concurrency: ConcurrencyConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub intervention: InterventionConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub budgets: BudgetConfig,
    pub cache: CacheConfig,
    pub bias: BiasConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            completion: CompletionConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            intervention: InterventionConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            budgets: BudgetConfig::default(),
            cache: CacheConfig::default(),
            bias: BiasConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load by extension: `.json` is JSON, anything else YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency.max_in_flight == 0 {
            return Err(ConfigError::Invalid("concurrency.max_in_flight must be at least 1".into()));
        }
        if self.concurrency.max_documents == 0 {
            return Err(ConfigError::Invalid("concurrency.max_documents must be at least 1".into()));
        }
        if self.timeouts.all().any(|t| t.is_zero()) {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }
        if self.retry.min_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid("retry.min_delay exceeds retry.max_delay".into()));
        }
        if self.intervention.max_attempts == 0 {
            return Err(ConfigError::Invalid("intervention.max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.intervention.min_improvement) {
            return Err(ConfigError::Invalid("intervention.min_improvement must be within [0, 1]".into()));
        }
        if self.retry.worst_case_delay() >= self.intervention.latency_budget {
            return Err(ConfigError::Invalid(format!(
                "retry backoff ({:?} worst case) must stay below intervention.latency_budget ({:?})",
                self.retry.worst_case_delay(),
                self.intervention.latency_budget
            )));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be at least 1 when enabled".into()));
        }
        Ok(())
    }

    /// Per-call timeout for `evaluator`.
    pub fn timeout_for(&self, evaluator: EvaluatorKind) -> Duration {
        let specific = match evaluator {
            EvaluatorKind::Bias => self.timeouts.bias,
            EvaluatorKind::Accuracy => self.timeouts.accuracy,
            EvaluatorKind::RelevanceCoherence => self.timeouts.relevance_coherence,
        };
        specific.unwrap_or(self.timeouts.default)
    }

    pub fn correction_timeout(&self) -> Duration {
        self.timeouts.correction.unwrap_or(self.timeouts.default)
    }
}

/// Which scoring-service backend to build from the provider registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: String,
    /// Passed verbatim to the provider factory.
    pub settings: serde_json::Value,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            settings: serde_json::Value::Object(Default::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Scoring-service calls in flight across the whole process.
    pub max_in_flight: usize,
    /// Documents evaluated at once in a batch.
    pub max_documents: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            max_documents: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub bias: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub relevance_coherence: Option<Duration>,
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub correction: Option<Duration>,
}

impl TimeoutConfig {
    fn all(&self) -> impl Iterator<Item = Duration> + '_ {
        std::iter::once(self.default).chain(
            [self.bias, self.accuracy, self.relevance_coherence, self.correction]
                .into_iter()
                .flatten(),
        )
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(15),
            bias: None,
            accuracy: None,
            relevance_coherence: None,
            correction: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero disables retrying.
    pub max_retries: usize,
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl RetryConfig {
    /// Upper bound on total backoff sleep for one call.
    pub fn worst_case_delay(&self) -> Duration {
        let mut total = Duration::ZERO;
        let mut delay = self.min_delay;
        for _ in 0..self.max_retries {
            total += delay.min(self.max_delay);
            delay = delay.saturating_mul(2);
        }
        total
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterventionConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub min_improvement: f64,
    /// Wall-clock ceiling for one block's whole correction loop.
    #[serde(with = "humantime_serde")]
    pub latency_budget: Duration,
}

impl InterventionConfig {
    pub fn policy(&self) -> InterventionPolicy {
        InterventionPolicy {
            max_attempts: self.max_attempts,
            min_improvement: self.min_improvement,
            ..InterventionPolicy::default()
        }
    }
}

impl Default for InterventionConfig {
    fn default() -> Self {
        let policy = InterventionPolicy::default();
        Self {
            enabled: true,
            max_attempts: policy.max_attempts,
            min_improvement: policy.min_improvement,
            latency_budget: Duration::from_secs(60),
        }
    }
}

/// Token ceilings. Absent means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub per_evaluator: BTreeMap<EvaluatorKind, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasStrategy {
    /// Pronoun and role heuristics only; no scoring-service call.
    RuleBased,
    /// Scoring-service judgment only.
    Holistic,
    /// Holistic judgment, falling back to the heuristics when it is unavailable.
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasConfig {
    pub strategy: BiasStrategy,
    pub include_headers: bool,
}
