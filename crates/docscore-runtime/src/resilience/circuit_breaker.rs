//! Circuit breaker keyed by evaluator.
//!
//! After repeated failures an evaluator's circuit opens and its calls resolve
//! to the unavailable sentinel without reaching the scoring service. After the
//! recovery timeout one trial call is let through (half-open).

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use docscore_core::EvaluatorKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,

    /// Half-open successes needed to close the circuit.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CircuitState {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

pub struct CircuitBreaker {
    states: RwLock<HashMap<EvaluatorKind, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// True when calls for `evaluator` should not reach the scoring service.
    pub fn is_open(&self, evaluator: EvaluatorKind) -> bool {
        let states = self.states.read();
        match states.get(&evaluator) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(evaluator);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    pub fn record_success(&self, evaluator: EvaluatorKind) {
        let mut states = self.states.write();
        match states.get(&evaluator).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(evaluator, CircuitState::Closed { failures: 0 });
                    tracing::info!(evaluator = %evaluator, "circuit closed after successful recovery");
                } else {
                    states.insert(evaluator, CircuitState::HalfOpen { successes: successes + 1 });
                }
            }
            Some(CircuitState::Closed { .. }) => {
                states.insert(evaluator, CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    pub fn record_failure(&self, evaluator: EvaluatorKind) {
        let mut states = self.states.write();
        let failures = match states.get(&evaluator).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(evaluator, CircuitState::Open { opened_at: Instant::now() });
                tracing::warn!(evaluator = %evaluator, "circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(evaluator, CircuitState::Open { opened_at: Instant::now() });
            tracing::warn!(evaluator = %evaluator, failures, "circuit opened after repeated failures");
        } else {
            states.insert(evaluator, CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, evaluator: EvaluatorKind) {
        let mut states = self.states.write();
        if matches!(states.get(&evaluator), Some(CircuitState::Open { .. })) {
            states.insert(evaluator, CircuitState::HalfOpen { successes: 0 });
            tracing::info!(evaluator = %evaluator, "circuit half-open, probing recovery");
        }
    }

    pub fn state(&self, evaluator: EvaluatorKind) -> CircuitState {
        self.states
            .read()
            .get(&evaluator)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
