//! Resilience for scoring-service calls.
//!
//! - Circuit breaker per evaluator, so a failing evaluator stops calling out
//! - Token budgets and usage metering

mod budget;
mod circuit_breaker;

pub use budget::{BudgetTracker, ServiceUsage, TokenBudget};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
