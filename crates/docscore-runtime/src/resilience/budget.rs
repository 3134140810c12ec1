//! Token budgets and usage metering for scoring-service calls.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use docscore_core::EvaluatorKind;

use crate::providers::TokenUsage;

pub struct TokenBudget {
    pub max_tokens: u32,
    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    pub fn can_afford(&self, tokens: u32) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u32) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}

/// Accumulated scoring-service usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cached_prompt_tokens: u32,
    pub calls: u32,
    pub cache_hits: u32,
    /// Estimated cost in USD.
    pub estimated_cost: f64,
    pub calls_by_evaluator: BTreeMap<EvaluatorKind, u32>,
}

impl ServiceUsage {
    pub fn add(&mut self, evaluator: EvaluatorKind, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.cached_prompt_tokens += usage.cached_prompt_tokens;
        self.total_tokens += usage.total();
        self.calls += 1;
        *self.calls_by_evaluator.entry(evaluator).or_insert(0) += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Per-million-token pricing. Cached prompt tokens bill at the cached rate.
    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        let (input_rate, output_rate, cached_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6, 0.075),
            m if m.contains("gpt-4o") => (2.5, 10.0, 1.25),
            m if m.contains("gpt-4.1-mini") => (0.4, 1.6, 0.1),
            m if m.contains("gpt-4.1") => (2.0, 8.0, 0.5),
            m if m.contains("gpt-4") => (30.0, 60.0, 30.0),
            _ => (2.5, 10.0, 1.25),
        };

        let cached = usage.cached_prompt_tokens.min(usage.prompt_tokens) as f64;
        let uncached = usage.prompt_tokens as f64 - cached;

        (uncached * input_rate + cached * cached_rate + usage.completion_tokens as f64 * output_rate) / 1_000_000.0
    }
}

/// Budgets for one evaluation run. A missing budget is unlimited.
pub struct BudgetTracker {
    evaluator_budgets: HashMap<EvaluatorKind, TokenBudget>,
    global_budget: Option<TokenBudget>,
    usage: RwLock<ServiceUsage>,
}

impl BudgetTracker {
    pub fn new(global_max: Option<u32>, per_evaluator: HashMap<EvaluatorKind, u32>) -> Self {
        Self {
            evaluator_budgets: per_evaluator
                .into_iter()
                .map(|(kind, max)| (kind, TokenBudget::new(max)))
                .collect(),
            global_budget: global_max.map(TokenBudget::new),
            usage: RwLock::new(ServiceUsage::default()),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, HashMap::new())
    }

    pub fn can_afford(&self, evaluator: EvaluatorKind, estimated_tokens: u32) -> bool {
        let evaluator_ok = self
            .evaluator_budgets
            .get(&evaluator)
            .map(|b| b.can_afford(estimated_tokens))
            .unwrap_or(true);
        let global_ok = self
            .global_budget
            .as_ref()
            .map(|b| b.can_afford(estimated_tokens))
            .unwrap_or(true);

        evaluator_ok && global_ok
    }

    pub fn record_usage(&self, evaluator: EvaluatorKind, usage: &TokenUsage, model: &str) {
        let total = usage.total();
        if let Some(budget) = self.evaluator_budgets.get(&evaluator) {
            budget.record(total);
        }
        if let Some(budget) = &self.global_budget {
            budget.record(total);
        }
        self.usage.write().add(evaluator, usage, model);
    }

    pub fn record_cache_hit(&self) {
        self.usage.write().cache_hits += 1;
    }

    pub fn usage(&self) -> ServiceUsage {
        self.usage.read().clone()
    }

    pub fn remaining_global(&self) -> Option<u32> {
        self.global_budget.as_ref().map(TokenBudget::remaining)
    }

    pub fn reset(&self) {
        for budget in self.evaluator_budgets.values() {
            budget.reset();
        }
        if let Some(budget) = &self.global_budget {
            budget.reset();
        }
        *self.usage.write() = ServiceUsage::default();
    }
}

impl Default for BudgetTracker {
    fn default() -> Self {
        Self::unlimited()
    }
}
