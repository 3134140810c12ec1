//! # docscore-runtime
//!
//! Async half of the docscore evaluation pipeline.
//!
//! `docscore-core` owns the block model, validation, feedback and
//! aggregation, and never calls out. This crate obtains the judgments:
//!
//! - evaluators for bias, relevance/coherence and per-block accuracy
//! - the intervention engine that drives accuracy corrections
//! - a scoring client bounding every external call (shared semaphore,
//!   per-call timeout, bounded retry, circuit breaker, token budget, cache)
//! - the orchestrator that fans a document out and aggregates the result
//!
//! ## Example
//!
//! ```rust,ignore
//! use docscore_runtime::{OrchestratorBuilder, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_file("docscore.yaml")?;
//! let orchestrator = OrchestratorBuilder::new().config(config).build()?;
//!
//! let run = orchestrator.evaluate_document(&document_json).await?;
//! println!("{}", run.report.to_json_pretty()?);
//! ```

use thiserror::Error;

pub mod cache;
pub mod citations;
pub mod client;
pub mod config;
pub mod evaluators;
pub mod intervention;
pub mod judgment;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;

pub use citations::{CitationSource, NoCitationSource, StaticCitationSource};
pub use client::{EvaluationUnavailable, ScoringClient};
pub use config::{BiasStrategy, ConfigError, RuntimeConfig};
pub use evaluators::{AccuracyEvaluator, BiasEvaluator, Evaluator, RelevanceCoherenceEvaluator};
pub use intervention::InterventionEngine;
pub use orchestrator::{EvaluationRun, Orchestrator, OrchestratorBuilder};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use resilience::ServiceUsage;

/// Errors building the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
