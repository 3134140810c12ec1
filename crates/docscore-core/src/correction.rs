//! Accuracy intervention state machine.
//!
//! ```text
//! Detected ──> CorrectionRequested(n) ──> Reevaluated(n) ──> Accepted
//!    │                 │                       │
//!    │                 └──────> Retrying(n) <──┘
//!    │                              │
//!    │                              └──> CorrectionRequested(n+1)
//!    └──────────────> Exhausted <── (attempt limit, deadline, no evidence)
//! ```
//!
//! The machine is pure: it never calls the scoring service. The runtime drives
//! it by reporting proposal failures, re-scores and deadline expiry. Every
//! rejected attempt consumes one attempt, so the machine reaches a terminal
//! state after at most `max_attempts` correction requests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::citation::CitationSet;
use crate::score::{Axis, Score, MEDIUM_PRIORITY_THRESHOLD};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_MIN_IMPROVEMENT: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterventionPolicy {
    pub max_attempts: u32,
    /// A re-score must beat the original by at least this much.
    pub min_improvement: f64,
    /// Accuracy below this triggers an intervention.
    pub trigger_threshold: f64,
    /// A re-score must reach this to be accepted.
    pub accept_threshold: f64,
}

impl Default for InterventionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_improvement: DEFAULT_MIN_IMPROVEMENT,
            trigger_threshold: MEDIUM_PRIORITY_THRESHOLD,
            accept_threshold: MEDIUM_PRIORITY_THRESHOLD,
        }
    }
}

impl InterventionPolicy {
    pub fn should_intervene(&self, score: &Score) -> bool {
        score.axis == Axis::Accuracy
            && score
                .value()
                .map(|v| v < self.trigger_threshold)
                .unwrap_or(false)
    }

    pub fn accepts(&self, original: f64, rescore: f64) -> bool {
        rescore >= original + self.min_improvement && rescore >= self.accept_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    NoEvidence,
    MaxAttempts,
    LatencyBudget,
}

impl fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustionReason::NoEvidence => f.write_str("no citation evidence to correct against"),
            ExhaustionReason::MaxAttempts => f.write_str("correction attempts exhausted"),
            ExhaustionReason::LatencyBudget => f.write_str("intervention latency budget elapsed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InterventionState {
    Detected,
    CorrectionRequested { attempt: u32 },
    Reevaluated { attempt: u32, rescore: f64 },
    Retrying { attempt: u32 },
    Accepted { attempt: u32 },
    Exhausted { attempts: u32, reason: ExhaustionReason },
}

impl InterventionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InterventionState::Accepted { .. } | InterventionState::Exhausted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionOutcome {
    Accepted,
    Rejected,
    Exhausted,
}

/// One correction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub attempt: u32,
    pub original: Block,
    pub proposed: Option<Block>,
    pub reevaluation: Option<Score>,
    pub outcome: CorrectionOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Audit trail attached to a block's report entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionAudit {
    pub outcome: CorrectionOutcome,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub original_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f64>,
    pub original_content: Block,
    pub history: Vec<Correction>,
}

/// What an intervention leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Content and score to report when a correction was accepted.
    pub accepted: Option<(Block, Score)>,
    pub audit: CorrectionAudit,
}

#[derive(Debug, Clone)]
pub struct InterventionMachine {
    policy: InterventionPolicy,
    original: Block,
    original_score: f64,
    state: InterventionState,
    history: Vec<Correction>,
    accepted: Option<(Block, Score)>,
}

impl InterventionMachine {
    /// Start an intervention for `score`, or return `None` when none is needed.
    ///
    /// A block without citation evidence goes straight to `Exhausted`.
    pub fn detect(policy: InterventionPolicy, block: &Block, score: &Score, citations: &CitationSet) -> Option<Self> {
        if !policy.should_intervene(score) {
            return None;
        }
        let original_score = score.value()?;

        let state = if citations.has_evidence() {
            InterventionState::Detected
        } else {
            InterventionState::Exhausted {
                attempts: 0,
                reason: ExhaustionReason::NoEvidence,
            }
        };

        Some(Self {
            policy,
            original: block.clone(),
            original_score,
            state,
            history: Vec::new(),
            accepted: None,
        })
    }

    pub fn state(&self) -> &InterventionState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn original(&self) -> &Block {
        &self.original
    }

    pub fn original_score(&self) -> f64 {
        self.original_score
    }

    /// Attempts recorded so far, oldest first.
    pub fn history(&self) -> &[Correction] {
        &self.history
    }

    /// Move to `CorrectionRequested` and return the attempt number.
    ///
    /// Returns `None` when the machine is not waiting to send a request.
    pub fn request(&mut self) -> Option<u32> {
        let attempt = match self.state {
            InterventionState::Detected => 1,
            InterventionState::Retrying { attempt } => attempt + 1,
            _ => return None,
        };
        if attempt > self.policy.max_attempts {
            self.state = InterventionState::Exhausted {
                attempts: attempt - 1,
                reason: ExhaustionReason::MaxAttempts,
            };
            return None;
        }
        self.state = InterventionState::CorrectionRequested { attempt };
        Some(attempt)
    }

    /// The correction request, its validation or its re-score failed.
    pub fn record_failure(&mut self, proposed: Option<Block>, note: impl Into<String>) {
        let InterventionState::CorrectionRequested { attempt } = self.state else {
            return;
        };
        self.history.push(Correction {
            attempt,
            original: self.original.clone(),
            proposed,
            reevaluation: None,
            outcome: CorrectionOutcome::Rejected,
            note: Some(note.into()),
        });
        self.retry_or_exhaust(attempt);
    }

    /// A proposal was re-scored. Decides acceptance and returns the attempt outcome.
    pub fn record_rescore(&mut self, proposed: Block, reevaluation: Score) -> CorrectionOutcome {
        let InterventionState::CorrectionRequested { attempt } = self.state else {
            return CorrectionOutcome::Rejected;
        };

        let Some(rescore) = reevaluation.value() else {
            let note = reevaluation
                .unavailable_reason()
                .unwrap_or("re-evaluation unavailable")
                .to_string();
            self.record_failure(Some(proposed), note);
            return CorrectionOutcome::Rejected;
        };

        self.state = InterventionState::Reevaluated { attempt, rescore };

        if self.policy.accepts(self.original_score, rescore) {
            self.history.push(Correction {
                attempt,
                original: self.original.clone(),
                proposed: Some(proposed.clone()),
                reevaluation: Some(reevaluation.clone()),
                outcome: CorrectionOutcome::Accepted,
                note: None,
            });
            self.accepted = Some((proposed, reevaluation));
            self.state = InterventionState::Accepted { attempt };
            CorrectionOutcome::Accepted
        } else {
            let note = if rescore > self.original_score {
                format!(
                    "re-score {:.2} improved on {:.2} but not enough to accept",
                    rescore, self.original_score
                )
            } else {
                format!("re-score {:.2} did not improve on {:.2}", rescore, self.original_score)
            };
            self.history.push(Correction {
                attempt,
                original: self.original.clone(),
                proposed: Some(proposed),
                reevaluation: Some(reevaluation),
                outcome: CorrectionOutcome::Rejected,
                note: Some(note),
            });
            self.retry_or_exhaust(attempt);
            CorrectionOutcome::Rejected
        }
    }

    /// The latency budget ran out. Keeps the original content.
    pub fn expire(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.state = InterventionState::Exhausted {
            attempts: self.attempts_made(),
            reason: ExhaustionReason::LatencyBudget,
        };
    }

    fn retry_or_exhaust(&mut self, attempt: u32) {
        self.state = if attempt < self.policy.max_attempts {
            InterventionState::Retrying { attempt }
        } else {
            InterventionState::Exhausted {
                attempts: attempt,
                reason: ExhaustionReason::MaxAttempts,
            }
        };
    }

    fn attempts_made(&self) -> u32 {
        match self.state {
            InterventionState::Detected => 0,
            InterventionState::CorrectionRequested { attempt }
            | InterventionState::Reevaluated { attempt, .. }
            | InterventionState::Retrying { attempt }
            | InterventionState::Accepted { attempt } => attempt,
            InterventionState::Exhausted { attempts, .. } => attempts,
        }
    }

    /// Close the intervention. A machine that is not terminal is treated as expired.
    pub fn finish(mut self) -> Resolution {
        if !self.is_terminal() {
            self.expire();
        }

        let (outcome, reason) = match &self.state {
            InterventionState::Accepted { .. } => (CorrectionOutcome::Accepted, None),
            InterventionState::Exhausted { reason, .. } => (CorrectionOutcome::Exhausted, Some(reason.to_string())),
            _ => (CorrectionOutcome::Exhausted, None),
        };

        let final_score = self.accepted.as_ref().and_then(|(_, score)| score.value());

        Resolution {
            audit: CorrectionAudit {
                outcome,
                attempts: self.attempts_made(),
                reason,
                original_score: self.original_score,
                final_score,
                original_content: self.original,
                history: self.history,
            },
            accepted: self.accepted,
        }
    }
}
