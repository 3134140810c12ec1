//! Feedback templates.
//!
//! Each evaluator produces tiered feedback from its score band. Scoring-service
//! feedback, when present, is merged on top of these lines.

use serde::{Deserialize, Serialize};

use crate::bias::BiasAnalysis;
use crate::block::{BlockKind, ValidationError};
use crate::citation::CitationSet;
use crate::score::{Axis, Severity};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
    #[serde(default, alias = "specific_recommendations")]
    pub recommendations: Vec<String>,
}

impl Feedback {
    pub fn strength(mut self, line: impl Into<String>) -> Self {
        push_unique(&mut self.strengths, line.into());
        self
    }

    pub fn area(mut self, line: impl Into<String>) -> Self {
        push_unique(&mut self.areas_for_improvement, line.into());
        self
    }

    pub fn recommendation(mut self, line: impl Into<String>) -> Self {
        push_unique(&mut self.recommendations, line.into());
        self
    }

    /// Append another set of lines, skipping blanks and duplicates.
    pub fn merge(mut self, other: Feedback) -> Self {
        for line in other.strengths {
            push_unique(&mut self.strengths, line);
        }
        for line in other.areas_for_improvement {
            push_unique(&mut self.areas_for_improvement, line);
        }
        for line in other.recommendations {
            push_unique(&mut self.recommendations, line);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty() && self.areas_for_improvement.is_empty() && self.recommendations.is_empty()
    }
}

fn push_unique(lines: &mut Vec<String>, line: String) {
    let line = line.trim();
    if !line.is_empty() && !lines.iter().any(|l| l == line) {
        lines.push(line.to_string());
    }
}

/// Accuracy feedback for a metric or table block.
pub fn accuracy(kind: BlockKind, value: f64, citations: &CitationSet) -> Feedback {
    let mut fb = Feedback::default();
    let label = kind.as_str();
    let metric = kind == BlockKind::Metric;

    if !citations.has_evidence() {
        fb = fb
            .area("Missing citations")
            .recommendation("Add relevant citations to support the content");
    }

    if value >= 0.81 {
        fb = fb
            .strength(format!("High-quality {} content with excellent accuracy", label))
            .strength("Precise and well-supported information")
            .strength("Strong contextual alignment")
            .strength(if metric {
                "Accurate metric value with comprehensive description"
            } else {
                "Well-structured table with accurate cell values"
            });
    } else if value >= 0.61 {
        fb = fb
            .strength(format!("Generally accurate {} content", label))
            .area("Minor accuracy improvements needed");
        fb = if metric {
            fb.recommendation("Add missing qualifiers to the description")
                .recommendation("Verify exact metric value against source")
        } else {
            fb.recommendation("Review header clarity and precision")
                .recommendation("Check for minor data inconsistencies")
        };
    } else if value >= 0.41 {
        fb = fb
            .area("Moderate accuracy issues detected")
            .area("Important details missing or imprecise");
        fb = if metric {
            fb.recommendation("Review and verify metric calculation")
                .recommendation("Add important contextual qualifiers")
                .recommendation("Strengthen citation support")
        } else {
            fb.recommendation("Address data gaps in the table")
                .recommendation("Improve header clarity")
                .recommendation("Verify data relationships and groupings")
        };
    } else if value >= 0.21 {
        fb = fb
            .area("Significant accuracy concerns")
            .area("Major content issues identified");
        fb = if metric {
            fb.recommendation("Recalculate metric value from source data")
                .recommendation("Completely revise description for accuracy")
                .recommendation("Verify all citations and claims")
        } else {
            fb.recommendation("Review and correct cell values throughout")
                .recommendation("Restructure table headers and organization")
                .recommendation("Fill in missing critical data")
        };
    } else {
        fb = fb
            .area("Critical accuracy issues detected")
            .area("Fundamental content problems present");
        fb = if metric {
            fb.recommendation("Complete metric value recalculation required")
                .recommendation("Full revision of description needed")
                .recommendation("Comprehensive citation review necessary")
        } else {
            fb.recommendation("Complete table restructuring needed")
                .recommendation("Comprehensive data verification required")
                .recommendation("Full review of all relationships and groupings")
        };
    }

    fb
}

pub fn relevance(value: f64) -> Feedback {
    if value >= 0.8 {
        Feedback::default().strength("Excellent overall relevance to query")
    } else {
        Feedback::default()
            .area("Overall response relevance needs improvement")
            .recommendation("Ensure the response comprehensively addresses all aspects of the query")
    }
}

pub fn coherence(value: f64) -> Feedback {
    if value >= 0.8 {
        Feedback::default().strength("Strong coherence and logical flow")
    } else {
        Feedback::default()
            .area("Response coherence could be strengthened")
            .recommendation("Improve logical flow and transitions throughout the response")
    }
}

/// Bias feedback. A diversity recommendation is always included.
pub fn bias(value: f64, analysis: Option<&BiasAnalysis>) -> Feedback {
    let mut fb = Feedback::default();

    if value < 0.2 {
        fb = fb.strength("Balanced gender representation");
    } else if value < 0.5 {
        fb = fb.area("Some imbalance in gender representation");
    } else {
        fb = fb
            .area("Noticeable gender bias detected")
            .recommendation("Rewrite gendered generic references with neutral terms");
    }

    if let Some(analysis) = analysis {
        if analysis.total_references() == 0 {
            fb = fb.strength("No gendered language detected");
        }
        if analysis.gendered_generic_terms > 0 {
            fb = fb
                .area("Gendered generic terms used")
                .recommendation("Replace terms such as 'mankind' or 'chairman' with gender-neutral alternatives");
        }
        if analysis.professional_male != analysis.professional_female {
            fb = fb.recommendation("Balance gender associations with professional roles");
        }
    }

    fb.recommendation("Include diverse examples and perspectives across genders and roles")
}

/// Feedback attached to the unavailable sentinel.
pub fn unavailable(axis: Axis, reason: &str) -> Feedback {
    Feedback::default()
        .area(format!("{} evaluation unavailable: {}", capitalize(axis.as_str()), reason))
        .recommendation(format!(
            "Re-run the {} evaluation once the scoring service is reachable",
            axis.as_str()
        ))
}

/// Feedback for a block that failed structural validation.
pub fn unscorable(kind: Option<BlockKind>, error: &ValidationError) -> Feedback {
    let label = kind.map(|k| k.as_str()).unwrap_or("block");
    Feedback::default()
        .area("Invalid block structure detected")
        .area(error.to_string())
        .recommendation("Ensure all required fields are present")
        .recommendation(format!("Verify the {} follows the correct format specification", label))
        .recommendation("Check for any missing or malformed data entries")
}

/// Guarantee the line required by the score's tier is present.
pub(crate) fn ensure_tier_coverage(axis: Axis, severity: Severity, feedback: Feedback) -> Feedback {
    match severity {
        Severity::Low if feedback.strengths.is_empty() => {
            feedback.strength(format!("Strong {} result", axis.as_str()))
        }
        Severity::Medium | Severity::High if feedback.recommendations.is_empty() => {
            feedback.recommendation(format!("Review the content to improve its {}", axis.as_str()))
        }
        _ => feedback,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::{Citation, Provenance};

    fn cited() -> CitationSet {
        CitationSet::Available {
            citations: vec![Citation::new("1", "snippet", Provenance::Embedded)],
        }
    }

    #[test]
    fn test_accuracy_bands() {
        let excellent = accuracy(BlockKind::Metric, 0.9, &cited());
        assert!(excellent
            .strengths
            .contains(&"Accurate metric value with comprehensive description".to_string()));
        assert!(excellent.recommendations.is_empty());

        let critical = accuracy(BlockKind::Table, 0.1, &cited());
        assert!(critical.strengths.is_empty());
        assert!(critical
            .recommendations
            .contains(&"Complete table restructuring needed".to_string()));
    }

    #[test]
    fn test_missing_citations_flagged() {
        let fb = accuracy(BlockKind::Metric, 0.9, &CitationSet::unavailable("none"));
        assert!(fb.areas_for_improvement.contains(&"Missing citations".to_string()));
        assert!(fb
            .recommendations
            .contains(&"Add relevant citations to support the content".to_string()));

        let empty = accuracy(BlockKind::Metric, 0.9, &CitationSet::empty());
        assert!(empty.areas_for_improvement.contains(&"Missing citations".to_string()));
    }

    #[test]
    fn test_relevance_and_coherence_threshold() {
        assert_eq!(relevance(0.8).strengths, vec!["Excellent overall relevance to query"]);
        assert_eq!(coherence(0.79).areas_for_improvement, vec!["Response coherence could be strengthened"]);
    }

    #[test]
    fn test_bias_always_recommends_diversity() {
        for value in [0.0, 0.3, 0.9] {
            let fb = bias(value, None);
            assert!(fb
                .recommendations
                .iter()
                .any(|r| r.starts_with("Include diverse examples")));
        }
    }

    #[test]
    fn test_merge_dedups() {
        let merged = Feedback::default()
            .strength("Clear")
            .merge(Feedback::default().strength("Clear").strength("  ").strength("Concise"));
        assert_eq!(merged.strengths, vec!["Clear", "Concise"]);
    }

    #[test]
    fn test_deserializes_service_feedback_shape() {
        let fb: Feedback = serde_json::from_str(
            r#"{"strengths": ["a"], "areas_for_improvement": [], "specific_recommendations": ["b"]}"#,
        )
        .unwrap();
        assert_eq!(fb.recommendations, vec!["b"]);
    }
}
