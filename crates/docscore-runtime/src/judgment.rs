//! Structured parsing of scoring-service judgments.
//!
//! The service produces judgments as text. A judgment is accepted only when it
//! parses into the requested shape with every score inside `[0, 1]`; anything
//! else is a [`JudgmentError`] and the caller reports the evaluation as
//! unavailable. Values are never clamped or guessed.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use docscore_core::{block, Block, BlockKind, Feedback, ValidationError};

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap();
    static ref BARE_NUMBER: Regex = Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*$").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JudgmentError {
    #[error("judgment is empty")]
    Empty,

    #[error("judgment is not valid JSON: {0}")]
    Malformed(String),

    #[error("judgment is missing '{0}'")]
    MissingField(&'static str),

    #[error("judgment field '{field}' is {value}, outside [0, 1]")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("proposed correction is not a valid block: {0}")]
    InvalidCorrection(ValidationError),

    #[error("proposed correction is a {found} block, expected {expected}")]
    WrongKind { expected: BlockKind, found: BlockKind },
}

impl JudgmentError {
    /// The service answered in the requested shape but the content was
    /// refused, e.g. a proposed correction that is not a valid block.
    pub fn is_content_rejection(&self) -> bool {
        matches!(self, JudgmentError::InvalidCorrection(_) | JudgmentError::WrongKind { .. })
    }
}

/// A single score with optional self-reported confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreJudgment {
    pub score: f64,
    pub confidence: Option<f64>,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceCoherenceJudgment {
    pub relevance: f64,
    pub coherence: f64,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BiasJudgment {
    pub bias_score: f64,
    pub confidence: Option<f64>,
    pub male_references: Option<u64>,
    pub female_references: Option<u64>,
    pub male_associations: Option<u64>,
    pub female_associations: Option<u64>,
    pub findings: Option<BiasFindings>,
    pub feedback: Feedback,
}

/// The judgment's `analysis` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasFindings {
    pub key_findings: Vec<String>,
    pub notable_examples: Vec<NotableExample>,
    pub bias_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotableExample {
    pub context: String,
    pub bias_type: String,
    pub explanation: String,
}

/// Locate the JSON object in a response that may wrap it in a code fence or prose.
pub fn extract_json(text: &str) -> Result<Value, JudgmentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(JudgmentError::Empty);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    let candidate = match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(fenced) => fenced.as_str().trim(),
        None => match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => return Err(JudgmentError::Malformed("no JSON object found".into())),
        },
    };

    serde_json::from_str(candidate).map_err(|e| JudgmentError::Malformed(e.to_string()))
}

/// Parse a score-only judgment: a JSON object with `score`, or a bare number.
pub fn parse_score(text: &str) -> Result<ScoreJudgment, JudgmentError> {
    if let Some(number) = BARE_NUMBER.captures(text).and_then(|c| c.get(1)) {
        let score = number
            .as_str()
            .parse::<f64>()
            .map_err(|e| JudgmentError::Malformed(e.to_string()))?;
        return Ok(ScoreJudgment {
            score: unit("score", score)?,
            confidence: None,
            rationale: None,
        });
    }

    let value = extract_json(text)?;
    let obj = as_object(&value)?;

    Ok(ScoreJudgment {
        score: required_unit(obj, &["score", "accuracy_score", "accuracy"], "score")?,
        confidence: optional_unit(obj, "confidence")?,
        rationale: obj
            .get("rationale")
            .or_else(|| obj.get("reasoning"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

pub fn parse_relevance_coherence(text: &str) -> Result<RelevanceCoherenceJudgment, JudgmentError> {
    let value = extract_json(text)?;
    let obj = as_object(&value)?;

    Ok(RelevanceCoherenceJudgment {
        relevance: required_unit(obj, &["relevance", "relevance_score"], "relevance")?,
        coherence: required_unit(obj, &["coherence", "coherence_score"], "coherence")?,
        confidence: optional_unit(obj, "confidence")?,
    })
}

pub fn parse_bias(text: &str) -> Result<BiasJudgment, JudgmentError> {
    let value = extract_json(text)?;
    let obj = as_object(&value)?;

    let count = |pointer: &str| value.pointer(pointer).and_then(Value::as_u64);

    let feedback = match obj.get("feedback") {
        Some(fb @ Value::Object(_)) => {
            serde_json::from_value::<Feedback>(fb.clone()).map_err(|e| JudgmentError::Malformed(e.to_string()))?
        }
        _ => Feedback::default(),
    };

    let findings = match obj.get("analysis") {
        Some(analysis @ Value::Object(_)) => Some(
            serde_json::from_value::<BiasFindings>(analysis.clone())
                .map_err(|e| JudgmentError::Malformed(format!("analysis: {}", e)))?,
        ),
        _ => None,
    };

    Ok(BiasJudgment {
        bias_score: required_unit(obj, &["bias_score", "score"], "bias_score")?,
        confidence: optional_unit(obj, "confidence")?,
        male_references: count("/statistics/gender_distribution/male_references"),
        female_references: count("/statistics/gender_distribution/female_references"),
        male_associations: count("/statistics/professional_roles/male_associations"),
        female_associations: count("/statistics/professional_roles/female_associations"),
        findings,
        feedback: Feedback::default().merge(feedback),
    })
}

/// Parse a proposed replacement for a block of `expected` kind.
///
/// The proposal must validate as a block of the same kind. `metric` and
/// `table` are accepted as aliases for `number` and `rows`.
pub fn parse_correction(text: &str, expected: BlockKind) -> Result<Block, JudgmentError> {
    let value = extract_json(text)?;
    let mut obj = as_object(&value)?.clone();

    for (alias, field) in [("metric", "number"), ("table", "rows")] {
        if !obj.contains_key(field) {
            if let Some(v) = obj.remove(alias) {
                obj.insert(field.to_string(), v);
            }
        }
    }
    if !obj.contains_key("type") {
        obj.insert("type".to_string(), Value::from(expected.as_str()));
    }

    let proposed = block::validate(&Value::Object(obj)).map_err(JudgmentError::InvalidCorrection)?;
    if proposed.kind() != expected {
        return Err(JudgmentError::WrongKind {
            expected,
            found: proposed.kind(),
        });
    }
    Ok(proposed)
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, JudgmentError> {
    value
        .as_object()
        .ok_or_else(|| JudgmentError::Malformed("expected a JSON object".into()))
}

fn unit(field: &'static str, value: f64) -> Result<f64, JudgmentError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(JudgmentError::OutOfRange { field, value })
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_unit(obj: &Map<String, Value>, keys: &[&str], field: &'static str) -> Result<f64, JudgmentError> {
    let value = keys
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(number)
        .ok_or(JudgmentError::MissingField(field))?;
    unit(field, value)
}

fn optional_unit(obj: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, JudgmentError> {
    match obj.get(field).and_then(number) {
        Some(v) => unit(field, v).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bare_number_score() {
        let judgment = parse_score("  0.75\n").unwrap();
        assert_eq!(judgment.score, 0.75);
        assert_eq!(judgment.confidence, None);
    }

    #[test]
    fn test_json_score_in_code_fence() {
        let text = "Here is my judgment:\n```json\n{\"score\": 0.4, \"confidence\": 0.9, \"rationale\": \"off by 20%\"}\n```";
        let judgment = parse_score(text).unwrap();
        assert_eq!(judgment.score, 0.4);
        assert_eq!(judgment.confidence, Some(0.9));
        assert_eq!(judgment.rationale.as_deref(), Some("off by 20%"));
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let judgment = parse_score("The score is {\"score\": \"0.6\"} overall.").unwrap();
        assert_eq!(judgment.score, 0.6);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(matches!(parse_score("1.4"), Err(JudgmentError::OutOfRange { field: "score", .. })));
        assert!(matches!(
            parse_score(r#"{"score": 0.5, "confidence": -0.1}"#),
            Err(JudgmentError::OutOfRange { field: "confidence", .. })
        ));
    }

    #[test]
    fn test_free_text_rejected() {
        assert!(matches!(parse_score("I think it's fairly accurate"), Err(JudgmentError::Malformed(_))));
        assert!(matches!(parse_score(""), Err(JudgmentError::Empty)));
        assert!(matches!(parse_score(r#"{"verdict": "ok"}"#), Err(JudgmentError::MissingField("score"))));
    }

    #[test]
    fn test_relevance_coherence_aliases() {
        let judgment = parse_relevance_coherence(r#"{"relevance_score": 0.9, "coherence_score": 0.7}"#).unwrap();
        assert_eq!(judgment.relevance, 0.9);
        assert_eq!(judgment.coherence, 0.7);

        assert!(matches!(
            parse_relevance_coherence(r#"{"relevance": 0.9}"#),
            Err(JudgmentError::MissingField("coherence"))
        ));
    }

    #[test]
    fn test_bias_judgment() {
        let text = r#"{
            "statistics": {
                "gender_distribution": {"male_references": 4, "female_references": 1},
                "professional_roles": {"male_associations": 2, "female_associations": 0}
            },
            "analysis": {
                "key_findings": ["Technical roles are described with male pronouns"],
                "notable_examples": [
                    {"context": "An engineer checks his work", "bias_type": "occupational", "explanation": "Generic engineer assumed male"}
                ],
                "bias_patterns": ["generic masculine"]
            },
            "feedback": {
                "strengths": [],
                "areas_for_improvement": ["Engineers are always 'he'"],
                "specific_recommendations": ["Use 'they' for generic engineers"]
            },
            "bias_score": 0.65
        }"#;
        let judgment = parse_bias(text).unwrap();
        assert_eq!(judgment.bias_score, 0.65);
        assert_eq!(judgment.male_references, Some(4));
        assert_eq!(judgment.female_associations, Some(0));
        assert_eq!(judgment.feedback.recommendations, vec!["Use 'they' for generic engineers"]);

        let findings = judgment.findings.unwrap();
        assert_eq!(findings.key_findings, vec!["Technical roles are described with male pronouns"]);
        assert_eq!(findings.notable_examples[0].bias_type, "occupational");
        assert_eq!(findings.notable_examples[0].context, "An engineer checks his work");
        assert_eq!(findings.bias_patterns, vec!["generic masculine"]);
    }

    #[test]
    fn test_bias_judgment_without_analysis() {
        let judgment = parse_bias(r#"{"bias_score": 0.1}"#).unwrap();
        assert!(judgment.findings.is_none());

        let partial = parse_bias(r#"{"bias_score": 0.1, "analysis": {"bias_patterns": ["none"]}}"#).unwrap();
        let findings = partial.findings.unwrap();
        assert!(findings.key_findings.is_empty());
        assert_eq!(findings.bias_patterns, vec!["none"]);

        assert!(matches!(
            parse_bias(r#"{"bias_score": 0.1, "analysis": {"key_findings": "one"}}"#),
            Err(JudgmentError::Malformed(_))
        ));
    }

    #[test]
    fn test_correction_metric_with_alias() {
        let block = parse_correction(
            r#"{"metric": "10 dimensions", "description": "Superstring theory requires ten dimensions"}"#,
            BlockKind::Metric,
        )
        .unwrap();
        assert_eq!(
            block,
            Block::Metric {
                number: "10 dimensions".into(),
                description: "Superstring theory requires ten dimensions".into(),
            }
        );
    }

    #[test]
    fn test_correction_must_validate() {
        let ragged = parse_correction(r#"{"rows": [["a", "b"], ["c"]]}"#, BlockKind::Table);
        assert!(matches!(
            ragged,
            Err(JudgmentError::InvalidCorrection(ValidationError::RaggedTable { .. }))
        ));

        let wrong_kind = parse_correction(r#"{"type": "paragraph", "text": "ten"}"#, BlockKind::Metric);
        assert!(matches!(
            wrong_kind,
            Err(JudgmentError::WrongKind {
                expected: BlockKind::Metric,
                found: BlockKind::Paragraph
            })
        ));
    }

    proptest! {
        #[test]
        fn prop_accepted_scores_stay_in_range(text in ".{0,64}") {
            if let Ok(judgment) = parse_score(&text) {
                prop_assert!((0.0..=1.0).contains(&judgment.score));
            }
        }

        #[test]
        fn prop_fenced_score_parses(hundredths in 0u32..=100) {
            let score = f64::from(hundredths) / 100.0;
            let text = format!("Here you go:\n```json\n{{\"score\": {}}}\n```", score);
            prop_assert_eq!(parse_score(&text).map(|j| j.score), Ok(score));
        }
    }
}
